use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

use crate::error::{HushError, Result};

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// 32-byte AES-256 key derived from caller-supplied key material.
#[derive(ZeroizeOnDrop)]
pub struct CipherKey([u8; 32]);

impl CipherKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Hash `key_material` with SHA-256 so keys of any length or charset map
/// onto a full-width AES-256 key.
pub fn derive_key(key_material: &str) -> CipherKey {
    CipherKey(Sha256::digest(key_material.as_bytes()).into())
}

/// Encrypt UTF-8 text. Output is base64 of `nonce || ciphertext || tag`,
/// so the string carries everything needed to decrypt except the key.
pub fn encrypt_message(plaintext: &str, key_material: &str) -> Result<String> {
    let blob = encrypt_bytes(plaintext.as_bytes(), key_material)?;
    Ok(STANDARD.encode(blob))
}

/// Inverse of [`encrypt_message`]. Any malformed input or wrong key yields
/// `DecryptionFailed`; this never panics.
pub fn decrypt_message(ciphertext: &str, key_material: &str) -> Result<String> {
    let blob = STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| HushError::DecryptionFailed)?;
    let plaintext = decrypt_bytes(&blob, key_material)?;
    String::from_utf8(plaintext).map_err(|_| HushError::DecryptionFailed)
}

/// Encrypt raw bytes with a random per-call IV prefixed to the output:
/// `iv (12 bytes) || ciphertext || tag (16 bytes)`.
pub fn encrypt_bytes(data: &[u8], key_material: &str) -> Result<Vec<u8>> {
    let key = derive_key(key_material);
    encrypt_with_key(&key, data)
}

/// Inverse of [`encrypt_bytes`].
pub fn decrypt_bytes(blob: &[u8], key_material: &str) -> Result<Vec<u8>> {
    let key = derive_key(key_material);
    decrypt_with_key(&key, blob)
}

fn encrypt_with_key(key: &CipherKey, data: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| HushError::Randomness(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|_| HushError::InvalidInput("payload too large to encrypt".into()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_with_key(key: &CipherKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(HushError::DecryptionFailed);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| HushError::DecryptionFailed)
}
