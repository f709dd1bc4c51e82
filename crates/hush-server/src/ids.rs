//! Random identifiers for secrets.
//!
//! Aliases and encryption keys are drawn from the same unambiguous alphabet
//! (no `0 O 1 I l`) since both end up in links people read aloud or retype.
//! Only the OS random source is used; if it fails, creation fails.

use rand::{rngs::OsRng, RngCore};

use crate::error::{HushError, Result};

/// Characters allowed in generated aliases and keys.
pub const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
/// Length of a generated alias (the public path segment of a link).
pub const URL_ALIAS_LENGTH: usize = 14;
/// Length of a generated transport key (the link fragment).
pub const ENCRYPTION_KEY_LENGTH: usize = 28;

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are rejected so every character is equally likely.
const ACCEPT_BELOW: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// A fresh alias of `URL_ALIAS_LENGTH` characters.
pub fn generate_alias() -> Result<String> {
    random_string(URL_ALIAS_LENGTH)
}

/// A fresh transport key of `ENCRYPTION_KEY_LENGTH` characters.
/// Never log or persist the result.
pub fn generate_encryption_key() -> Result<String> {
    random_string(ENCRYPTION_KEY_LENGTH)
}

/// Uniformly random string of `len` characters from `ALPHABET`.
pub fn random_string(len: usize) -> Result<String> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| HushError::Randomness(e.to_string()))?;
        for &b in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if out.len() == len {
                break;
            }
            out.push(ALPHABET[b as usize % ALPHABET.len()] as char);
        }
    }
    Ok(out)
}

/// True if every character of `s` is in `ALPHABET`.
pub fn is_from_alphabet(s: &str) -> bool {
    s.bytes().all(|b| ALPHABET.contains(&b))
}
