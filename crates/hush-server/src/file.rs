//! File secrets.
//!
//! The bytes are encrypted under their own random key and stored wherever
//! the host keeps blobs. The secret's message is a [`FileReference`]
//! pointing at that blob and carrying its key, so it is protected by the
//! same transport (and optional password) layers as any text secret.

use serde::{Deserialize, Serialize};

use crate::cipher;
use crate::error::{HushError, Result};
use crate::ids;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Where the encrypted blob lives (object key, URL, path).
    pub location: String,
    pub name: String,
    pub mime_type: Option<String>,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Key material for the blob.
    pub file_key: String,
}

impl FileReference {
    /// Serialize into the text message of a `file` secret.
    pub fn to_message(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| HushError::InvalidInput(e.to_string()))
    }

    /// Parse the decrypted message of a `file` secret.
    pub fn from_message(message: &str) -> Result<Self> {
        serde_json::from_str(message)
            .map_err(|e| HushError::InvalidInput(format!("not a file reference: {e}")))
    }
}

/// Encrypt `data` under a fresh key. Returns the blob to upload to
/// `location` and the reference to share.
pub fn seal_file(
    data: &[u8],
    name: &str,
    mime_type: Option<&str>,
    location: &str,
) -> Result<(Vec<u8>, FileReference)> {
    if name.is_empty() || location.is_empty() {
        return Err(HushError::InvalidInput(
            "file name and location are required".into(),
        ));
    }
    let file_key = ids::generate_encryption_key()?;
    let blob = cipher::encrypt_bytes(data, &file_key)?;
    let reference = FileReference {
        location: location.to_owned(),
        name: name.to_owned(),
        mime_type: mime_type.map(str::to_owned),
        size: data.len() as u64,
        file_key,
    };
    Ok((blob, reference))
}

/// Decrypt a downloaded blob and check it against the reference.
pub fn open_file(reference: &FileReference, blob: &[u8]) -> Result<Vec<u8>> {
    let data = cipher::decrypt_bytes(blob, &reference.file_key)?;
    if data.len() as u64 != reference.size {
        return Err(HushError::DecryptionFailed);
    }
    Ok(data)
}
