use crate::store::StoreError;

/// Failures surfaced by the public secret operations.
///
/// `SecretNotFound` and `DecryptionFailed` are kept apart so a client can
/// tell "this link is dead" from "your key or password is wrong".
#[derive(Debug, thiserror::Error)]
pub enum HushError {
    /// Empty alias/key/message or options that don't fit the secret type.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The alias is already taken by a live secret.
    #[error("alias already in use: {0}")]
    AliasCollision(String),
    /// Already viewed, or never existed.
    #[error("secret not found: it was already viewed or never existed")]
    SecretNotFound,
    #[error("decryption failed: wrong key or corrupted ciphertext")]
    DecryptionFailed,
    /// The OS random source could not be read. Creation is aborted.
    #[error("secure random source unavailable: {0}")]
    Randomness(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for HushError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AliasCollision(alias) => HushError::AliasCollision(alias),
            StoreError::NotFound(_) => HushError::SecretNotFound,
            StoreError::Backend(e) => HushError::Storage(format!("{e:#}")),
        }
    }
}

pub type Result<T, E = HushError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_says_not_found() {
        let err: HushError = StoreError::NotFound("abc".into()).into();
        assert!(matches!(err, HushError::SecretNotFound));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn backend_errors_keep_their_context() {
        let err: HushError = StoreError::Backend(anyhow::anyhow!("disk full")).into();
        assert!(err.to_string().contains("disk full"));
    }
}
