use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cipher;
use crate::error::{HushError, Result};
use crate::file::FileReference;
use crate::ids;
use crate::link;
use crate::store::{ReceiptRouting, SecretRecord, SecretStore, SecretType, StoreError};

/// Extra attempts with a fresh alias when a generated alias collides.
/// Caller-chosen aliases are never retried.
pub const ALIAS_COLLISION_RETRIES: usize = 1;
pub const DEFAULT_NEOGRAM_MESSAGE: &str = "This message will self-destruct in…";
pub const DEFAULT_NEOGRAM_TIMEOUT: u32 = 5;
pub const MAX_NEOGRAM_TIMEOUT: u32 = 3600;

const MIN_CUSTOM_ALIAS_LEN: usize = 4;
const MAX_CUSTOM_ALIAS_LEN: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Use this alias instead of generating one.
    pub alias: Option<String>,
    /// Use this transport key instead of generating one.
    pub encryption_key: Option<String>,
    /// Encrypt with this password before the transport layer.
    pub password: Option<String>,
    pub secret_type: SecretType,
    pub neogram_destruction_message: Option<String>,
    pub neogram_destruction_timeout: Option<u32>,
    pub receipt: Option<ReceiptRouting>,
}

/// What the sender gets back. `encryption_key` is also inside the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSecret {
    pub alias: String,
    pub encryption_key: String,
    pub secret_link: String,
}

/// What the recipient gets back, with the transport layer removed.
///
/// If `is_encrypted_with_user_password` is set, `message` is still
/// password ciphertext; pass it to [`cipher::decrypt_message`] with the
/// password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPayload {
    pub message: String,
    pub secret_type: SecretType,
    pub is_encrypted_with_user_password: bool,
    pub neogram_destruction_message: Option<String>,
    pub neogram_destruction_timeout: Option<u32>,
    pub receipt: Option<ReceiptRouting>,
}

impl SecretPayload {
    /// Remove the password layer.
    pub fn decrypt_with_password(&self, password: &str) -> Result<String> {
        if !self.is_encrypted_with_user_password {
            return Ok(self.message.clone());
        }
        let plaintext = cipher::decrypt_message(&self.message, password)?;
        if plaintext.is_empty() {
            return Err(HushError::DecryptionFailed);
        }
        Ok(plaintext)
    }
}

/// Creates and burns one-time secrets on top of a [`SecretStore`].
///
/// Holds no state besides the store handle and the link base, so clones can
/// be shared freely across tasks.
#[derive(Debug, Clone)]
pub struct SecretLifecycle<S> {
    store: S,
    base_url: String,
}

impl<S: SecretStore> SecretLifecycle<S> {
    /// `base_url` is the root that share links are built on.
    pub fn new(store: S, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Encrypt `message` and store it under a unique alias.
    ///
    /// With a password the message is encrypted twice: password innermost,
    /// transport key outermost. A generated alias that collides is replaced
    /// and retried once; a caller-supplied alias that collides fails with
    /// `AliasCollision` straight away.
    pub async fn create_secret(
        &self,
        message: &str,
        options: CreateOptions,
    ) -> Result<CreatedSecret> {
        let (neogram_message, neogram_timeout) = validate_create(message, &options)?;

        let encryption_key = match options.encryption_key {
            Some(key) => key,
            None => ids::generate_encryption_key()?,
        };

        let inner = match options.password.as_deref() {
            Some(password) => cipher::encrypt_message(message, password)?,
            None => message.to_owned(),
        };
        let ciphertext = cipher::encrypt_message(&inner, &encryption_key)?;

        let receipt = options.receipt.filter(|r| !r.is_empty());
        let generated = options.alias.is_none();
        let mut alias = match options.alias {
            Some(alias) => alias,
            None => ids::generate_alias()?,
        };

        let mut retries = 0;
        loop {
            let record = SecretRecord {
                alias: alias.clone(),
                message: ciphertext.clone(),
                secret_type: options.secret_type,
                is_encrypted_with_user_password: options.password.is_some(),
                neogram_destruction_message: neogram_message.clone(),
                neogram_destruction_timeout: neogram_timeout,
                receipt: receipt.clone(),
            };
            match self.store.insert(record).await {
                Ok(()) => break,
                Err(StoreError::AliasCollision(_))
                    if generated && retries < ALIAS_COLLISION_RETRIES =>
                {
                    retries += 1;
                    warn!(alias = %alias, "generated alias collided, retrying with a fresh one");
                    alias = ids::generate_alias()?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            alias = %alias,
            secret_type = %options.secret_type,
            password = options.password.is_some(),
            "secret created"
        );

        let secret_link = link::secret_link(&self.base_url, &alias, &encryption_key);
        Ok(CreatedSecret {
            alias,
            encryption_key,
            secret_link,
        })
    }

    /// Fetch-and-delete the secret under `alias` and remove the transport
    /// layer with `decryption_key`.
    ///
    /// The record is gone once the store hands it over, even if decryption
    /// then fails.
    pub async fn retrieve_secret(
        &self,
        alias: &str,
        decryption_key: &str,
    ) -> Result<SecretPayload> {
        if alias.is_empty() {
            return Err(HushError::InvalidInput("alias must not be empty".into()));
        }
        if decryption_key.is_empty() {
            return Err(HushError::InvalidInput(
                "decryption key must not be empty".into(),
            ));
        }

        let record = match self.store.fetch_and_delete(alias).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                debug!(alias = %alias, "secret not found");
                return Err(HushError::SecretNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let message = cipher::decrypt_message(&record.message, decryption_key)?;
        if message.is_empty() {
            return Err(HushError::DecryptionFailed);
        }

        debug!(alias = %alias, secret_type = %record.secret_type, "secret retrieved and burned");
        Ok(SecretPayload {
            message,
            secret_type: record.secret_type,
            is_encrypted_with_user_password: record.is_encrypted_with_user_password,
            neogram_destruction_message: record.neogram_destruction_message,
            neogram_destruction_timeout: record.neogram_destruction_timeout,
            receipt: record.receipt,
        })
    }

    /// [`Self::retrieve_secret`] from a share link.
    pub async fn retrieve_link(&self, secret_link: &str) -> Result<SecretPayload> {
        let (alias, key) = link::parse_secret_link(secret_link)?;
        self.retrieve_secret(&alias, &key).await
    }
}

/// Checks everything before any crypto or storage work. Returns the
/// neogram fields to store, with defaults filled in.
fn validate_create(
    message: &str,
    options: &CreateOptions,
) -> Result<(Option<String>, Option<u32>)> {
    if message.is_empty() {
        return Err(HushError::InvalidInput("message must not be empty".into()));
    }
    if let Some(alias) = &options.alias {
        validate_custom_alias(alias)?;
    }
    if options.encryption_key.as_deref() == Some("") {
        return Err(HushError::InvalidInput(
            "encryption key must not be empty".into(),
        ));
    }
    if options.password.as_deref() == Some("") {
        return Err(HushError::InvalidInput("password must not be empty".into()));
    }

    match options.secret_type {
        SecretType::Url => {
            let url = url::Url::parse(message)
                .map_err(|e| HushError::InvalidInput(format!("url secret is not a URL: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(HushError::InvalidInput(
                    "url secret must be http or https".into(),
                ));
            }
        }
        SecretType::File => {
            FileReference::from_message(message)?;
        }
        SecretType::Text | SecretType::Neogram => {}
    }

    if options.secret_type != SecretType::Neogram {
        if options.neogram_destruction_message.is_some()
            || options.neogram_destruction_timeout.is_some()
        {
            return Err(HushError::InvalidInput(
                "neogram options require secret type neogram".into(),
            ));
        }
        return Ok((None, None));
    }

    let timeout = options
        .neogram_destruction_timeout
        .unwrap_or(DEFAULT_NEOGRAM_TIMEOUT);
    if !(1..=MAX_NEOGRAM_TIMEOUT).contains(&timeout) {
        return Err(HushError::InvalidInput(format!(
            "neogram timeout must be 1..={MAX_NEOGRAM_TIMEOUT} seconds"
        )));
    }
    let destruction_message = options
        .neogram_destruction_message
        .clone()
        .unwrap_or_else(|| DEFAULT_NEOGRAM_MESSAGE.to_owned());
    Ok((Some(destruction_message), Some(timeout)))
}

fn validate_custom_alias(alias: &str) -> Result<()> {
    let len_ok = (MIN_CUSTOM_ALIAS_LEN..=MAX_CUSTOM_ALIAS_LEN).contains(&alias.len());
    let chars_ok = alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(HushError::InvalidInput(format!(
            "alias must be {MIN_CUSTOM_ALIAS_LEN}-{MAX_CUSTOM_ALIAS_LEN} characters of A-Z, a-z, 0-9, '-' or '_'"
        )))
    }
}
