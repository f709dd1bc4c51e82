use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the recipient's client should present a secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    #[default]
    Text,
    /// Redirect to the decrypted URL instead of displaying it.
    Url,
    /// Animated reveal with a destruction countdown.
    Neogram,
    /// The message is a [`crate::file::FileReference`] to an encrypted blob.
    File,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::Text => "text",
            SecretType::Url => "url",
            SecretType::Neogram => "neogram",
            SecretType::File => "file",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(SecretType::Text),
            "url" => Ok(SecretType::Url),
            "neogram" => Ok(SecretType::Neogram),
            "file" => Ok(SecretType::File),
            other => Err(format!("unknown secret type: {other}")),
        }
    }
}

/// Out-of-band read-receipt addresses. Callers encrypt these before
/// handing them over; the store keeps them opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRouting {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl ReceiptRouting {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone_number.is_none()
    }
}

/// A stored secret. Exists until it is fetched once.
///
/// `message` is always ciphertext under the transport key (and, when
/// `is_encrypted_with_user_password` is set, under the password first).
/// Nothing here is enough to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub alias: String,
    pub message: String,
    pub secret_type: SecretType,
    pub is_encrypted_with_user_password: bool,
    pub neogram_destruction_message: Option<String>,
    /// Seconds.
    pub neogram_destruction_timeout: Option<u32>,
    pub receipt: Option<ReceiptRouting>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_type_parses_case_insensitively() {
        assert_eq!("URL".parse::<SecretType>().unwrap(), SecretType::Url);
        assert_eq!("neogram".parse::<SecretType>().unwrap(), SecretType::Neogram);
        assert!("video".parse::<SecretType>().is_err());
    }

    #[test]
    fn record_json_uses_lowercase_type() {
        let record = SecretRecord {
            alias: "abc".into(),
            message: "ct".into(),
            secret_type: SecretType::Neogram,
            is_encrypted_with_user_password: false,
            neogram_destruction_message: None,
            neogram_destruction_timeout: Some(5),
            receipt: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["secret_type"], "neogram");
        let back: SecretRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
