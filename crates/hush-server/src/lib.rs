//! One-time secrets.
//!
//! A sender encrypts a message locally, stores only the ciphertext under a
//! random alias, and shares a link whose fragment carries the key. The
//! first retrieval removes the record; every later one finds nothing.

pub mod cipher;
pub mod dirs;
pub mod error;
pub mod file;
pub mod handlers;
pub mod ids;
pub mod lifecycle;
pub mod link;
pub mod server;
pub mod store;

use std::sync::Arc;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::SecretStore>,
    /// Largest accepted ciphertext, in bytes.
    pub max_message_bytes: usize,
}

pub use cipher::{decrypt_message, encrypt_message};
pub use error::HushError;
pub use ids::{generate_alias, generate_encryption_key};
pub use lifecycle::{CreateOptions, CreatedSecret, SecretLifecycle, SecretPayload};
pub use link::{parse_secret_link, secret_link};
pub use server::{resolve_data_dir, router, run, ServerConfig};
pub use store::{
    HttpStore, MemoryStore, ReceiptRouting, RedbStore, SecretRecord, SecretStore, SecretType,
    StoreError,
};
