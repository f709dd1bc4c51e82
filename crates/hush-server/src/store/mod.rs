pub mod db;
pub mod memory;
pub mod model;
pub mod remote;

use async_trait::async_trait;

pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::{ReceiptRouting, SecretRecord, SecretType};
pub use remote::HttpStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A live record already uses this alias. Nothing was written.
    #[error("alias already in use: {0}")]
    AliasCollision(String),
    #[error("no secret stored under {0}")]
    NotFound(String),
    #[error("storage backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Persistence gateway for one-time secrets.
///
/// Implementations must provide two guarantees:
/// * `insert` never overwrites; a taken alias returns `AliasCollision`.
/// * `fetch_and_delete` finds and removes the record as one atomic step,
///   so of any number of concurrent calls for an alias exactly one gets
///   the record and the rest get `NotFound`.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Store `record` under `record.alias`.
    async fn insert(&self, record: SecretRecord) -> Result<(), StoreError>;

    /// Remove and return the record stored under `alias`.
    async fn fetch_and_delete(&self, alias: &str) -> Result<SecretRecord, StoreError>;
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for std::sync::Arc<S> {
    async fn insert(&self, record: SecretRecord) -> Result<(), StoreError> {
        (**self).insert(record).await
    }

    async fn fetch_and_delete(&self, alias: &str) -> Result<SecretRecord, StoreError> {
        (**self).fetch_and_delete(alias).await
    }
}
