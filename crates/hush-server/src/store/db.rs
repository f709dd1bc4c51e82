use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use super::{SecretRecord, SecretStore, StoreError};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Leading byte of every stored value, so the layout can change later
/// without guessing at old rows.
const RECORD_MARKER: u8 = 0x01;

pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// What actually goes into redb: the record plus the storage-side
/// creation time used for optional retention.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSecret {
    created_at: i64,
    record: SecretRecord,
}

/// Embedded single-file store.
///
/// redb serializes write transactions, and both `put` and `take` do all of
/// their work inside one, which is what makes fetch-and-delete atomic.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    retention: Option<Duration>,
}

impl RedbStore {
    /// Open (or create) the database at `path`. Secrets are kept until read.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            retention: None,
        })
    }

    /// Drop unread secrets older than `retention`. Expired rows read as
    /// missing and are removed lazily or by [`RedbStore::prune`].
    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn is_expired(&self, created_at: i64, now: i64) -> bool {
        match self.retention {
            Some(r) => now - created_at >= r.as_secs() as i64,
            None => false,
        }
    }

    /// Insert `record` unless its alias is held by a live secret.
    /// Returns `false` on collision.
    pub fn put(&self, record: &SecretRecord) -> Result<bool> {
        let now = Self::now();
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(SECRETS)?;

            let existing: Option<Vec<u8>> = table
                .get(record.alias.as_str())?
                .map(|guard| guard.value().to_vec());

            let taken = match existing {
                Some(bytes) => !self.is_expired(decode(&bytes)?.created_at, now),
                None => false,
            };

            if taken {
                false
            } else {
                let bytes = encode(&StoredSecret {
                    created_at: now,
                    record: record.clone(),
                })?;
                table.insert(record.alias.as_str(), bytes.as_slice())?;
                true
            }
        };
        write_txn.commit()?;

        if inserted {
            debug!(alias = %record.alias, secret_type = %record.secret_type, "stored secret");
        }
        Ok(inserted)
    }

    /// Remove and return the record under `alias`, if it is live.
    pub fn take(&self, alias: &str) -> Result<Option<SecretRecord>> {
        let now = Self::now();
        let write_txn = self.db.begin_write()?;
        let removed: Option<Vec<u8>> = {
            let mut table = write_txn.open_table(SECRETS)?;
            let removed = table.remove(alias)?.map(|guard| guard.value().to_vec());
            removed
        };
        write_txn.commit()?;

        match removed {
            None => Ok(None),
            Some(bytes) => {
                let stored = decode(&bytes)?;
                if self.is_expired(stored.created_at, now) {
                    debug!(alias = %alias, "lazy-evicted expired secret");
                    Ok(None)
                } else {
                    debug!(alias = %alias, "burned after read");
                    Ok(Some(stored.record))
                }
            }
        }
    }

    /// Number of stored rows, expired or not.
    pub fn count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        Ok(table.iter()?.count())
    }

    /// Remove every secret past retention. Returns how many were removed.
    pub fn prune(&self) -> Result<usize> {
        if self.retention.is_none() {
            return Ok(0);
        }
        let now = Self::now();

        let expired: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SECRETS)?;
            let mut keys = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                if self.is_expired(decode(v.value())?.created_at, now) {
                    keys.push(k.value().to_owned());
                }
            }
            keys
        };

        if expired.is_empty() {
            return Ok(0);
        }

        // Re-check inside the write transaction: a row may have been read
        // or replaced since the scan.
        let write_txn = self.db.begin_write()?;
        let mut removed = 0usize;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            for key in &expired {
                let bytes: Option<Vec<u8>> =
                    table.get(key.as_str())?.map(|guard| guard.value().to_vec());
                if let Some(bytes) = bytes {
                    if self.is_expired(decode(&bytes)?.created_at, now) {
                        table.remove(key.as_str())?;
                        removed += 1;
                    }
                }
            }
        }
        write_txn.commit()?;

        if removed > 0 {
            info!(removed, "pruned expired secrets");
        }
        Ok(removed)
    }

    /// Spawn a background Tokio task that calls `prune()` every `interval`.
    /// A zero interval is raised to `MIN_SWEEP_INTERVAL`.
    pub fn spawn_sweep(self, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.prune() {
                    warn!(error = %e, "background sweep error");
                }
            }
        })
    }
}

#[async_trait]
impl SecretStore for RedbStore {
    async fn insert(&self, record: SecretRecord) -> Result<(), StoreError> {
        if self.put(&record)? {
            Ok(())
        } else {
            Err(StoreError::AliasCollision(record.alias))
        }
    }

    async fn fetch_and_delete(&self, alias: &str) -> Result<SecretRecord, StoreError> {
        self.take(alias)?
            .ok_or_else(|| StoreError::NotFound(alias.to_owned()))
    }
}

fn encode(stored: &StoredSecret) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(stored, bincode::config::standard())
        .context("bincode encode")?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_MARKER);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<StoredSecret> {
    match bytes.split_first() {
        Some((&RECORD_MARKER, payload)) => {
            let (stored, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .context("bincode decode")?;
            Ok(stored)
        }
        Some((marker, _)) => anyhow::bail!("unknown record marker {marker:#04x}"),
        None => anyhow::bail!("empty record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ReceiptRouting, SecretType};
    use tempfile::tempdir;

    fn make_store() -> (RedbStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn record(alias: &str) -> SecretRecord {
        SecretRecord {
            alias: alias.into(),
            message: "ciphertext".into(),
            secret_type: SecretType::Neogram,
            is_encrypted_with_user_password: true,
            neogram_destruction_message: Some("bye".into()),
            neogram_destruction_timeout: Some(5),
            receipt: Some(ReceiptRouting {
                email: Some("enc:mail".into()),
                phone_number: None,
            }),
        }
    }

    #[test]
    fn put_take_burns() {
        let (s, _dir) = make_store();
        assert!(s.put(&record("A")).unwrap());
        assert_eq!(s.take("A").unwrap(), Some(record("A")));
        assert_eq!(s.take("A").unwrap(), None);
        assert_eq!(s.count().unwrap(), 0);
    }

    #[test]
    fn put_refuses_live_alias() {
        let (s, _dir) = make_store();
        assert!(s.put(&record("A")).unwrap());
        let mut other = record("A");
        other.message = "other".into();
        assert!(!s.put(&other).unwrap());
        assert_eq!(s.take("A").unwrap().unwrap().message, "ciphertext");
    }

    #[test]
    fn take_missing_is_noop() {
        let (s, _dir) = make_store();
        s.put(&record("A")).unwrap();
        assert_eq!(s.take("B").unwrap(), None);
        assert_eq!(s.count().unwrap(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let s = RedbStore::open(&path).unwrap();
            s.put(&record("KEEP")).unwrap();
        }
        let s = RedbStore::open(&path).unwrap();
        assert_eq!(s.take("KEEP").unwrap(), Some(record("KEEP")));
    }

    #[test]
    fn retention_expires_and_frees_alias() {
        let (s, _dir) = make_store();
        let s = s.with_retention(Some(Duration::ZERO));
        s.put(&record("OLD")).unwrap();
        // Zero retention: already expired, so the alias is reusable.
        assert!(s.put(&record("OLD")).unwrap());
        assert_eq!(s.take("OLD").unwrap(), None);
    }

    #[test]
    fn prune_removes_expired() {
        let (s, _dir) = make_store();
        s.put(&record("A")).unwrap();
        s.put(&record("B")).unwrap();
        assert_eq!(s.prune().unwrap(), 0); // no retention configured
        let s = s.with_retention(Some(Duration::ZERO));
        assert_eq!(s.prune().unwrap(), 2);
        assert_eq!(s.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn trait_maps_outcomes() {
        let (s, _dir) = make_store();
        s.insert(record("T")).await.unwrap();
        assert!(matches!(
            s.insert(record("T")).await,
            Err(StoreError::AliasCollision(_))
        ));
        assert!(s.fetch_and_delete("T").await.is_ok());
        assert!(matches!(
            s.fetch_and_delete("T").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn zero_sweep_interval_keeps_task_alive() {
        let (s, _dir) = make_store();
        let sweep = s.spawn_sweep(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sweep.is_finished());
        sweep.abort();
    }

    #[test]
    fn decode_rejects_unknown_marker() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x7f, 1, 2]).is_err());
    }
}
