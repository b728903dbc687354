//! In-process record store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    CommitOutcome, Entry, KeyFamily, KeyWatcher, RecordKey, RecordStore, StoreError,
    Versionstamp, WatchRegistry,
};

#[derive(Debug)]
struct Stored {
    value: Value,
    version: Versionstamp,
}

/// A [`RecordStore`] kept entirely in memory.
///
/// Conditional writes are serialized by the write lock, so exactly one of
/// several commits against the same version wins.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, Stored>>,
    last_version: AtomicI64,
    watches: WatchRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently watched.
    pub fn watched_keys(&self) -> usize {
        self.watches.watched_keys()
    }

    fn next_version(&self) -> Versionstamp {
        Versionstamp::new(self.last_version.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Entry, StoreError> {
        let records = self.records.read().await;
        Ok(match records.get(key) {
            Some(stored) => Entry {
                value: Some(stored.value.clone()),
                version: Some(stored.version),
            },
            None => Entry::absent(),
        })
    }

    async fn commit(
        &self,
        key: &RecordKey,
        expected: Option<Versionstamp>,
        value: Value,
    ) -> Result<CommitOutcome, StoreError> {
        let mut records = self.records.write().await;
        let current = records.get(key).map(|stored| stored.version);
        if current != expected {
            return Ok(CommitOutcome::VersionMismatch);
        }

        let version = self.next_version();
        records.insert(key.clone(), Stored { value, version });
        // Release the write lock before waking watchers so they can read.
        drop(records);

        self.watches.notify(key);
        Ok(CommitOutcome::Committed(version))
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), StoreError> {
        let removed = self.records.write().await.remove(key);
        if removed.is_some() {
            self.watches.notify(key);
        }
        Ok(())
    }

    async fn list(&self, family: KeyFamily) -> Result<Vec<(RecordKey, Entry)>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|(key, _)| key.family == family)
            .map(|(key, stored)| {
                (
                    key.clone(),
                    Entry {
                        value: Some(stored.value.clone()),
                        version: Some(stored.version),
                    },
                )
            })
            .collect())
    }

    fn watch(&self, key: &RecordKey) -> KeyWatcher {
        self.watches.subscribe(key)
    }
}
