//! Per-key change notification.
//!
//! Each watched key owns a `tokio::sync::watch` channel carrying a change
//! counter. Watch channels keep only the latest value, so bursts of
//! commits coalesce into a single wake-up; watchers re-read the store
//! instead of trusting the notification payload.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;

use super::RecordKey;

type Channels = Mutex<HashMap<RecordKey, watch::Sender<u64>>>;

/// Registry of live watch channels, shared by a store and its notifier.
///
/// A key's channel exists only while at least one [`KeyWatcher`] holds it.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    channels: Arc<Channels>,
}

/// Receives notifications when a watched key changes.
#[derive(Debug)]
pub struct KeyWatcher {
    rx: watch::Receiver<u64>,
    key: RecordKey,
    channels: Weak<Channels>,
}

/// The store that issued the watcher is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("record store closed")]
pub struct StoreClosed;

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, key: &RecordKey) -> KeyWatcher {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let rx = match channels.get(key) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(0);
                channels.insert(key.clone(), tx);
                rx
            }
        };
        KeyWatcher {
            rx,
            key: key.clone(),
            channels: Arc::downgrade(&self.channels),
        }
    }

    /// Wake every watcher of `key`.
    pub fn notify(&self, key: &RecordKey) {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = channels.get(key) {
            tx.send_modify(|n| *n = n.wrapping_add(1));
        }
    }

    /// Wake every watcher of every key.
    ///
    /// Used when notifications may have been lost, e.g. after the
    /// notification connection was re-established.
    pub fn notify_all(&self) {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        for tx in channels.values() {
            tx.send_modify(|n| *n = n.wrapping_add(1));
        }
    }

    /// Number of keys with at least one live watcher.
    pub fn watched_keys(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl KeyWatcher {
    /// Wait until the key changes.
    ///
    /// Several changes that happen before this is polled are reported once.
    pub async fn changed(&mut self) -> Result<(), StoreClosed> {
        self.rx.changed().await.map_err(|_| StoreClosed)
    }
}

impl Drop for KeyWatcher {
    fn drop(&mut self) {
        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        let mut channels = channels.lock().unwrap_or_else(PoisonError::into_inner);
        // `self.rx` is still alive here, so the last watcher sees a count of 1.
        if channels
            .get(&self.key)
            .is_some_and(|tx| tx.receiver_count() <= 1)
        {
            channels.remove(&self.key);
        }
    }
}
