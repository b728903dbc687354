//! Versioned record store.
//!
//! A key-value contract with three capabilities the rest of the core
//! relies on:
//!
//! - read a value together with its [`Versionstamp`],
//! - conditionally replace it ([`RecordStore::commit`]), succeeding only
//!   if the stored version still equals the one the caller read,
//! - watch a key for changes ([`RecordStore::watch`]).
//!
//! The conditional write is the only concurrency control in the system.
//! Nothing above this module takes a lock.

mod memory;
mod postgres;
mod watch;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use watch::{KeyWatcher, StoreClosed, WatchRegistry};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::event_id::EventId;

/// Opaque, strictly increasing version tag of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Versionstamp(i64);

impl Versionstamp {
    pub fn new(raw: i64) -> Self {
        Versionstamp(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

/// The two key families kept per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyFamily {
    Events,
    Participants,
}

impl KeyFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyFamily::Events => "events",
            KeyFamily::Participants => "participants",
        }
    }
}

impl FromStr for KeyFamily {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(KeyFamily::Events),
            "participants" => Ok(KeyFamily::Participants),
            _ => Err(InvalidKey),
        }
    }
}

/// `{family}/{eventId}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub family: KeyFamily,
    pub event_id: EventId,
}

impl RecordKey {
    pub fn event(event_id: EventId) -> Self {
        RecordKey {
            family: KeyFamily::Events,
            event_id,
        }
    }

    pub fn participants(event_id: EventId) -> Self {
        RecordKey {
            family: KeyFamily::Participants,
            event_id,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family.as_str(), self.event_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed record key")]
pub struct InvalidKey;

impl FromStr for RecordKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, event_id) = s.split_once('/').ok_or(InvalidKey)?;
        Ok(RecordKey {
            family: family.parse()?,
            event_id: event_id.parse().map_err(|_| InvalidKey)?,
        })
    }
}

/// A read result. An absent key has neither value nor version.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T = Value> {
    pub value: Option<T>,
    pub version: Option<Versionstamp>,
}

impl<T> Entry<T> {
    pub fn absent() -> Self {
        Entry {
            value: None,
            version: None,
        }
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(Versionstamp),
    /// The stored version no longer matches the expected one.
    VersionMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to decode record {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Entry, StoreError>;

    /// Replace the value at `key` if its current version equals `expected`.
    ///
    /// `expected = None` means the key must not exist yet.
    async fn commit(
        &self,
        key: &RecordKey,
        expected: Option<Versionstamp>,
        value: Value,
    ) -> Result<CommitOutcome, StoreError>;

    /// Unconditionally remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &RecordKey) -> Result<(), StoreError>;

    /// Every stored entry of one family.
    async fn list(&self, family: KeyFamily) -> Result<Vec<(RecordKey, Entry)>, StoreError>;

    /// Register interest in changes of `key`.
    ///
    /// The watcher only reports changes made after this call returns.
    fn watch(&self, key: &RecordKey) -> KeyWatcher;
}

/// Read `key` and decode its value.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn RecordStore,
    key: &RecordKey,
) -> Result<Entry<T>, StoreError> {
    let entry = store.get(key).await?;
    Ok(Entry {
        value: entry
            .value
            .map(|v| decode(key, v))
            .transpose()?,
        version: entry.version,
    })
}

/// Encode `value` and conditionally write it to `key`.
pub async fn commit_typed<T: Serialize + ?Sized>(
    store: &dyn RecordStore,
    key: &RecordKey,
    expected: Option<Versionstamp>,
    value: &T,
) -> Result<CommitOutcome, StoreError> {
    let value = serde_json::to_value(value).map_err(StoreError::Encode)?;
    store.commit(key, expected, value).await
}

pub(crate) fn decode<T: DeserializeOwned>(key: &RecordKey, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_text_form_round_trips() {
        let key = RecordKey::participants("7QW3ZZ0K".parse().unwrap());
        assert_eq!(key.to_string(), "participants/7QW3ZZ0K");
        assert_eq!("participants/7QW3ZZ0K".parse::<RecordKey>(), Ok(key));
    }

    #[test]
    fn test_rejects_unknown_family_or_bad_id() {
        assert!("tickets/7QW3ZZ0K".parse::<RecordKey>().is_err());
        assert!("events/short".parse::<RecordKey>().is_err());
        assert!("events".parse::<RecordKey>().is_err());
    }
}
