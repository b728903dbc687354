//! Participant feed publisher.
//!
//! A subscription yields the full participant list of one event: once
//! right away, then again after every observed change. Bursts of commits
//! may collapse into one snapshot, but the last snapshot always matches the
//! store once writes settle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::stream::{self, BoxStream, StreamExt};
use trakko_sdk::objects::{FeedMessage, Participant};

use crate::allocator::load_participants;
use crate::event_id::EventId;
use crate::store::{KeyWatcher, RecordKey, RecordStore, StoreError, Versionstamp};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("failed to read participants: {0}")]
    Store(#[from] StoreError),
}

/// The whole participant list of an event at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantsSnapshot {
    pub event_id: EventId,
    pub participants: Vec<Participant>,
}

impl ParticipantsSnapshot {
    pub fn count(&self) -> usize {
        self.participants.len()
    }

    pub fn into_message(self) -> FeedMessage {
        FeedMessage::participants_update(self.participants)
    }
}

#[derive(Clone)]
pub struct ParticipantFeed {
    store: Arc<dyn RecordStore>,
    subscribers: Arc<AtomicUsize>,
}

struct SubscriberGuard {
    event_id: EventId,
    subscribers: Arc<AtomicUsize>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let left = self.subscribers.fetch_sub(1, Ordering::Relaxed) - 1;
        tracing::debug!(event_id = %self.event_id, subscribers = left, "feed subscriber left");
    }
}

struct FeedState {
    store: Arc<dyn RecordStore>,
    watcher: KeyWatcher,
    last_version: Option<Versionstamp>,
    guard: SubscriberGuard,
}

impl ParticipantFeed {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of open subscriptions across all events.
    pub fn active_subscribers(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Open a feed for `event_id`.
    ///
    /// Fails only if the initial read fails. The returned stream's first
    /// item is that initial snapshot; it ends when the store shuts down.
    /// Dropping it releases the underlying watch.
    pub async fn subscribe(
        &self,
        event_id: EventId,
    ) -> Result<BoxStream<'static, ParticipantsSnapshot>, FeedError> {
        // Watch first: a commit landing between the read and the watch
        // would otherwise never be delivered.
        let watcher = self.store.watch(&RecordKey::participants(event_id.clone()));
        let initial = load_participants(&*self.store, &event_id).await?;

        let active = self.subscribers.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(%event_id, subscribers = active, "feed subscriber joined");

        let first = ParticipantsSnapshot {
            event_id: event_id.clone(),
            participants: initial.value.unwrap_or_default(),
        };
        let state = FeedState {
            store: Arc::clone(&self.store),
            watcher,
            last_version: initial.version,
            guard: SubscriberGuard {
                event_id,
                subscribers: Arc::clone(&self.subscribers),
            },
        };

        Ok(stream::once(async move { first })
            .chain(stream::unfold(state, next_snapshot))
            .boxed())
    }
}

async fn next_snapshot(mut state: FeedState) -> Option<(ParticipantsSnapshot, FeedState)> {
    loop {
        if state.watcher.changed().await.is_err() {
            tracing::debug!(event_id = %state.guard.event_id, "store closed, ending feed");
            return None;
        }

        let event_id = &state.guard.event_id;
        match load_participants(&*state.store, event_id).await {
            Ok(entry) if entry.version == state.last_version => {
                tracing::trace!(%event_id, "spurious wake-up, list unchanged");
            }
            Ok(entry) => {
                state.last_version = entry.version;
                let snapshot = ParticipantsSnapshot {
                    event_id: event_id.clone(),
                    participants: entry.value.unwrap_or_default(),
                };
                return Some((snapshot, state));
            }
            Err(e) => {
                // The next change retries the read.
                tracing::warn!(%event_id, error = %e, "failed to re-read participants");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{AllocateTicket, NewParticipant, TicketAllocator};
    use crate::store::MemoryStore;
    use kanau::processor::Processor;
    use std::time::Duration;

    fn event_id() -> EventId {
        "FEED0001".parse().unwrap()
    }

    fn setup() -> (ParticipantFeed, TicketAllocator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            ParticipantFeed::new(store.clone()),
            TicketAllocator::new(store.clone()),
            store,
        )
    }

    async fn register(allocator: &TicketAllocator, name: &str) -> Participant {
        allocator
            .process(AllocateTicket {
                event_id: event_id(),
                participant: NewParticipant {
                    name: Some(name.into()),
                    provenance: None,
                    category: "General".into(),
                },
            })
            .await
            .unwrap()
    }

    async fn next(feed: &mut BoxStream<'static, ParticipantsSnapshot>) -> ParticipantsSnapshot {
        tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .expect("feed stalled")
            .expect("feed ended")
    }

    #[tokio::test]
    async fn test_first_snapshot_is_immediate() {
        let (feed, allocator, _store) = setup();
        register(&allocator, "early").await;

        let mut stream = feed.subscribe(event_id()).await.unwrap();
        let first = next(&mut stream).await;
        assert_eq!(first.count(), 1);
        assert_eq!(first.participants[0].name.as_deref(), Some("early"));
    }

    #[tokio::test]
    async fn test_unknown_event_starts_empty() {
        let (feed, _allocator, _store) = setup();
        let mut stream = feed.subscribe(event_id()).await.unwrap();
        assert!(next(&mut stream).await.participants.is_empty());
    }

    #[tokio::test]
    async fn test_each_change_delivers_full_list() {
        let (feed, allocator, _store) = setup();
        let mut stream = feed.subscribe(event_id()).await.unwrap();
        assert_eq!(next(&mut stream).await.count(), 0);

        let p1 = register(&allocator, "one").await;
        let snap = next(&mut stream).await;
        assert_eq!(snap.participants, vec![p1.clone()]);

        let p2 = register(&allocator, "two").await;
        let snap = next(&mut stream).await;
        assert_eq!(snap.participants, vec![p1, p2]);

        let FeedMessage::ParticipantsUpdate { count, .. } = snap.into_message();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_burst_collapses_to_latest_state() {
        let (feed, allocator, _store) = setup();
        let mut stream = feed.subscribe(event_id()).await.unwrap();
        next(&mut stream).await;

        for name in ["a", "b", "c"] {
            register(&allocator, name).await;
        }

        let snap = next(&mut stream).await;
        assert_eq!(snap.count(), 3);
        let extra = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(extra.is_err(), "no further snapshot expected");
    }

    #[tokio::test]
    async fn test_deleted_list_reads_as_empty() {
        let (feed, allocator, store) = setup();
        register(&allocator, "gone").await;
        let mut stream = feed.subscribe(event_id()).await.unwrap();
        assert_eq!(next(&mut stream).await.count(), 1);

        store
            .delete(&RecordKey::participants(event_id()))
            .await
            .unwrap();
        assert!(next(&mut stream).await.participants.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_subscriber() {
        let (feed, _allocator, store) = setup();
        let stream = feed.subscribe(event_id()).await.unwrap();
        assert_eq!(feed.active_subscribers(), 1);
        assert_eq!(store.watched_keys(), 1);
        drop(stream);
        assert_eq!(feed.active_subscribers(), 0);
        assert_eq!(store.watched_keys(), 0);
    }

    #[tokio::test]
    async fn test_feeds_on_quiet_events_leave_nothing_behind() {
        let (feed, _allocator, store) = setup();
        for i in 0..200 {
            let id: EventId = format!("{i:08}").parse().unwrap();
            let mut stream = feed.subscribe(id).await.unwrap();
            assert!(next(&mut stream).await.participants.is_empty());
        }
        assert_eq!(store.watched_keys(), 0);
    }
}
