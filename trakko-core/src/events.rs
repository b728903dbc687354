//! Event lifecycle: creation, lookup, rename and cascading delete.

use std::cmp::Reverse;
use std::sync::Arc;

use itertools::Itertools;
use kanau::processor::Processor;
use trakko_sdk::objects::{EventRecord, EventResponse};

use crate::allocator::{DEFAULT_MAX_ATTEMPTS, commit_timestamp};
use crate::event_id::EventId;
use crate::store::{
    CommitOutcome, KeyFamily, RecordKey, RecordStore, StoreError, commit_typed, decode, get_typed,
};

pub const EVENT_NAME_MIN_CHARS: usize = 3;
pub const EVENT_NAME_MAX_CHARS: usize = 50;
pub const MAX_CATEGORIES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event name must be at least 3 characters long")]
    NameTooShort,
    #[error("Event name must be at most 50 characters long")]
    NameTooLong,
    #[error("At least one category is required")]
    NoCategories,
    #[error("event not found")]
    NotFound,
    #[error("gave up after {attempts} conflicting writes")]
    ContentionExhausted { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EventError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EventError::NameTooShort | EventError::NameTooLong | EventError::NoCategories
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub record: EventRecord,
}

impl Event {
    pub fn to_response(&self, participant_count: Option<usize>) -> EventResponse {
        EventResponse {
            id: self.id.to_string(),
            name: self.record.name.clone(),
            categories: self.record.categories.clone(),
            created_at: self.record.created_at,
            participant_count,
        }
    }
}

/// Trim an event name and check its length in characters.
pub fn validate_event_name(name: &str) -> Result<String, EventError> {
    let name = name.trim();
    match name.chars().count() {
        n if n < EVENT_NAME_MIN_CHARS => Err(EventError::NameTooShort),
        n if n > EVENT_NAME_MAX_CHARS => Err(EventError::NameTooLong),
        _ => Ok(name.to_owned()),
    }
}

/// Split the comma-separated category input.
///
/// Labels are trimmed; blanks and repeats are dropped and at most
/// [`MAX_CATEGORIES`] are kept, in input order.
pub fn parse_categories(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unique()
        .take(MAX_CATEGORIES)
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub name: String,
    /// Comma-separated labels.
    pub categories: String,
}

#[derive(Debug, Clone)]
pub struct GetEvent {
    pub id: EventId,
}

#[derive(Debug, Clone, Copy)]
pub struct ListEvents;

#[derive(Debug, Clone)]
pub struct RenameEvent {
    pub id: EventId,
    pub name: String,
}

/// Remove an event together with its participant list.
#[derive(Debug, Clone)]
pub struct DeleteEvent {
    pub id: EventId,
}

/// Check, after a ticket was committed, that its event still exists.
///
/// A registration that read the event just before a concurrent delete can
/// still recreate the participant list afterwards. If the event is gone,
/// that orphaned list is removed and the registration reports `NotFound`.
#[derive(Debug, Clone)]
pub struct ConfirmRegistration {
    pub event_id: EventId,
}

#[derive(Clone)]
pub struct EventRegistry {
    store: Arc<dyn RecordStore>,
    max_attempts: u32,
}

impl EventRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

impl Processor<CreateEvent> for EventRegistry {
    type Output = Event;
    type Error = EventError;

    #[tracing::instrument(skip_all, err)]
    async fn process(&self, input: CreateEvent) -> Result<Event, EventError> {
        let name = validate_event_name(&input.name)?;
        let categories = parse_categories(&input.categories);
        if categories.is_empty() {
            return Err(EventError::NoCategories);
        }
        let record = EventRecord {
            name,
            categories,
            created_at: Some(commit_timestamp()),
        };

        for _ in 0..self.max_attempts {
            let id = EventId::generate();
            let key = RecordKey::event(id.clone());
            match commit_typed(&*self.store, &key, None, &record).await? {
                CommitOutcome::Committed(_) => {
                    tracing::info!(event_id = %id, name = %record.name, "event created");
                    return Ok(Event { id, record });
                }
                CommitOutcome::VersionMismatch => {
                    tracing::warn!(event_id = %id, "event id already taken, drawing another");
                }
            }
        }
        Err(EventError::ContentionExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Processor<GetEvent> for EventRegistry {
    type Output = Event;
    type Error = EventError;

    async fn process(&self, input: GetEvent) -> Result<Event, EventError> {
        let key = RecordKey::event(input.id.clone());
        let record = get_typed::<EventRecord>(&*self.store, &key)
            .await?
            .value
            .ok_or(EventError::NotFound)?;
        Ok(Event {
            id: input.id,
            record,
        })
    }
}

impl Processor<ListEvents> for EventRegistry {
    type Output = Vec<Event>;
    type Error = EventError;

    /// Newest first; events without a creation time go last.
    async fn process(&self, _: ListEvents) -> Result<Vec<Event>, EventError> {
        let entries = self.store.list(KeyFamily::Events).await?;
        let events: Vec<Event> = entries
            .into_iter()
            .filter_map(|(key, entry)| Some((key, entry.value?)))
            .map(|(key, value)| {
                let record = decode::<EventRecord>(&key, value)?;
                Ok(Event {
                    id: key.event_id,
                    record,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(events
            .into_iter()
            .sorted_by(|a, b| {
                Reverse(a.record.created_at)
                    .cmp(&Reverse(b.record.created_at))
                    .then_with(|| a.record.name.cmp(&b.record.name))
            })
            .collect())
    }
}

impl Processor<RenameEvent> for EventRegistry {
    type Output = Event;
    type Error = EventError;

    #[tracing::instrument(skip_all, err, fields(event_id = %input.id))]
    async fn process(&self, input: RenameEvent) -> Result<Event, EventError> {
        let name = validate_event_name(&input.name)?;
        let key = RecordKey::event(input.id.clone());

        for attempt in 1..=self.max_attempts {
            let current = get_typed::<EventRecord>(&*self.store, &key).await?;
            let mut record = current.value.ok_or(EventError::NotFound)?;
            record.name = name.clone();

            match commit_typed(&*self.store, &key, current.version, &record).await? {
                CommitOutcome::Committed(_) => {
                    tracing::info!(name = %record.name, "event renamed");
                    return Ok(Event {
                        id: input.id,
                        record,
                    });
                }
                CommitOutcome::VersionMismatch => {
                    tracing::debug!(attempt, "event changed concurrently, retrying rename");
                }
            }
        }
        Err(EventError::ContentionExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Processor<DeleteEvent> for EventRegistry {
    type Output = ();
    type Error = EventError;

    #[tracing::instrument(skip_all, err, fields(event_id = %input.id))]
    async fn process(&self, input: DeleteEvent) -> Result<(), EventError> {
        let event_key = RecordKey::event(input.id.clone());
        if self.store.get(&event_key).await?.value.is_none() {
            return Err(EventError::NotFound);
        }

        // Event first, so no new registration is accepted for it while the
        // participant list goes away.
        self.store.delete(&event_key).await?;
        self.store
            .delete(&RecordKey::participants(input.id))
            .await?;
        tracing::info!("event deleted");
        Ok(())
    }
}

impl Processor<ConfirmRegistration> for EventRegistry {
    type Output = ();
    type Error = EventError;

    async fn process(&self, input: ConfirmRegistration) -> Result<(), EventError> {
        let event_key = RecordKey::event(input.event_id.clone());
        if self.store.get(&event_key).await?.value.is_some() {
            return Ok(());
        }

        tracing::warn!(
            event_id = %input.event_id,
            "event deleted during registration, dropping its participants"
        );
        self.store
            .delete(&RecordKey::participants(input.event_id))
            .await?;
        Err(EventError::NotFound)
    }
}
