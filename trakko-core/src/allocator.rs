//! Ticket allocation.
//!
//! Every mutation of a participant list goes through the same optimistic
//! loop: read the list with its version, compute the replacement, and
//! commit it conditionally on that version. A lost race discards the
//! computed list and starts over from a fresh read; after
//! `max_attempts` lost races the caller gets
//! [`AllocateError::ContentionExhausted`].
//!
//! Appending always produces `old list + one record numbered
//! old length + 1`, so ticket numbers stay exactly `1..=N`.

use std::sync::Arc;

use kanau::processor::Processor;
use time::OffsetDateTime;
use trakko_sdk::objects::{Participant, ParticipantPatch};

use crate::event_id::EventId;
use crate::store::{
    CommitOutcome, Entry, RecordKey, RecordStore, StoreError, commit_typed, get_typed,
};

/// Attempts before an allocation reports contention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum AllocateError {
    #[error("participant list not found")]
    ListNotFound,
    #[error("ticket {0} not found")]
    TicketNotFound(u64),
    #[error("gave up after {attempts} conflicting writes")]
    ContentionExhausted { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocateError {
    /// Whether retrying the whole request may succeed.
    ///
    /// Nothing is committed on failure, so a retry never duplicates a ticket.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllocateError::ContentionExhausted { .. } | AllocateError::Store(_)
        )
    }
}

/// Fields of a registration, before a ticket number is assigned.
///
/// The category must already be checked against the event's categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    pub name: Option<String>,
    pub provenance: Option<String>,
    pub category: String,
}

/// Append one participant to an event's list.
#[derive(Debug, Clone)]
pub struct AllocateTicket {
    pub event_id: EventId,
    pub participant: NewParticipant,
}

/// Edit an existing ticket in place.
#[derive(Debug, Clone)]
pub struct EditTicket {
    pub event_id: EventId,
    pub ticket_number: u64,
    pub patch: ParticipantPatch,
}

#[derive(Clone)]
pub struct TicketAllocator {
    store: Arc<dyn RecordStore>,
    max_attempts: u32,
}

impl TicketAllocator {
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

    /// Read, transform, conditionally write; repeat on version mismatch.
    async fn commit_loop<T, F>(&self, key: &RecordKey, mut step: F) -> Result<T, AllocateError>
    where
        T: Send,
        F: FnMut(Option<Vec<Participant>>) -> Result<(Vec<Participant>, T), AllocateError> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let current = get_typed::<Vec<Participant>>(&*self.store, key).await?;
            let (next, output) = step(current.value)?;

            match commit_typed(&*self.store, key, current.version, &next).await? {
                CommitOutcome::Committed(version) => {
                    tracing::debug!(
                        %key,
                        attempt,
                        version = version.get(),
                        "participant list committed"
                    );
                    return Ok(output);
                }
                CommitOutcome::VersionMismatch => {
                    tracing::debug!(
                        %key,
                        attempt,
                        "participant list changed concurrently, retrying"
                    );
                }
            }
        }

        tracing::warn!(%key, attempts = self.max_attempts, "participant list contention exhausted");
        Err(AllocateError::ContentionExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Processor<AllocateTicket> for TicketAllocator {
    type Output = Participant;
    type Error = AllocateError;

    #[tracing::instrument(skip_all, err, fields(event_id = %input.event_id))]
    async fn process(&self, input: AllocateTicket) -> Result<Participant, AllocateError> {
        let key = RecordKey::participants(input.event_id);
        let participant = input.participant;

        let allocated = self
            .commit_loop(&key, |current| {
                Ok(append(current.unwrap_or_default(), &participant, commit_timestamp()))
            })
            .await?;

        tracing::info!(%key, ticket = allocated.ticket_number, "ticket allocated");
        Ok(allocated)
    }
}

impl Processor<EditTicket> for TicketAllocator {
    type Output = Participant;
    type Error = AllocateError;

    #[tracing::instrument(
        skip_all,
        err,
        fields(event_id = %input.event_id, ticket = input.ticket_number)
    )]
    async fn process(&self, input: EditTicket) -> Result<Participant, AllocateError> {
        let key = RecordKey::participants(input.event_id);
        let ticket_number = input.ticket_number;
        let patch = input.patch;

        self.commit_loop(&key, |current| edit(current, ticket_number, &patch))
            .await
    }
}

/// Read an event's participant list; an absent list reads as empty.
pub async fn load_participants(
    store: &dyn RecordStore,
    event_id: &EventId,
) -> Result<Entry<Vec<Participant>>, StoreError> {
    let key = RecordKey::participants(event_id.clone());
    let entry = get_typed::<Vec<Participant>>(store, &key).await?;
    Ok(Entry {
        value: Some(entry.value.unwrap_or_default()),
        version: entry.version,
    })
}

fn append(
    mut list: Vec<Participant>,
    new: &NewParticipant,
    now: OffsetDateTime,
) -> (Vec<Participant>, Participant) {
    let participant = Participant {
        timestamp: now,
        name: new.name.clone(),
        provenance: new.provenance.clone(),
        category: new.category.clone(),
        ticket_number: list.len() as u64 + 1,
    };
    list.push(participant.clone());
    (list, participant)
}

fn edit(
    list: Option<Vec<Participant>>,
    ticket_number: u64,
    patch: &ParticipantPatch,
) -> Result<(Vec<Participant>, Participant), AllocateError> {
    let mut list = list.ok_or(AllocateError::ListNotFound)?;
    let target = list
        .iter_mut()
        .find(|p| p.ticket_number == ticket_number)
        .ok_or(AllocateError::TicketNotFound(ticket_number))?;
    patch.apply_to(target);
    let updated = target.clone();
    Ok((list, updated))
}

/// Current UTC time truncated to milliseconds.
pub(crate) fn commit_timestamp() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_millisecond(now.millisecond()).unwrap_or(now)
}
