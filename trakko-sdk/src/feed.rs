//! Subscriber-side reconciliation of the participant feed.
//!
//! The server pushes complete snapshots and never decides what changed.
//! A [`FeedReconciler`] keeps the last applied snapshot together with its
//! [`Fingerprint`] and only reports an update when the count or the
//! fingerprint moved, so redundant wake-ups cost the viewer nothing.

use std::fmt;

use ring::digest;

use crate::objects::{FeedMessage, Participant};

/// SHA-256 over the ordered `(ticketNumber, name, provenance, category,
/// timestamp)` tuples of a participant list.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(participants: &[Participant]) -> Self {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(&(participants.len() as u64).to_be_bytes());
        for p in participants {
            ctx.update(&p.ticket_number.to_be_bytes());
            write_field(&mut ctx, p.name.as_deref());
            write_field(&mut ctx, p.provenance.as_deref());
            write_field(&mut ctx, Some(&p.category));
            ctx.update(&p.timestamp.unix_timestamp_nanos().to_be_bytes());
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(ctx.finish().as_ref());
        Fingerprint(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Length-prefixed so `("ab", "c")` and `("a", "bc")` never collide.
fn write_field(ctx: &mut digest::Context, value: Option<&str>) {
    match value {
        None => ctx.update(&[0]),
        Some(v) => {
            ctx.update(&[1]);
            ctx.update(&(v.len() as u64).to_be_bytes());
            ctx.update(v.as_bytes());
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Connection state of a feed subscriber, for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

/// Local view of an event's participant list.
#[derive(Debug, Clone)]
pub struct FeedReconciler {
    participants: Vec<Participant>,
    fingerprint: Fingerprint,
}

impl FeedReconciler {
    /// Start from the list the viewer already shows (e.g. server-rendered).
    pub fn new(initial: Vec<Participant>) -> Self {
        let fingerprint = Fingerprint::of(&initial);
        Self {
            participants: initial,
            fingerprint,
        }
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Apply a feed message.
    ///
    /// Returns the new list when the snapshot differs from the applied one,
    /// `None` when the message was a no-op.
    pub fn apply(&mut self, message: FeedMessage) -> Option<&[Participant]> {
        let FeedMessage::ParticipantsUpdate {
            participants,
            count,
        } = message;

        let fingerprint = Fingerprint::of(&participants);
        if count == self.count() && fingerprint == self.fingerprint {
            return None;
        }

        self.participants = participants;
        self.fingerprint = fingerprint;
        Some(&self.participants)
    }
}

impl Default for FeedReconciler {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
