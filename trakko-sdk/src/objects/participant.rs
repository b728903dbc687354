//! Participant (ticket) records and the bodies that create or edit them.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One registration within an event.
///
/// This is both the stored shape (one element of the participant list
/// kept under `participants/{eventId}`) and the wire shape, so it keeps
/// the camelCase field names browsers already consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Server-assigned commit time.
    #[serde(with = "crate::objects::timestamp")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    pub category: String,
    /// Position in the event's sequence, starting at 1.
    pub ticket_number: u64,
}

/// Registration submission body (`POST /event/{event_id}`).
///
/// Accepted as `application/x-www-form-urlencoded` or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provenance: Option<String>,
    pub category: String,
}

/// JSON answer to a registration when the caller asked for JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<Participant>,
}

/// Partial update of a ticket (`PATCH /api/events/{event_id}/tickets/{n}`).
///
/// Absent fields are left untouched. An empty `name` or `provenance`
/// clears the field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParticipantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ParticipantPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.provenance.is_none() && self.category.is_none()
    }

    /// Apply the patch in place. Ticket number and timestamp are never touched.
    pub fn apply_to(&self, participant: &mut Participant) {
        if let Some(name) = &self.name {
            participant.name = normalize_field(Some(name.clone()));
        }
        if let Some(provenance) = &self.provenance {
            participant.provenance = normalize_field(Some(provenance.clone()));
        }
        if let Some(category) = &self.category {
            participant.category = category.clone();
        }
    }
}

/// Trim an optional free-text field; blank input becomes `None`.
pub fn normalize_field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
