//! Event records and the admin/creation bodies around them.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Stored event record (`events/{eventId}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub name: String,
    pub categories: Vec<String>,
    #[serde(
        default,
        with = "crate::objects::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

impl EventRecord {
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

/// An event as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub name: String,
    pub categories: Vec<String>,
    #[serde(
        default,
        with = "crate::objects::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    /// Number of registered participants, when the endpoint includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_count: Option<usize>,
}

/// `POST /api/events` body.
///
/// `categories` is the comma-separated list typed into the creation form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    #[serde(default)]
    pub categories: String,
}

/// `PATCH /api/events/{event_id}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEventRequest {
    pub name: String,
}
