pub mod event;
pub mod feed;
pub mod participant;
pub mod timestamp;

pub use event::{CreateEventRequest, EventRecord, EventResponse, RenameEventRequest};
pub use feed::FeedMessage;
pub use participant::{
    Participant, ParticipantPatch, RegistrationForm, RegistrationResponse, normalize_field,
};

/// Error body returned by JSON endpoints.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
