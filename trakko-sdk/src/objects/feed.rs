//! Live participant feed messages.
//!
//! `GET /api/events/{event_id}/watch` answers with a `text/event-stream`
//! body. Every frame is `data: <FeedMessage JSON>\n\n`.
//!
//! # Protocol
//!
//! 1. The first frame carries the participant list as it is when the
//!    stream opens (possibly empty).
//! 2. Every later frame is a complete snapshot taken after a change,
//!    never a diff. Intermediate states may be skipped.
//! 3. The stream stays open until the client goes away.

use serde::{Deserialize, Serialize};

use super::participant::Participant;

/// Server-to-client feed message, tagged on `"type"`:
///
/// ```json
/// {"type":"participants_update","participants":[ ... ],"count":3}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    ParticipantsUpdate {
        participants: Vec<Participant>,
        count: usize,
    },
}

impl FeedMessage {
    pub fn participants_update(participants: Vec<Participant>) -> Self {
        let count = participants.len();
        FeedMessage::ParticipantsUpdate {
            participants,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_snapshot_survives_the_wire() {
        let participants = vec![
            Participant {
                timestamp: datetime!(2025-01-10 08:00:00.001 UTC),
                name: Some("Lin".into()),
                provenance: Some("Bologna".into()),
                category: "A".into(),
                ticket_number: 1,
            },
            Participant {
                timestamp: datetime!(2025-01-10 08:00:05 UTC),
                name: None,
                provenance: None,
                category: "B".into(),
                ticket_number: 2,
            },
        ];
        let msg = FeedMessage::participants_update(participants.clone());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with(r#"{"type":"participants_update""#));

        let FeedMessage::ParticipantsUpdate {
            participants: back,
            count,
        } = serde_json::from_str(&json).unwrap();
        assert_eq!(count, 2);
        assert_eq!(back, participants);
    }
}
