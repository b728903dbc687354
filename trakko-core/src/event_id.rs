//! Short public event identifiers.
//!
//! Eight Crockford base32 characters (40 random bits), uppercase.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;

/// Crockford base32 alphabet, as used in event links.
const ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub const EVENT_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed event id")]
pub struct InvalidEventId;

impl EventId {
    /// Draw a fresh random identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 5];
        rand::rng().fill_bytes(&mut bytes);
        EventId(fast32::base32::CROCKFORD.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EventId {
    type Err = InvalidEventId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == EVENT_ID_LEN && s.chars().all(|c| ALPHABET.contains(c)) {
            Ok(EventId(s.to_owned()))
        } else {
            Err(InvalidEventId)
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_parse_back() {
        for _ in 0..64 {
            let id = EventId::generate();
            assert_eq!(id.as_str().len(), EVENT_ID_LEN);
            assert_eq!(id.as_str().parse::<EventId>(), Ok(id));
        }
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!("".parse::<EventId>().is_err());
        assert!("ABCDEFG".parse::<EventId>().is_err());
        assert!("ABCDEFGHJ".parse::<EventId>().is_err());
        // I, L, O and U are not part of the alphabet
        assert!("ABCDEFGI".parse::<EventId>().is_err());
        assert!("abcdefgh".parse::<EventId>().is_err());
        assert!("../../ab".parse::<EventId>().is_err());
        assert!("0123ABCD".parse::<EventId>().is_ok());
    }
}
