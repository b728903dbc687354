//! UTC timestamps in the `YYYY-MM-DDTHH:MM:SS.mmmZ` shape browsers produce
//! with `Date.prototype.toISOString()`.
//!
//! Use through `#[serde(with = "crate::objects::timestamp")]` (or
//! `timestamp::option`). Output always carries exactly three fractional
//! digits. Input in that shape is preferred; any other RFC 3339 string is
//! accepted as well.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const ISO_MILLIS: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// Render `value` in UTC with millisecond precision.
pub fn format(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value.to_offset(UtcOffset::UTC).format(ISO_MILLIS)
}

pub fn parse(text: &str) -> Result<OffsetDateTime, time::error::Parse> {
    match PrimitiveDateTime::parse(text, ISO_MILLIS) {
        Ok(naive) => Ok(naive.assume_utc()),
        Err(_) => OffsetDateTime::parse(text, &Rfc3339),
    }
}

pub fn serialize<S: Serializer>(
    value: &OffsetDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let text = format(*value).map_err(S::Error::custom)?;
    serializer.serialize_str(&text)
}

pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<OffsetDateTime, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse(&text).map_err(D::Error::custom)
}

pub mod option {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| parse(&text).map_err(D::Error::custom))
            .transpose()
    }
}
