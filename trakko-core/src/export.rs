//! CSV export of an event's participants.

use std::borrow::Cow;

use itertools::Itertools;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use trakko_sdk::objects::{Participant, timestamp};

pub const CSV_HEADER: &str = "TicketNumber,Timestamp,Name,Provenance,Category";

/// Used when the event record is gone but its participants are still there.
const FALLBACK_FILE_STEM: &str = "event";

/// Render the participant list, one row per ticket in list order.
///
/// Rows are separated by `\n` with no trailing newline. Missing names and
/// provenances are empty cells.
pub fn participants_csv(participants: &[Participant]) -> Result<String, time::error::Format> {
    let rows: Vec<String> = participants
        .iter()
        .map(|p| {
            Ok(format!(
                "{},{},{},{},{}",
                p.ticket_number,
                timestamp::format(p.timestamp)?,
                escape(p.name.as_deref().unwrap_or_default()),
                escape(p.provenance.as_deref().unwrap_or_default()),
                escape(&p.category),
            ))
        })
        .collect::<Result<Vec<_>, time::error::Format>>()?;

    Ok(std::iter::once(CSV_HEADER.to_owned()).chain(rows).join("\n"))
}

/// `{event name, whitespace as _}_export_{YYYY-MM-DD}.csv`
pub fn export_file_name(event_name: Option<&str>, date: Date) -> String {
    let stem: String = match event_name {
        Some(name) if !name.trim().is_empty() => name
            .chars()
            .filter(|c| *c != '"' && *c != '\\')
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect(),
        _ => FALLBACK_FILE_STEM.to_owned(),
    };
    let date = date
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string());
    format!("{stem}_export_{date}.csv")
}

/// Today's date in UTC, for [`export_file_name`].
pub fn export_date() -> Date {
    OffsetDateTime::now_utc().date()
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
