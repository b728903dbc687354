//! `GET /api/events/{event_id}/watch` – live participant feed.
//!
//! A `text/event-stream` of full participant snapshots. The first frame is
//! the current list; each later frame follows a change. A well-formed id
//! with no participants (or no event) streams an empty list until someone
//! registers.

use axum::{
    extract::State,
    http::header,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;

use super::ApiError;
use super::extractors::EventPath;
use crate::state::AppState;

pub(super) async fn watch_participants(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
) -> Result<impl IntoResponse, ApiError> {
    let snapshots = state.feed.subscribe(event_id.clone()).await?;
    tracing::info!(%event_id, subscribers = state.feed.active_subscribers(), "feed opened");

    let frames = snapshots
        .map(|snapshot| Event::default().json_data(snapshot.into_message()))
        .take_until(state.closing());

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Cache-Control"),
        ],
        Sse::new(frames).keep_alive(KeepAlive::default()),
    ))
}
