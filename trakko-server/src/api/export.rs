//! `GET /event/{event_id}/export` – participants as a CSV download.

use axum::{extract::State, http::header, response::IntoResponse};
use kanau::processor::Processor;
use trakko_core::allocator::load_participants;
use trakko_core::events::{EventError, GetEvent};
use trakko_core::export::{export_date, export_file_name, participants_csv};

use super::ApiError;
use super::extractors::EventPath;
use crate::state::AppState;

pub(super) async fn export_csv(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
) -> Result<impl IntoResponse, ApiError> {
    let participants = load_participants(&*state.store, &event_id)
        .await?
        .value
        .unwrap_or_default();

    let event_name = match state
        .events()
        .await
        .process(GetEvent {
            id: event_id.clone(),
        })
        .await
    {
        Ok(event) => Some(event.record.name),
        Err(EventError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let csv = participants_csv(&participants).map_err(|e| {
        tracing::error!(%event_id, error = %e, "failed to render CSV");
        ApiError::Internal
    })?;
    let file_name = export_file_name(event_name.as_deref(), export_date());
    tracing::info!(%event_id, rows = participants.len(), "participants exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        csv,
    ))
}
