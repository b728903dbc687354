//! Registration and ticket edit handlers.
//!
//! # Endpoints
//!
//! - `POST  /event/{event_id}`                                – register a participant
//! - `PATCH /api/events/{event_id}/tickets/{ticket_number}`   – edit a ticket

use axum::{
    Json,
    extract::{RawQuery, State},
    response::{IntoResponse, Redirect, Response},
};
use kanau::processor::Processor;
use trakko_core::allocator::{AllocateTicket, EditTicket, NewParticipant};
use trakko_core::event_id::EventId;
use trakko_core::events::{ConfirmRegistration, GetEvent};
use trakko_sdk::objects::{
    Participant, ParticipantPatch, RegistrationForm, RegistrationResponse, normalize_field,
};

use super::ApiError;
use super::extractors::{EventPath, Submitted, TicketPath, WantsJson};
use crate::state::AppState;

/// `POST /event/{event_id}` – allocate the next ticket.
///
/// The category must be one of the event's. Success answers 303 back to the
/// event page (query string kept) or, when JSON was asked for,
/// `200 {"success": true, "participant": {...}}`. Errors are JSON or plain
/// text following the same choice.
pub(super) async fn register(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
    RawQuery(query): RawQuery,
    WantsJson(wants_json): WantsJson,
    Submitted(form): Submitted<RegistrationForm>,
) -> Response {
    match allocate(&state, event_id.clone(), form).await {
        Ok(participant) if wants_json => Json(RegistrationResponse {
            success: true,
            participant: Some(participant),
        })
        .into_response(),
        Ok(_) => {
            let location = match query {
                Some(query) if !query.is_empty() => format!("/event/{event_id}?{query}"),
                _ => format!("/event/{event_id}"),
            };
            Redirect::to(&location).into_response()
        }
        Err(e) => e.into_response_as(wants_json),
    }
}

async fn allocate(
    state: &AppState,
    event_id: EventId,
    form: RegistrationForm,
) -> Result<Participant, ApiError> {
    let event = state
        .events()
        .await
        .process(GetEvent {
            id: event_id.clone(),
        })
        .await?;

    let category = form.category.trim();
    if !event.record.has_category(category) {
        return Err(ApiError::Validation(format!("Unknown category: {category}")));
    }

    let participant = NewParticipant {
        name: normalize_field(form.name),
        provenance: normalize_field(form.provenance),
        category: category.to_owned(),
    };
    let allocated = state
        .allocator()
        .await
        .process(AllocateTicket {
            event_id: event_id.clone(),
            participant,
        })
        .await?;

    state
        .events()
        .await
        .process(ConfirmRegistration { event_id })
        .await?;
    Ok(allocated)
}

/// `PATCH /api/events/{event_id}/tickets/{ticket_number}` – edit a ticket.
///
/// The ticket keeps its number and timestamp. A new category must belong to
/// the event. A body without any field is rejected.
pub(super) async fn edit_ticket(
    State(state): State<AppState>,
    TicketPath {
        event_id,
        ticket_number,
    }: TicketPath,
    Json(mut patch): Json<ParticipantPatch>,
) -> Result<Json<Participant>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::Validation("Nothing to update".to_owned()));
    }

    if let Some(category) = patch.category.take() {
        let category = category.trim().to_owned();
        let event = state
            .events()
            .await
            .process(GetEvent {
                id: event_id.clone(),
            })
            .await?;
        if !event.record.has_category(&category) {
            return Err(ApiError::Validation(format!("Unknown category: {category}")));
        }
        patch.category = Some(category);
    }

    let updated = state
        .allocator()
        .await
        .process(EditTicket {
            event_id,
            ticket_number,
            patch,
        })
        .await?;
    Ok(Json(updated))
}
