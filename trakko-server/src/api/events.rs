//! Event handlers.
//!
//! # Endpoints
//!
//! - `POST   /api/events`                         – create an event
//! - `GET    /api/events`                         – list events (admin)
//! - `GET    /api/events/{event_id}`              – event with participant count
//! - `PATCH  /api/events/{event_id}`              – rename (admin)
//! - `DELETE /api/events/{event_id}`              – delete with participants (admin)
//! - `GET    /api/events/{event_id}/participants` – current participant list

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use kanau::processor::Processor;
use trakko_core::allocator::load_participants;
use trakko_core::event_id::EventId;
use trakko_core::events::{CreateEvent, DeleteEvent, GetEvent, ListEvents, RenameEvent};
use trakko_core::store::{RecordStore, StoreError};
use trakko_sdk::objects::{CreateEventRequest, EventResponse, Participant, RenameEventRequest};

use super::ApiError;
use super::extractors::{AdminAuth, EventPath, Submitted, WantsJson};
use crate::state::AppState;

async fn participant_count(store: &dyn RecordStore, id: &EventId) -> Result<usize, StoreError> {
    Ok(load_participants(store, id)
        .await?
        .value
        .map_or(0, |list| list.len()))
}

/// `POST /api/events` – create an event from the admin form or JSON.
///
/// Browsers get a 303 to the event's "created" page; JSON callers get
/// 201 with the new event.
pub(super) async fn create_event(
    State(state): State<AppState>,
    WantsJson(wants_json): WantsJson,
    Submitted(request): Submitted<CreateEventRequest>,
) -> Result<Response, ApiError> {
    let event = state
        .events()
        .await
        .process(CreateEvent {
            name: request.name,
            categories: request.categories,
        })
        .await?;

    if wants_json {
        Ok((StatusCode::CREATED, Json(event.to_response(Some(0)))).into_response())
    } else {
        Ok(Redirect::to(&format!("/event/{}/created", event.id)).into_response())
    }
}

/// `GET /api/events` – every event, newest first, with participant counts.
pub(super) async fn list_events(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<Json<Vec<EventResponse>>, ApiError> {
    let events = state.events().await.process(ListEvents).await?;

    let mut responses = Vec::with_capacity(events.len());
    for event in &events {
        let count = participant_count(&*state.store, &event.id).await?;
        responses.push(event.to_response(Some(count)));
    }
    Ok(Json(responses))
}

/// `GET /api/events/{event_id}`
pub(super) async fn get_event(
    State(state): State<AppState>,
    EventPath(id): EventPath,
) -> Result<Json<EventResponse>, ApiError> {
    let event = state.events().await.process(GetEvent { id }).await?;
    let count = participant_count(&*state.store, &event.id).await?;
    Ok(Json(event.to_response(Some(count))))
}

/// `PATCH /api/events/{event_id}` – rename; categories stay as they are.
pub(super) async fn rename_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    EventPath(id): EventPath,
    Json(request): Json<RenameEventRequest>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = state
        .events()
        .await
        .process(RenameEvent {
            id,
            name: request.name,
        })
        .await?;
    Ok(Json(event.to_response(None)))
}

/// `DELETE /api/events/{event_id}` – remove the event and its participants.
///
/// Open feeds for the event receive one final empty snapshot.
pub(super) async fn delete_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    EventPath(id): EventPath,
) -> Result<StatusCode, ApiError> {
    state.events().await.process(DeleteEvent { id }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/events/{event_id}/participants`
pub(super) async fn list_participants(
    State(state): State<AppState>,
    EventPath(id): EventPath,
) -> Result<Json<Vec<Participant>>, ApiError> {
    let event = state.events().await.process(GetEvent { id }).await?;
    let participants = load_participants(&*state.store, &event.id)
        .await?
        .value
        .unwrap_or_default();
    Ok(Json(participants))
}
