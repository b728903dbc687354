//! HTTP API.
//!
//! Public routes (registration desk, attendee browsers, live feed) and the
//! admin routes guarded by [`extractors::AdminAuth`].

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use trakko_core::allocator::AllocateError;
use trakko_core::events::EventError;
use trakko_core::feed::FeedError;
use trakko_core::store::StoreError;
use trakko_sdk::objects::ErrorResponse;

use crate::state::AppState;

mod events;
mod export;
pub mod extractors;
mod feed;
mod registration;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/events",
            post(events::create_event).get(events::list_events),
        )
        .route(
            "/api/events/{event_id}",
            get(events::get_event)
                .patch(events::rename_event)
                .delete(events::delete_event),
        )
        .route(
            "/api/events/{event_id}/participants",
            get(events::list_participants),
        )
        .route(
            "/api/events/{event_id}/tickets/{ticket_number}",
            patch(registration::edit_ticket),
        )
        .route(
            "/api/events/{event_id}/watch",
            get(feed::watch_participants),
        )
        .route("/event/{event_id}", post(registration::register))
        .route("/event/{event_id}/export", get(export::export_csv))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum ApiError {
    Validation(String),
    NotFound(&'static str),
    /// Every optimistic write attempt lost a race. Nothing was written.
    Contention,
    Store(StoreError),
    Internal,
}

impl ApiError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_owned()),
            ApiError::Contention => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Too many simultaneous registrations, please try again".to_owned(),
            ),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "record store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_owned(),
            ),
        }
    }

    /// JSON `{"error": ...}` body, or plain text.
    pub(crate) fn into_response_as(self, json: bool) -> Response {
        let (status, message) = self.status_and_message();
        if json {
            (status, Json(ErrorResponse { error: message })).into_response()
        } else {
            (status, message).into_response()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_as(true)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<AllocateError> for ApiError {
    fn from(e: AllocateError) -> Self {
        match e {
            AllocateError::ListNotFound => ApiError::NotFound("Participants not found"),
            AllocateError::TicketNotFound(_) => ApiError::NotFound("Participant not found"),
            AllocateError::ContentionExhausted { .. } => ApiError::Contention,
            AllocateError::Store(e) => ApiError::Store(e),
        }
    }
}

impl From<EventError> for ApiError {
    fn from(e: EventError) -> Self {
        match e {
            e if e.is_validation() => ApiError::Validation(e.to_string()),
            EventError::NotFound => ApiError::NotFound("Event not found"),
            EventError::ContentionExhausted { .. } => ApiError::Contention,
            EventError::Store(e) => ApiError::Store(e),
            _ => ApiError::Internal,
        }
    }
}

impl From<FeedError> for ApiError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Store(e) => ApiError::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::runtime::{AdminConfig, AllocatorConfig, ServerConfig, SharedConfig};
    use crate::server::build_router;
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;
    use tower::ServiceExt;
    use trakko_core::store::MemoryStore;
    use trakko_sdk::objects::{FeedMessage, Participant};
    use trakko_sdk::sse::SseDecoder;
    use trakko_sdk::{ADMIN_AUTH_HEADER, ADMIN_COOKIE};

    const ADMIN_SECRET: &str = "let-me-in";

    fn test_state() -> AppState {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(ADMIN_SECRET.as_bytes(), &salt)
            .unwrap()
            .to_string();
        let config = SharedConfig {
            server: Arc::new(RwLock::new(ServerConfig {
                listen: "127.0.0.1:0".parse().unwrap(),
            })),
            admin: Arc::new(RwLock::new(AdminConfig::new(hash))),
            allocator: Arc::new(RwLock::new(AllocatorConfig { max_attempts: 10 })),
        };
        AppState::new(Arc::new(MemoryStore::new()), config)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_request(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn create_event(app: &Router) -> String {
        let response = send(
            app,
            json_request(
                "POST",
                "/api/events",
                json!({"name": "Harvest Fair", "categories": "Adults, Kids"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_owned()
    }

    async fn register_json(app: &Router, id: &str, name: &str) -> Participant {
        let response = send(
            app,
            json_request(
                "POST",
                &format!("/event/{id}"),
                json!({"name": name, "category": "Adults"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        serde_json::from_value(body["participant"].clone()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let response = send(&app, get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_event_from_form_redirects() {
        let app = build_router(test_state());
        let response = send(
            &app,
            form_request("/api/events", "name=Book+Swap&categories=Fiction%2CPoetry"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/event/"));
        assert!(location.ends_with("/created"));
    }

    #[tokio::test]
    async fn test_create_event_rejects_short_name() {
        let app = build_router(test_state());
        let response = send(
            &app,
            json_request("POST", "/api/events", json!({"name": "ab", "categories": "A"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Event name must be at least 3 characters long"
        );
    }

    #[tokio::test]
    async fn test_form_registration_redirects_with_query() {
        let app = build_router(test_state());
        let id = create_event(&app).await;

        let response = send(
            &app,
            form_request(&format!("/event/{id}?lang=it"), "name=Ada&category=Kids"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("/event/{id}?lang=it").as_str()
        );

        let response = send(&app, get(&format!("/api/events/{id}/participants"))).await;
        let list: Vec<Participant> = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name.as_deref(), Some("Ada"));
        assert_eq!(list[0].category, "Kids");
        assert_eq!(list[0].provenance, None);
    }

    #[tokio::test]
    async fn test_json_registration_numbers_tickets() {
        let app = build_router(test_state());
        let id = create_event(&app).await;
        assert_eq!(register_json(&app, &id, "one").await.ticket_number, 1);
        assert_eq!(register_json(&app, &id, "two").await.ticket_number, 2);

        let response = send(&app, get(&format!("/api/events/{id}"))).await;
        assert_eq!(body_json(response).await["participantCount"], 2);
    }

    #[tokio::test]
    async fn test_registration_rejects_unknown_category() {
        let app = build_router(test_state());
        let id = create_event(&app).await;

        let response = send(
            &app,
            form_request(&format!("/event/{id}"), "name=Eve&category=Pets"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Unknown category: Pets");

        let response = send(
            &app,
            json_request(
                "POST",
                &format!("/event/{id}"),
                json!({"category": "Pets"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Unknown category: Pets");
    }

    #[tokio::test]
    async fn test_registration_for_missing_event_is_not_found() {
        let app = build_router(test_state());
        let response = send(&app, form_request("/event/ZZZZZZZZ", "category=Adults")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, form_request("/event/not-an-id", "category=Adults")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_get_distinct_tickets() {
        let app = build_router(test_state());
        let id = create_event(&app).await;

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let app = app.clone();
                let id = id.clone();
                tokio::spawn(async move { register_json(&app, &id, &format!("p{i}")).await })
            })
            .collect();

        let mut numbers = BTreeSet::new();
        for handle in handles {
            numbers.insert(handle.await.unwrap().ticket_number);
        }
        assert_eq!(numbers, (1..=10).collect());
    }

    #[tokio::test]
    async fn test_edit_ticket() {
        let app = build_router(test_state());
        let id = create_event(&app).await;
        let original = register_json(&app, &id, "Bob").await;
        register_json(&app, &id, "Cy").await;

        let response = send(
            &app,
            json_request(
                "PATCH",
                &format!("/api/events/{id}/tickets/1"),
                json!({"name": "Robert", "category": "Kids"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated: Participant = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(updated.name.as_deref(), Some("Robert"));
        assert_eq!(updated.category, "Kids");
        assert_eq!(updated.ticket_number, 1);
        assert_eq!(updated.timestamp, original.timestamp);
    }

    #[tokio::test]
    async fn test_edit_ticket_errors() {
        let app = build_router(test_state());
        let id = create_event(&app).await;

        let response = send(
            &app,
            json_request("PATCH", &format!("/api/events/{id}/tickets/1"), json!({"name": "x"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Participants not found");

        register_json(&app, &id, "only").await;

        let response = send(
            &app,
            json_request("PATCH", &format!("/api/events/{id}/tickets/7"), json!({"name": "x"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Participant not found");

        let response = send(
            &app,
            json_request("PATCH", &format!("/api/events/{id}/tickets/abc"), json!({"name": "x"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Invalid ticket number");

        let response = send(
            &app,
            json_request(
                "PATCH",
                &format!("/api/events/{id}/tickets/1"),
                json!({"category": "Nope"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            json_request("PATCH", &format!("/api/events/{id}/tickets/1"), json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Nothing to update");
    }

    #[tokio::test]
    async fn test_admin_routes_require_secret() {
        let app = build_router(test_state());
        let id = create_event(&app).await;

        let response = send(&app, get("/api/events")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &app,
            Request::builder()
                .uri("/api/events")
                .header(ADMIN_AUTH_HEADER, "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &app,
            Request::builder()
                .uri("/api/events")
                .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let events = body_json(response).await;
        assert_eq!(events[0]["id"], id.as_str());
        assert_eq!(events[0]["participantCount"], 0);

        let response = send(
            &app,
            Request::builder()
                .uri("/api/events")
                .header(header::COOKIE, format!("{ADMIN_COOKIE}={ADMIN_SECRET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rename_and_delete_event() {
        let app = build_router(test_state());
        let id = create_event(&app).await;
        register_json(&app, &id, "guest").await;

        let rename = Request::builder()
            .method("PATCH")
            .uri(format!("/api/events/{id}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
            .body(Body::from(json!({"name": "Autumn Fair"}).to_string()))
            .unwrap();
        let response = send(&app, rename).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "Autumn Fair");

        let response = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/events/{id}"))
                .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, get(&format!("/api/events/{id}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&app, get(&format!("/api/events/{id}/participants"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_csv() {
        let app = build_router(test_state());
        let id = create_event(&app).await;
        register_json(&app, &id, "Ada").await;

        let response = send(&app, get(&format!("/event/{id}/export"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/csv")
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_owned();
        assert!(disposition.starts_with("attachment; filename=\"Harvest_Fair_export_"));

        let csv = body_text(response).await;
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("TicketNumber,Timestamp,Name,Provenance,Category"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,"));
        assert!(row.ends_with(",Ada,,Adults"));
    }

    async fn next_feed_message(body: &mut Body, decoder: &mut SseDecoder) -> FeedMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
                .await
                .expect("feed stalled")
                .expect("feed ended")
                .unwrap();
            let Ok(data) = frame.into_data() else {
                continue;
            };
            if let Some(frame) = decoder.push(&data).into_iter().next() {
                return serde_json::from_str(&frame.data).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_watch_sends_current_state_then_updates() {
        let app = build_router(test_state());
        let id = create_event(&app).await;
        for name in ["a", "b", "c"] {
            register_json(&app, &id, name).await;
        }

        let response = send(&app, get(&format!("/api/events/{id}/watch"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(
            headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let mut body = response.into_body();
        let mut decoder = SseDecoder::new();
        let FeedMessage::ParticipantsUpdate { count, .. } =
            next_feed_message(&mut body, &mut decoder).await;
        assert_eq!(count, 3);

        register_json(&app, &id, "d").await;
        let FeedMessage::ParticipantsUpdate {
            participants,
            count,
        } = next_feed_message(&mut body, &mut decoder).await;
        assert_eq!(count, 4);
        assert_eq!(participants[3].name.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_watch_ends_on_shutdown() {
        let state = test_state();
        let app = build_router(state.clone());
        let id = create_event(&app).await;

        let response = send(&app, get(&format!("/api/events/{id}/watch"))).await;
        let mut body = response.into_body();
        let mut decoder = SseDecoder::new();
        next_feed_message(&mut body, &mut decoder).await;

        state.begin_shutdown();
        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            while body.frame().await.is_some() {}
        })
        .await;
        assert!(ended.is_ok());
        drop(body);
        assert_eq!(state.feed.active_subscribers(), 0);
    }
}
