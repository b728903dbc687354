//! Custom Axum extractors.
//!
//! Provides:
//! - `AdminAuth` – checks the admin secret from the `Trakko-Admin-Authorization`
//!   header or the `trakko_admin` cookie against the configured argon2 hash.
//! - `WantsJson` – whether the caller asked for a JSON answer instead of a
//!   redirect or plain text.
//! - `Submitted<T>` – a body accepted either as JSON or as an urlencoded form.
//! - `EventPath` / `TicketPath` – validated path segments.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    Form, Json,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use trakko_core::event_id::EventId;
use trakko_sdk::{ADMIN_AUTH_HEADER, ADMIN_COOKIE};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// AdminAuth
// ---------------------------------------------------------------------------

/// Proof that the request carries the admin secret.
pub struct AdminAuth;

#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
    #[error("missing admin credentials")]
    Missing,
    #[error("invalid admin credentials")]
    Invalid,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = admin_credential(&parts.headers).ok_or(AdminAuthError::Missing)?;

        let admin = state.config.admin.read().await;
        if admin.verify_secret(&secret) {
            Ok(AdminAuth)
        } else {
            drop(admin);
            tracing::warn!("rejected admin request with wrong secret");
            Err(AdminAuthError::Invalid)
        }
    }
}

fn admin_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(ADMIN_AUTH_HEADER) {
        return value.to_str().ok().map(str::to_owned);
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ADMIN_COOKIE)
        .map(|(_, value)| value.to_owned())
}

// ---------------------------------------------------------------------------
// WantsJson
// ---------------------------------------------------------------------------

/// `true` when the request sent `Accept: application/json` or
/// `X-Requested-With: XMLHttpRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WantsJson(pub bool);

impl<S: Send + Sync> FromRequestParts<S> for WantsJson {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        Ok(WantsJson(wants_json(&parts.headers)))
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    let accepts_json = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("application/json"));
    let xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    accepts_json || xhr
}

// ---------------------------------------------------------------------------
// Submitted<T>
// ---------------------------------------------------------------------------

/// A request body that is JSON when `Content-Type` says so, and an
/// urlencoded form otherwise.
pub struct Submitted<T>(pub T);

impl<T, S> FromRequest<S> for Submitted<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Submitted(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Submitted(value))
        }
    }
}

// ---------------------------------------------------------------------------
// Path segments
// ---------------------------------------------------------------------------

/// `{event_id}` path segment. A malformed id cannot name an event, so it
/// answers 404.
pub struct EventPath(pub EventId);

#[derive(Debug)]
pub struct EventNotFound;

impl IntoResponse for EventNotFound {
    fn into_response(self) -> Response {
        (StatusCode::NOT_FOUND, "Event not found").into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for EventPath {
    type Rejection = EventNotFound;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|_| EventNotFound)?;
        params
            .get("event_id")
            .and_then(|raw| raw.parse().ok())
            .map(EventPath)
            .ok_or(EventNotFound)
    }
}

/// `{event_id}/tickets/{ticket_number}` path segments.
pub struct TicketPath {
    pub event_id: EventId,
    pub ticket_number: u64,
}

#[derive(Debug)]
pub enum TicketPathError {
    EventNotFound,
    InvalidTicketNumber,
}

impl IntoResponse for TicketPathError {
    fn into_response(self) -> Response {
        match self {
            TicketPathError::EventNotFound => EventNotFound.into_response(),
            TicketPathError::InvalidTicketNumber => {
                (StatusCode::BAD_REQUEST, "Invalid ticket number").into_response()
            }
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for TicketPath {
    type Rejection = TicketPathError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|_| TicketPathError::EventNotFound)?;
        let event_id = params
            .get("event_id")
            .and_then(|raw| raw.parse().ok())
            .ok_or(TicketPathError::EventNotFound)?;
        let ticket_number = params
            .get("ticket_number")
            .and_then(|raw| raw.parse().ok())
            .ok_or(TicketPathError::InvalidTicketNumber)?;
        Ok(TicketPath {
            event_id,
            ticket_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn test_admin_credential_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(admin_credential(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; trakko_admin=s3cret; lang=it"),
        );
        assert_eq!(admin_credential(&headers).as_deref(), Some("s3cret"));

        headers.insert(
            HeaderName::from_bytes(ADMIN_AUTH_HEADER.as_bytes()).unwrap(),
            HeaderValue::from_static("from-header"),
        );
        assert_eq!(admin_credential(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_wants_json_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!wants_json(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain"),
        );
        assert!(wants_json(&headers));

        let mut headers = HeaderMap::new();
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert!(wants_json(&headers));
    }
}
