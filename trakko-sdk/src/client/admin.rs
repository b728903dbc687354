//! Admin API client (admin panel → Trakko).
//!
//! All requests carry the plaintext admin secret in the
//! `Trakko-Admin-Authorization` header.

use reqwest::Client;
use url::Url;

use super::{ADMIN_AUTH_HEADER, ClientError, ensure_success, parse_response};
use crate::objects::{EventResponse, RenameEventRequest};

/// Typed HTTP client for the Trakko **Admin API**.
///
/// The secret is verified server-side against an argon2-hashed value.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    admin_secret: String,
}

impl AdminClient {
    /// Create a new `AdminClient`.
    ///
    /// * `base_url` – root URL of the Trakko server.
    /// * `admin_secret` – the plaintext admin secret.
    pub fn new(base_url: Url, admin_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            admin_secret: admin_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /api/events` – every event, newest first.
    pub async fn list_events(&self) -> Result<Vec<EventResponse>, ClientError> {
        let url = self.base_url.join("/api/events")?;
        let resp = self
            .http
            .get(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `PATCH /api/events/{event_id}` – rename an event.
    pub async fn rename_event(
        &self,
        event_id: &str,
        name: impl Into<String>,
    ) -> Result<EventResponse, ClientError> {
        let url = self.base_url.join(&format!("/api/events/{event_id}"))?;
        let resp = self
            .http
            .patch(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .json(&RenameEventRequest { name: name.into() })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `DELETE /api/events/{event_id}` – delete an event and its participants.
    pub async fn delete_event(&self, event_id: &str) -> Result<(), ClientError> {
        let url = self.base_url.join(&format!("/api/events/{event_id}"))?;
        let resp = self
            .http
            .delete(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}
