//! Public event API client (check-in desk / attendee browser → Trakko).

use reqwest::Client;
use reqwest::header::ACCEPT;
use url::Url;

use super::{ClientError, FeedSubscription, ensure_success, parse_response};
use crate::objects::{
    CreateEventRequest, EventResponse, Participant, ParticipantPatch, RegistrationForm,
    RegistrationResponse,
};

/// Typed HTTP client for the unauthenticated Trakko endpoints.
#[derive(Debug, Clone)]
pub struct EventClient {
    http: Client,
    base_url: Url,
}

impl EventClient {
    /// Create a new `EventClient` rooted at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/events` – create an event, returns it with its new id.
    pub async fn create_event(
        &self,
        request: &CreateEventRequest,
    ) -> Result<EventResponse, ClientError> {
        let url = self.base_url.join("/api/events")?;
        let resp = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/events/{event_id}` – event details with participant count.
    pub async fn get_event(&self, event_id: &str) -> Result<EventResponse, ClientError> {
        let url = self.base_url.join(&format!("/api/events/{event_id}"))?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/events/{event_id}/participants` – the current list.
    pub async fn list_participants(&self, event_id: &str) -> Result<Vec<Participant>, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/events/{event_id}/participants"))?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `POST /event/{event_id}` – register a participant.
    ///
    /// Sent as a form with `Accept: application/json`, so the server answers
    /// with JSON instead of a redirect.
    pub async fn register(
        &self,
        event_id: &str,
        form: &RegistrationForm,
    ) -> Result<RegistrationResponse, ClientError> {
        let url = self.base_url.join(&format!("/event/{event_id}"))?;
        let resp = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `PATCH /api/events/{event_id}/tickets/{ticket_number}` – edit a ticket.
    pub async fn edit_ticket(
        &self,
        event_id: &str,
        ticket_number: u64,
        patch: &ParticipantPatch,
    ) -> Result<Participant, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/events/{event_id}/tickets/{ticket_number}"))?;
        let resp = self.http.patch(url).json(patch).send().await?;
        parse_response(resp).await
    }

    /// `GET /event/{event_id}/export` – the participant list as CSV.
    pub async fn export_csv(&self, event_id: &str) -> Result<String, ClientError> {
        let url = self.base_url.join(&format!("/event/{event_id}/export"))?;
        let resp = ensure_success(self.http.get(url).send().await?).await?;
        Ok(resp.text().await?)
    }

    /// `GET /api/events/{event_id}/watch` – open the live participant feed.
    ///
    /// `initial` is the list the caller already shows; a first frame that
    /// matches it is absorbed without producing an update.
    pub fn watch(
        &self,
        event_id: &str,
        initial: Vec<Participant>,
    ) -> Result<FeedSubscription, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/events/{event_id}/watch"))?;
        Ok(FeedSubscription::open(self.http.clone(), url, initial))
    }
}
