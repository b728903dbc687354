//! Live participant feed subscription.
//!
//! A background task reads the `text/event-stream` body, decodes frames,
//! runs them through a [`FeedReconciler`] and forwards genuine changes.
//! There is no automatic reconnect: once the state turns
//! [`ConnectionState::Disconnected`] the caller decides what to do.

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::feed::{ConnectionState, FeedReconciler};
use crate::objects::{FeedMessage, Participant};
use crate::sse::SseDecoder;

const UPDATE_BUFFER: usize = 16;

/// An open feed connection.
///
/// Dropping the subscription (or calling [`close`](Self::close)) aborts
/// the reader task and releases the HTTP connection.
pub struct FeedSubscription {
    state_rx: watch::Receiver<ConnectionState>,
    updates_rx: mpsc::Receiver<Vec<Participant>>,
    task: JoinHandle<()>,
}

impl FeedSubscription {
    pub(super) fn open(http: Client, url: Url, initial: Vec<Participant>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let reconciler = FeedReconciler::new(initial);

        let task = tokio::spawn(run_feed(http, url, reconciler, state_tx, updates_tx));

        Self {
            state_rx,
            updates_rx,
            task,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A receiver that follows connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait for the next genuine change of the participant list.
    ///
    /// Returns `None` once the connection is gone and every buffered update
    /// has been consumed.
    pub async fn next_update(&mut self) -> Option<Vec<Participant>> {
        self.updates_rx.recv().await
    }

    /// Close the connection.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_feed(
    http: Client,
    url: Url,
    mut reconciler: FeedReconciler,
    state_tx: watch::Sender<ConnectionState>,
    updates_tx: mpsc::Sender<Vec<Participant>>,
) {
    let resp = match http
        .get(url.clone())
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            tracing::warn!(%url, status = %resp.status(), "feed rejected by server");
            state_tx.send_replace(ConnectionState::Disconnected);
            return;
        }
        Err(e) => {
            tracing::warn!(%url, error = %e, "feed connection failed");
            state_tx.send_replace(ConnectionState::Disconnected);
            return;
        }
    };

    state_tx.send_replace(ConnectionState::Connected);
    tracing::debug!(%url, "feed connected");

    let mut decoder = SseDecoder::new();
    let mut body = resp.bytes_stream();

    'read: while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(%url, error = %e, "feed transport error");
                break;
            }
        };

        for frame in decoder.push(&chunk) {
            let message: FeedMessage = match serde_json::from_str(&frame.data) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed feed frame");
                    continue;
                }
            };
            if let Some(list) = reconciler.apply(message) {
                tracing::debug!(count = list.len(), "participant list changed");
                if updates_tx.send(list.to_vec()).await.is_err() {
                    break 'read;
                }
            }
        }
    }

    state_tx.send_replace(ConnectionState::Disconnected);
    tracing::debug!(%url, "feed disconnected");
}
