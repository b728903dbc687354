//! Application state shared across all request handlers.

use crate::config::runtime::SharedConfig;
use std::sync::Arc;
use tokio::sync::watch;
use trakko_core::allocator::TicketAllocator;
use trakko_core::events::EventRegistry;
use trakko_core::feed::ParticipantFeed;
use trakko_core::store::RecordStore;

/// Application state that is shared across all request handlers.
///
/// Cloning is cheap; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    /// Runtime configuration (can be reloaded via SIGHUP).
    pub config: SharedConfig,
    pub feed: ParticipantFeed,
    closing: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, config: SharedConfig) -> Self {
        Self {
            feed: ParticipantFeed::new(Arc::clone(&store)),
            store,
            config,
            closing: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Ask long-lived responses (feed streams) to finish.
    pub fn begin_shutdown(&self) {
        self.closing.send_replace(true);
    }

    /// Resolves once [`begin_shutdown`](Self::begin_shutdown) was called.
    pub fn closing(&self) -> impl Future<Output = ()> + Send + 'static + use<> {
        let mut rx = self.closing.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }

    /// An allocator using the currently configured retry budget.
    pub async fn allocator(&self) -> TicketAllocator {
        let max_attempts = self.config.allocator.read().await.max_attempts;
        TicketAllocator::new(Arc::clone(&self.store)).with_max_attempts(max_attempts)
    }

    pub async fn events(&self) -> EventRegistry {
        let max_attempts = self.config.allocator.read().await.max_attempts;
        EventRegistry::new(Arc::clone(&self.store)).with_max_attempts(max_attempts)
    }
}
