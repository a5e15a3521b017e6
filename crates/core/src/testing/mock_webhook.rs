//! Recording webhook dispatcher for testing.

use std::sync::{Arc, Mutex, PoisonError};

use crate::webhook::{WebhookDispatcher, WebhookEvent, WebhookPayload, WebhookTarget};

/// A dispatched webhook for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedWebhook {
    pub target: WebhookTarget,
    pub payload: WebhookPayload,
}

/// WebhookDispatcher that records deliveries instead of sending them.
///
/// # Example
///
/// ```rust,ignore
/// use gateway_core::testing::RecordingWebhookDispatcher;
///
/// let webhooks = Arc::new(RecordingWebhookDispatcher::new());
///
/// // ... run a job with a webhook_url ...
///
/// assert_eq!(webhooks.events(), vec![WebhookEvent::JobCompleted]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingWebhookDispatcher {
    deliveries: Arc<Mutex<Vec<RecordedWebhook>>>,
}

impl RecordingWebhookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded deliveries, oldest first.
    pub fn deliveries(&self) -> Vec<RecordedWebhook> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded event names, oldest first.
    pub fn events(&self) -> Vec<WebhookEvent> {
        self.deliveries()
            .into_iter()
            .map(|d| d.payload.event)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl WebhookDispatcher for RecordingWebhookDispatcher {
    fn dispatch(&self, target: WebhookTarget, payload: WebhookPayload) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedWebhook { target, payload });
    }
}
