//! Webhook delivery.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::config::WebhookConfig;
use super::signature::{sign, SIGNATURE_HEADER};
use super::types::{WebhookPayload, WebhookTarget};
use crate::metrics::WEBHOOK_DELIVERIES;

/// Sends webhook notifications.
///
/// Implementations must return immediately; delivery happens in the
/// background and its failures are never reported to the caller.
pub trait WebhookDispatcher: Send + Sync {
    fn dispatch(&self, target: WebhookTarget, payload: WebhookPayload);
}

/// Delivers webhooks with `reqwest` on detached tokio tasks.
pub struct HttpWebhookDispatcher {
    client: reqwest::Client,
}

impl HttpWebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn deliver(client: reqwest::Client, target: WebhookTarget, payload: WebhookPayload) {
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(job_id = %payload.job_id, error = %e, "Failed to serialize webhook payload");
                WEBHOOK_DELIVERIES.with_label_values(&["error"]).inc();
                return;
            }
        };

        let mut request = client
            .post(&target.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        match target.secret.as_deref() {
            Some(secret) => match sign(&body, secret, Utc::now().timestamp()) {
                Ok(signature) => request = request.header(SIGNATURE_HEADER, signature),
                Err(e) => warn!(job_id = %payload.job_id, error = %e, "Failed to sign webhook"),
            },
            None => warn!(
                job_id = %payload.job_id,
                url = %target.url,
                "No webhook secret configured, sending unsigned"
            ),
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    job_id = %payload.job_id,
                    event = payload.event.as_str(),
                    status = response.status().as_u16(),
                    "Webhook delivered"
                );
                WEBHOOK_DELIVERIES.with_label_values(&["delivered"]).inc();
            }
            Ok(response) => {
                warn!(
                    job_id = %payload.job_id,
                    url = %target.url,
                    status = response.status().as_u16(),
                    "Webhook rejected by receiver"
                );
                WEBHOOK_DELIVERIES.with_label_values(&["rejected"]).inc();
            }
            Err(e) => {
                warn!(job_id = %payload.job_id, url = %target.url, error = %e, "Webhook delivery failed");
                WEBHOOK_DELIVERIES.with_label_values(&["error"]).inc();
            }
        }
    }
}

impl WebhookDispatcher for HttpWebhookDispatcher {
    fn dispatch(&self, target: WebhookTarget, payload: WebhookPayload) {
        let client = self.client.clone();
        tokio::spawn(Self::deliver(client, target, payload));
    }
}
