//! Signed webhook notifications for terminal job events.
//!
//! Delivery is fire-and-forget: a dispatch never blocks or fails the job
//! transition that triggered it, and delivery errors are only logged.

mod config;
mod dispatcher;
mod signature;
mod types;

pub use config::WebhookConfig;
pub use dispatcher::{HttpWebhookDispatcher, WebhookDispatcher};
pub use signature::{sign, verify, verify_now, SIGNATURE_HEADER};
pub use types::{WebhookError, WebhookEvent, WebhookPayload, WebhookTarget};
