//! Webhook intake.
//!
//! Signature verification happens upstream. This module only turns a
//! verified body into notifications and drops the ones already seen.

pub mod log;
pub mod types;

pub use log::{InMemoryNotificationLog, IngestReport, NotificationLog, ingest};
pub use types::{EntityChangeNotification, WebhookError, parse_notifications};
