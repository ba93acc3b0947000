//! Server-to-client notifications
//!
//! One-way events (list changes, resource updates, progress, log messages) are
//! delivered independently of the request/response cycle.

pub mod notifier;

pub use notifier::{ClientSession, DeliveryHandler, NotificationMessage, Notifier, NotifierConfig};
