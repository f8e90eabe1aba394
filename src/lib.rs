//! Notification Inbox Library
//!
//! Reconciles the first page, the live stream and "load older" pages of a
//! user's notifications into one ordered, duplicate-free inbox, and keeps the
//! unread indicator in line with the backend.

pub mod config;
pub mod inbox;
pub mod metrics;
pub mod replay;

// Re-export commonly used types for convenience
pub use config::{AppConfig, InboxSettings};
pub use inbox::{
    InboxError, InboxEvent, InboxView, NotificationRecord, NotificationsBackend,
    ReconciliationEngine, UserAction,
};
