//! Outbound effects toward the presentation layer and analytics.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::InboxError;
use super::models::{NotificationRecord, Position};

/// Receiver of everything the inbox wants shown, navigated to or reported.
///
/// Calls are fire-and-forget.
pub trait InboxView: Send + Sync {
    fn render_insert(&self, record: &NotificationRecord, position: Position);

    fn render_update(&self, record: &NotificationRecord, position: Position);

    fn render_delete(&self, id: &str);

    /// A count of zero means "no unread indicator".
    fn render_unread_indicator(&self, count: usize);

    fn render_empty_state(&self);

    fn render_load_more(&self, visible: bool);

    /// The first response failed; nothing could be loaded.
    fn render_load_error(&self);

    fn navigate_to(&self, target: &serde_json::Value);

    /// Open the notification settings, or the app's about page when the host
    /// has none.
    fn open_settings(&self);

    fn report_metric(&self, category: &str, action: &str, value: Option<usize>);

    fn report_error(&self, error: &InboxError, message: &str);
}

/// View that only logs.
#[derive(Debug, Default)]
pub struct TracingView;

impl InboxView for TracingView {
    fn render_insert(&self, record: &NotificationRecord, position: Position) {
        debug!("Insert {} at {:?}", record.id, position);
    }

    fn render_update(&self, record: &NotificationRecord, position: Position) {
        debug!(
            "Update {} at {:?} (read: {})",
            record.id, position, record.read_status
        );
    }

    fn render_delete(&self, id: &str) {
        debug!("Delete {}", id);
    }

    fn render_unread_indicator(&self, count: usize) {
        info!("Unread notifications: {}", count);
    }

    fn render_empty_state(&self) {
        info!("No notifications");
    }

    fn render_load_more(&self, visible: bool) {
        debug!("Load more visible: {}", visible);
    }

    fn render_load_error(&self) {
        warn!("Notifications could not be loaded");
    }

    fn navigate_to(&self, target: &serde_json::Value) {
        info!("Navigate to {}", target);
    }

    fn open_settings(&self) {
        info!("Open notification settings");
    }

    fn report_metric(&self, category: &str, action: &str, value: Option<usize>) {
        debug!("Metric {}/{} {:?}", category, action, value);
    }

    fn report_error(&self, error: &InboxError, message: &str) {
        warn!("{}: {}", message, error);
    }
}

/// One effect captured by [`RecordingView`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ViewEffect {
    Insert { id: String, position: Position },
    Update { id: String, position: Position, read: bool },
    Delete { id: String },
    UnreadIndicator { count: usize },
    EmptyState,
    LoadMore { visible: bool },
    LoadError,
    Navigate { target: serde_json::Value },
    Settings,
    Metric { category: String, action: String, value: Option<usize> },
    Error { error: String, message: String },
}

/// View that keeps every effect in order, for the replay tool and tests.
#[derive(Debug, Default)]
pub struct RecordingView {
    effects: Mutex<Vec<ViewEffect>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> Vec<ViewEffect> {
        self.lock().clone()
    }

    /// Drain the effects recorded so far.
    pub fn take(&self) -> Vec<ViewEffect> {
        std::mem::take(&mut *self.lock())
    }

    fn push(&self, effect: ViewEffect) {
        self.lock().push(effect);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ViewEffect>> {
        self.effects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl InboxView for RecordingView {
    fn render_insert(&self, record: &NotificationRecord, position: Position) {
        self.push(ViewEffect::Insert {
            id: record.id.clone(),
            position,
        });
    }

    fn render_update(&self, record: &NotificationRecord, position: Position) {
        self.push(ViewEffect::Update {
            id: record.id.clone(),
            position,
            read: record.read_status,
        });
    }

    fn render_delete(&self, id: &str) {
        self.push(ViewEffect::Delete { id: id.to_string() });
    }

    fn render_unread_indicator(&self, count: usize) {
        self.push(ViewEffect::UnreadIndicator { count });
    }

    fn render_empty_state(&self) {
        self.push(ViewEffect::EmptyState);
    }

    fn render_load_more(&self, visible: bool) {
        self.push(ViewEffect::LoadMore { visible });
    }

    fn render_load_error(&self) {
        self.push(ViewEffect::LoadError);
    }

    fn navigate_to(&self, target: &serde_json::Value) {
        self.push(ViewEffect::Navigate {
            target: target.clone(),
        });
    }

    fn open_settings(&self) {
        self.push(ViewEffect::Settings);
    }

    fn report_metric(&self, category: &str, action: &str, value: Option<usize>) {
        self.push(ViewEffect::Metric {
            category: category.to_string(),
            action: action.to_string(),
            value,
        });
    }

    fn report_error(&self, error: &InboxError, message: &str) {
        self.push(ViewEffect::Error {
            error: error.to_string(),
            message: message.to_string(),
        });
    }
}
