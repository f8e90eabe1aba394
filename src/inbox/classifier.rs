//! Routes an inbound event to insert, update or delete handling.

use super::error::InboxError;
use super::models::{InboundEvent, NotificationRecord};

/// What an inbound event asks the cache to do.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    Insert(NotificationRecord),
    Update(NotificationRecord),
    Delete { id: String, first_batch: bool },
}

impl LiveUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            LiveUpdate::Insert(_) => "insert",
            LiveUpdate::Update(_) => "update",
            LiveUpdate::Delete { .. } => "delete",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            LiveUpdate::Insert(record) | LiveUpdate::Update(record) => &record.id,
            LiveUpdate::Delete { id, .. } => id,
        }
    }
}

/// Classify an event by its flags.
///
/// Rejects events without an id and events flagged as both delete and update.
pub fn classify(event: InboundEvent) -> Result<LiveUpdate, InboxError> {
    if event.record.id.is_empty() {
        return Err(InboxError::MalformedEvent {
            id: String::new(),
            reason: "missing id",
        });
    }

    match (event.is_deleted, event.is_update) {
        (true, true) => Err(InboxError::MalformedEvent {
            id: event.record.id,
            reason: "both delete and update flags set",
        }),
        (true, false) => Ok(LiveUpdate::Delete {
            id: event.record.id,
            first_batch: event.is_first_batch,
        }),
        (false, true) => Ok(LiveUpdate::Update(event.record)),
        (false, false) => Ok(LiveUpdate::Insert(event.record)),
    }
}
