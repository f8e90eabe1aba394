//! Notification inbox data models

use serde::{Deserialize, Serialize};

/// A notification as held by the inbox.
///
/// Timestamps are epoch milliseconds. `created_at` never changes and is the
/// pagination boundary; `order_at` is the display order and may be bumped by
/// the backend when the notification is updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub order_at: i64,
    #[serde(default)]
    pub read_status: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl NotificationRecord {
    pub fn new(id: impl Into<String>, created_at: i64, order_at: i64) -> Self {
        Self {
            id: id.into(),
            created_at,
            order_at,
            read_status: false,
            data: serde_json::Value::Null,
            deleted_at: None,
        }
    }

    pub fn is_unread(&self) -> bool {
        !self.read_status
    }

    /// Tombstones are delivered in the first response and never shown.
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Navigation payload carried under `data.navigate`, if any.
    pub fn navigate_target(&self) -> Option<&serde_json::Value> {
        self.data.get("navigate").filter(|target| !target.is_null())
    }
}

/// A notification pushed by the stream or returned by a poll, with the flags
/// telling how it relates to what is already cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(flatten)]
    pub record: NotificationRecord,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_update: bool,
    /// Set on deletes of records that belonged to the very first batch.
    #[serde(default)]
    pub is_first_batch: bool,
}

impl InboundEvent {
    pub fn insert(record: NotificationRecord) -> Self {
        Self {
            record,
            is_deleted: false,
            is_update: false,
            is_first_batch: false,
        }
    }

    pub fn update(record: NotificationRecord) -> Self {
        Self {
            is_update: true,
            ..Self::insert(record)
        }
    }

    pub fn delete(record: NotificationRecord) -> Self {
        Self {
            is_deleted: true,
            ..Self::insert(record)
        }
    }

    pub fn first_batch_delete(record: NotificationRecord) -> Self {
        Self {
            is_first_batch: true,
            ..Self::delete(record)
        }
    }
}

impl From<NotificationRecord> for InboundEvent {
    fn from(record: NotificationRecord) -> Self {
        Self::insert(record)
    }
}

/// Where a merged record landed in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// The record is the only one cached.
    Only,
    Start,
    End,
    /// Somewhere in between; the record sits at this index.
    Middle(usize),
}

impl Position {
    pub(crate) fn resolve(index: usize, len: usize) -> Self {
        if len == 1 {
            Position::Only
        } else if index == 0 {
            Position::Start
        } else if index + 1 == len {
            Position::End
        } else {
            Position::Middle(index)
        }
    }
}

/// State of the "load more" affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMoreState {
    /// Nothing inserted yet, so nothing to page from.
    #[default]
    Hidden,
    Available,
    /// An empty page came back. Terminal for the session.
    Exhausted,
}

/// Serializable picture of the inbox at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxSnapshot {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: usize,
    pub load_more: LoadMoreState,
    pub oldest_loaded_at: Option<i64>,
}
