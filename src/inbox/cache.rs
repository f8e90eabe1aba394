//! Duplicate-free, ordered window of notifications.
//!
//! Records are kept sorted by `order_at` descending. Records sharing an
//! `order_at` keep the order in which they were inserted.

use std::collections::HashSet;

use tracing::warn;

use super::models::{NotificationRecord, Position};

/// Outcome of merging a record into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The id was not cached before.
    Inserted(Position),
    /// A cached record with the same id was replaced.
    Replaced(Position),
}

impl Merge {
    pub fn position(&self) -> Position {
        match self {
            Merge::Inserted(position) | Merge::Replaced(position) => *position,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Merge::Inserted(_))
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed { index: usize },
    /// The delete referred to a first-batch record and was ignored.
    FirstBatchIgnored,
    /// Nothing cached under that id.
    NotFound,
}

#[derive(Debug, Default, Clone)]
pub struct OrderedCache {
    records: Vec<NotificationRecord>,
}

impl OrderedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. A record whose id is already cached replaces it.
    pub fn insert(&mut self, record: NotificationRecord) -> Merge {
        if self.index_of(&record.id).is_some() {
            return self.update(record);
        }
        let index = self.place(record);
        Merge::Inserted(Position::resolve(index, self.records.len()))
    }

    /// Replace the cached record sharing the id, or insert it if unknown.
    pub fn update(&mut self, record: NotificationRecord) -> Merge {
        let Some(index) = self.index_of(&record.id) else {
            let index = self.place(record);
            return Merge::Inserted(Position::resolve(index, self.records.len()));
        };

        if self.records[index].order_at == record.order_at {
            self.records[index] = record;
            return Merge::Replaced(Position::resolve(index, self.records.len()));
        }

        self.records.remove(index);
        let index = self.place(record);
        Merge::Replaced(Position::resolve(index, self.records.len()))
    }

    /// Remove the record with the given id.
    ///
    /// Deletes flagged as first batch are always ignored.
    pub fn delete(&mut self, id: &str, first_batch: bool) -> Removal {
        if first_batch {
            return Removal::FirstBatchIgnored;
        }

        match self.index_of(id) {
            Some(index) => {
                self.records.remove(index);
                Removal::Removed { index }
            }
            None => {
                warn!("Delete for notification {} which is not cached", id);
                Removal::NotFound
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.index_of(id).map(|index| &self.records[index])
    }

    pub fn position_of(&self, id: &str) -> Option<Position> {
        self.index_of(id)
            .map(|index| Position::resolve(index, self.records.len()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.records.iter()
    }

    /// Pagination cursor: the oldest `created_at` loaded so far.
    pub fn oldest_loaded_at(&self) -> Option<i64> {
        self.records.iter().map(|r| r.created_at).min()
    }

    /// Flag the given records as read. Returns the ids that changed.
    pub fn mark_read(&mut self, ids: &HashSet<&str>) -> Vec<String> {
        self.records
            .iter_mut()
            .filter(|r| r.is_unread() && ids.contains(r.id.as_str()))
            .map(|r| {
                r.read_status = true;
                r.id.clone()
            })
            .collect()
    }

    /// Flag every cached record as read. Returns the ids that changed.
    pub fn mark_all_read(&mut self) -> Vec<String> {
        self.records
            .iter_mut()
            .filter(|r| r.is_unread())
            .map(|r| {
                r.read_status = true;
                r.id.clone()
            })
            .collect()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    /// Insert after every record with an `order_at` at least as recent, which
    /// is where a stable descending sort would leave an appended record.
    fn place(&mut self, record: NotificationRecord) -> usize {
        let index = self
            .records
            .partition_point(|r| r.order_at >= record.order_at);
        self.records.insert(index, record);
        index
    }
}
