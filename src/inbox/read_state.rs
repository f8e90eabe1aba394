//! Read-state changes and the unread counter.
//!
//! Local records only flip to read once the backend has confirmed, and the
//! unread counter only ever takes values reported by the backend: the cache
//! is a partial window, so counting unread records locally would be wrong.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::backend::{require_backend, within, MarkAsReadResult, NotificationsBackend};
use super::cache::OrderedCache;
use super::error::InboxError;
use super::models::NotificationRecord;
use crate::metrics;

/// Backend-authoritative number of unread notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadCounter {
    count: usize,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.count
    }

    pub fn set(&mut self, count: usize) {
        self.count = count;
        metrics::set_unread_count(count);
    }

    pub fn has_unread(&self) -> bool {
        self.count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// None of the requested ids is cached; the backend was not called.
    NothingToMark,
    Marked {
        /// Cached records that flipped from unread to read.
        ids: Vec<String>,
        unread_count: usize,
    },
}

/// Records selected for a mark-as-read call. Owns everything it needs, so it
/// can be sent while the inbox keeps handling events.
pub struct ReadRequest {
    backend: Arc<dyn NotificationsBackend>,
    records: Vec<NotificationRecord>,
}

impl ReadRequest {
    pub async fn send(self, limit: Duration) -> ReadResponse {
        let ReadRequest { backend, records } = self;
        let ids = records.iter().map(|r| r.id.clone()).collect();
        let result = within(limit, "mark_as_read", backend.mark_as_read(records)).await;
        ReadResponse { ids, result }
    }
}

/// What the backend said about a [`ReadRequest`].
#[derive(Debug)]
pub struct ReadResponse {
    pub ids: Vec<String>,
    pub result: anyhow::Result<MarkAsReadResult>,
}

pub struct MarkAllRequest {
    backend: Arc<dyn NotificationsBackend>,
}

impl MarkAllRequest {
    pub async fn send(self, limit: Duration) -> anyhow::Result<()> {
        within(limit, "mark_all_as_read", self.backend.mark_all_as_read()).await
    }
}

/// Applies read-state changes to the cache and counter of one inbox.
///
/// Each change has two halves: a `request_*` that validates and selects
/// against the cache, and an `apply_*` that takes the backend's answer.
pub struct ReadStateCoordinator<'a> {
    backend: Option<&'a Arc<dyn NotificationsBackend>>,
    cache: &'a mut OrderedCache,
    unread: &'a mut UnreadCounter,
}

impl<'a> ReadStateCoordinator<'a> {
    pub fn new(
        backend: Option<&'a Arc<dyn NotificationsBackend>>,
        cache: &'a mut OrderedCache,
        unread: &'a mut UnreadCounter,
    ) -> Self {
        Self {
            backend,
            cache,
            unread,
        }
    }

    /// Select the cached records among `ids`.
    ///
    /// Empty and repeated ids are dropped, and so are ids that are not cached:
    /// the backend is never asked about a notification this inbox has not
    /// seen. Returns `None` when nothing is left to send.
    pub fn request_mark_as_read<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<Option<ReadRequest>, InboxError> {
        let backend = require_backend(self.backend)?;

        let wanted: HashSet<&str> = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| !id.is_empty())
            .collect();
        let records: Vec<_> = self
            .cache
            .iter()
            .filter(|r| wanted.contains(r.id.as_str()))
            .cloned()
            .collect();

        if records.is_empty() {
            debug!(
                "None of {} requested notifications is cached, skipping mark as read",
                wanted.len()
            );
            return Ok(None);
        }

        debug!("Marking {} notifications as read", records.len());
        Ok(Some(ReadRequest {
            backend: backend.clone(),
            records,
        }))
    }

    /// Take the backend's answer to a [`ReadRequest`].
    ///
    /// Nothing changes locally if the call failed. The reported unread count
    /// is only taken when `count_is_current`; otherwise the counter keeps its
    /// value.
    pub fn apply_mark_as_read(
        self,
        response: ReadResponse,
        count_is_current: bool,
    ) -> Result<ReadOutcome, InboxError> {
        let result = response.result?;

        let sent: HashSet<&str> = response.ids.iter().map(|id| id.as_str()).collect();
        let ids = self.cache.mark_read(&sent);

        if count_is_current {
            self.unread.set(result.unread_count);
        } else {
            debug!(
                "Ignoring unread count {} reported before a mark all",
                result.unread_count
            );
        }

        Ok(ReadOutcome::Marked {
            ids,
            unread_count: self.unread.get(),
        })
    }

    pub fn request_mark_all_as_read(&self) -> Result<MarkAllRequest, InboxError> {
        let backend = require_backend(self.backend)?;
        Ok(MarkAllRequest {
            backend: backend.clone(),
        })
    }

    /// Take the backend's answer to a [`MarkAllRequest`]. Returns the cached
    /// ids that flipped.
    pub fn apply_mark_all_as_read(
        self,
        result: anyhow::Result<()>,
    ) -> Result<Vec<String>, InboxError> {
        result?;
        let ids = self.cache.mark_all_read();
        self.unread.set(0);
        Ok(ids)
    }

    /// Mark the given notifications as read, waiting for the backend.
    pub async fn mark_as_read<S: AsRef<str>>(
        self,
        ids: &[S],
        limit: Duration,
    ) -> Result<ReadOutcome, InboxError> {
        match self.request_mark_as_read(ids)? {
            None => Ok(ReadOutcome::NothingToMark),
            Some(request) => {
                let response = request.send(limit).await;
                self.apply_mark_as_read(response, true)
            }
        }
    }

    /// Mark every notification as read, waiting for the backend.
    pub async fn mark_all_as_read(self, limit: Duration) -> Result<Vec<String>, InboxError> {
        let result = self.request_mark_all_as_read()?.send(limit).await;
        self.apply_mark_all_as_read(result)
    }
}
