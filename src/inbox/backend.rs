//! Notifications backend collaborator.
//!
//! The backend owns delivery: polling, the live stream and the authoritative
//! unread count. The inbox only talks to it through [`NotificationsBackend`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::error::InboxError;
use super::models::{InboundEvent, NotificationRecord};
use crate::metrics;

/// How long a backend call may take before it is failed.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Query for a page of notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollQuery {
    pub limit: usize,
    /// Only notifications created strictly before this timestamp.
    pub created_before: Option<i64>,
    /// Whether the backend should also push the results to the stream.
    pub publish_to_stream: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    pub entries: Vec<InboundEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAsReadResult {
    pub unread_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckForUpdatesOptions {
    pub force_polling: bool,
}

/// Operations the inbox needs from the notifications service.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NotificationsBackend: Send + Sync {
    /// Fetch a page of notifications.
    async fn poll(&self, query: PollQuery) -> Result<PollResult>;

    /// Mark the given notifications as read, returning the new unread count.
    async fn mark_as_read(&self, records: Vec<NotificationRecord>) -> Result<MarkAsReadResult>;

    async fn mark_all_as_read(&self) -> Result<()>;

    async fn check_for_updates(&self, options: CheckForUpdatesOptions) -> Result<()>;

    /// Whether a fetch is currently in flight.
    fn is_polling(&self) -> bool;
}

/// Resolve an optional backend, failing with [`InboxError::NotConfigured`].
pub fn require_backend(
    backend: Option<&Arc<dyn NotificationsBackend>>,
) -> Result<&Arc<dyn NotificationsBackend>, InboxError> {
    backend.ok_or(InboxError::NotConfigured)
}

/// Await a backend call for at most `limit`.
///
/// Failures, timeouts included, are counted per operation.
pub async fn within<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let result = match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{} timed out after {:?}", operation, limit)),
    };
    result.inspect_err(|_| metrics::record_backend_failure(operation))
}

/// Per-operation call counters of an [`InMemoryBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackendCalls {
    pub poll: usize,
    pub mark_as_read: usize,
    pub mark_all_as_read: usize,
    pub check_for_updates: usize,
}

/// Backend serving notifications from memory.
///
/// Holds the full set of a user's notifications, computes unread counts from
/// it, and can be told to fail its next call or to report a poll in flight.
pub struct InMemoryBackend {
    archive: Mutex<Vec<NotificationRecord>>,
    polling: AtomicBool,
    fail_next: Mutex<Option<String>>,
    poll_calls: AtomicUsize,
    mark_as_read_calls: AtomicUsize,
    mark_all_as_read_calls: AtomicUsize,
    check_for_updates_calls: AtomicUsize,
    marked: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    pub fn new(archive: Vec<NotificationRecord>) -> Self {
        Self {
            archive: Mutex::new(archive),
            polling: AtomicBool::new(false),
            fail_next: Mutex::new(None),
            poll_calls: AtomicUsize::new(0),
            mark_as_read_calls: AtomicUsize::new(0),
            mark_all_as_read_calls: AtomicUsize::new(0),
            check_for_updates_calls: AtomicUsize::new(0),
            marked: Mutex::new(Vec::new()),
        }
    }

    pub fn set_polling(&self, polling: bool) {
        self.polling.store(polling, Ordering::SeqCst);
    }

    /// Make the next backend call fail with the given message.
    pub async fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock().await = Some(message.into());
    }

    pub async fn add(&self, record: NotificationRecord) {
        self.archive.lock().await.push(record);
    }

    pub async fn unread_count(&self) -> usize {
        self.archive
            .lock()
            .await
            .iter()
            .filter(|r| r.is_unread() && !r.is_tombstone())
            .count()
    }

    /// Ids sent to `mark_as_read`, in call order.
    pub async fn marked_ids(&self) -> Vec<String> {
        self.marked.lock().await.clone()
    }

    pub fn calls(&self) -> BackendCalls {
        BackendCalls {
            poll: self.poll_calls.load(Ordering::SeqCst),
            mark_as_read: self.mark_as_read_calls.load(Ordering::SeqCst),
            mark_all_as_read: self.mark_all_as_read_calls.load(Ordering::SeqCst),
            check_for_updates: self.check_for_updates_calls.load(Ordering::SeqCst),
        }
    }

    async fn take_failure(&self) -> Result<()> {
        match self.fail_next.lock().await.take() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationsBackend for InMemoryBackend {
    async fn poll(&self, query: PollQuery) -> Result<PollResult> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure().await?;

        let archive = self.archive.lock().await;
        let mut page: Vec<NotificationRecord> = archive
            .iter()
            .filter(|r| !r.is_tombstone())
            .filter(|r| query.created_before.map_or(true, |before| r.created_at < before))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        page.truncate(query.limit);

        debug!(
            "Serving {} notifications created before {:?}",
            page.len(),
            query.created_before
        );

        Ok(PollResult {
            entries: page.into_iter().map(InboundEvent::insert).collect(),
        })
    }

    async fn mark_as_read(&self, records: Vec<NotificationRecord>) -> Result<MarkAsReadResult> {
        self.mark_as_read_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure().await?;

        {
            let mut archive = self.archive.lock().await;
            for stored in archive.iter_mut() {
                if records.iter().any(|r| r.id == stored.id) {
                    stored.read_status = true;
                }
            }
        }
        self.marked
            .lock()
            .await
            .extend(records.into_iter().map(|r| r.id));

        Ok(MarkAsReadResult {
            unread_count: self.unread_count().await,
        })
    }

    async fn mark_all_as_read(&self) -> Result<()> {
        self.mark_all_as_read_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure().await?;

        for stored in self.archive.lock().await.iter_mut() {
            stored.read_status = true;
        }
        Ok(())
    }

    async fn check_for_updates(&self, _options: CheckForUpdatesOptions) -> Result<()> {
        self.check_for_updates_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure().await
    }

    fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, created_at: i64) -> NotificationRecord {
        NotificationRecord::new(id, created_at, created_at)
    }

    #[test]
    fn test_require_backend() {
        assert!(require_backend(None).err().unwrap().is_not_configured());

        let backend: Arc<dyn NotificationsBackend> = Arc::new(InMemoryBackend::new(vec![]));
        assert!(require_backend(Some(&backend)).is_ok());
    }

    #[tokio::test]
    async fn test_poll_returns_newest_older_than_cursor() {
        let backend = InMemoryBackend::new((1..=10).map(|i| record(&format!("n{}", i), i)).collect());

        let result = backend
            .poll(PollQuery {
                limit: 3,
                created_before: Some(8),
                publish_to_stream: false,
            })
            .await
            .unwrap();

        let ids: Vec<&str> = result.entries.iter().map(|e| e.record.id.as_str()).collect();
        assert_eq!(ids, vec!["n7", "n6", "n5"]);
        assert_eq!(backend.calls().poll, 1);
    }

    #[tokio::test]
    async fn test_poll_skips_tombstones() {
        let mut deleted = record("deleted", 5);
        deleted.deleted_at = Some(6);
        let backend = InMemoryBackend::new(vec![record("kept", 4), deleted]);

        let result = backend
            .poll(PollQuery {
                limit: 20,
                created_before: None,
                publish_to_stream: false,
            })
            .await
            .unwrap();

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].record.id, "kept");
    }

    #[tokio::test]
    async fn test_mark_as_read_returns_remaining_unread() {
        let backend = InMemoryBackend::new(vec![record("a", 1), record("b", 2), record("c", 3)]);

        let result = backend.mark_as_read(vec![record("b", 2)]).await.unwrap();

        assert_eq!(result.unread_count, 2);
        assert_eq!(backend.marked_ids().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_fail_next_fails_once() {
        let backend = InMemoryBackend::new(vec![record("a", 1)]);
        backend.fail_next("service unavailable").await;

        let err = backend.mark_all_as_read().await.unwrap_err();
        assert_eq!(err.to_string(), "service unavailable");
        assert_eq!(backend.unread_count().await, 1);

        backend.mark_all_as_read().await.unwrap();
        assert_eq!(backend.unread_count().await, 0);
        assert_eq!(backend.calls().mark_all_as_read, 2);
    }

    #[tokio::test]
    async fn test_within_passes_results_through() {
        let value = within(DEFAULT_BACKEND_TIMEOUT, "poll", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = within(DEFAULT_BACKEND_TIMEOUT, "poll", async {
            Err::<(), _>(anyhow!("refused"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "refused");
    }

    #[tokio::test]
    async fn test_within_fails_hung_calls() {
        let hung = std::future::pending::<Result<()>>();

        let err = within(Duration::from_millis(10), "mark_all_as_read", hung)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("mark_all_as_read timed out"));
    }

    #[test]
    fn test_polling_flag() {
        let backend = InMemoryBackend::new(vec![]);
        assert!(!backend.is_polling());
        backend.set_polling(true);
        assert!(backend.is_polling());
    }
}
