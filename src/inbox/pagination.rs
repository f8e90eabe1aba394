//! "Load older" paging with single-flight protection and exhaustion.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::backend::{require_backend, within, NotificationsBackend, PollQuery, PollResult};
use super::cache::OrderedCache;
use super::error::InboxError;
use super::models::{InboundEvent, LoadMoreState};
use crate::metrics;

/// Default number of notifications requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Result of asking the backend for an older page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    /// The backend already had a fetch in flight; nothing was requested.
    InFlight,
    /// An earlier page came back empty; nothing was requested.
    Exhausted,
    /// This page came back empty. Paging is now retired.
    ReachedEnd,
    Entries(Vec<InboundEvent>),
}

/// How a "load older" request started.
pub enum PageStart {
    /// Nothing to request; carries [`PageFetch::InFlight`] or
    /// [`PageFetch::Exhausted`].
    Skipped(PageFetch),
    Request(PageRequest),
}

/// A poll for one older page, ready to be sent.
pub struct PageRequest {
    backend: Arc<dyn NotificationsBackend>,
    query: PollQuery,
}

impl PageRequest {
    pub fn query(&self) -> &PollQuery {
        &self.query
    }

    pub async fn send(self, limit: Duration) -> anyhow::Result<PollResult> {
        let PageRequest { backend, query } = self;
        within(limit, "poll", backend.poll(query)).await
    }
}

#[derive(Debug, Clone)]
pub struct PaginationController {
    page_size: usize,
    state: LoadMoreState,
    loading: bool,
}

impl PaginationController {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            state: LoadMoreState::Hidden,
            loading: false,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn state(&self) -> LoadMoreState {
        self.state
    }

    pub fn can_load_more(&self) -> bool {
        self.state == LoadMoreState::Available
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == LoadMoreState::Exhausted
    }

    /// Whether a page requested through [`begin`](Self::begin) has not been
    /// finished yet.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Offer the "load more" affordance. Returns true only the first time;
    /// once exhausted it is never offered again.
    pub fn offer(&mut self) -> bool {
        if self.state != LoadMoreState::Hidden {
            return false;
        }
        self.state = LoadMoreState::Available;
        true
    }

    /// Start a request for the page of notifications created strictly before
    /// the oldest one cached.
    ///
    /// Until [`finish`](Self::finish) is called, further requests are skipped
    /// as in flight.
    pub fn begin(
        &mut self,
        backend: Option<&Arc<dyn NotificationsBackend>>,
        cache: &OrderedCache,
    ) -> Result<PageStart, InboxError> {
        let backend = require_backend(backend)?;

        if self.is_exhausted() {
            debug!("No older notifications left, not polling");
            return Ok(PageStart::Skipped(PageFetch::Exhausted));
        }

        if self.loading || backend.is_polling() {
            debug!("Poll already in flight, skipping load older");
            return Ok(PageStart::Skipped(PageFetch::InFlight));
        }

        let query = PollQuery {
            limit: self.page_size,
            created_before: cache.oldest_loaded_at(),
            publish_to_stream: false,
        };
        debug!("Loading older notifications: {:?}", query);

        self.loading = true;
        Ok(PageStart::Request(PageRequest {
            backend: backend.clone(),
            query,
        }))
    }

    /// Take the result of the page started by [`begin`](Self::begin).
    ///
    /// A backend failure leaves the affordance as it was.
    pub fn finish(&mut self, result: anyhow::Result<PollResult>) -> Result<PageFetch, InboxError> {
        self.loading = false;
        let result = result?;

        metrics::record_records_loaded(result.entries.len());

        if result.entries.is_empty() {
            info!("No older notifications, retiring load more");
            self.state = LoadMoreState::Exhausted;
            return Ok(PageFetch::ReachedEnd);
        }

        Ok(PageFetch::Entries(result.entries))
    }

    /// Request and wait for the next older page.
    pub async fn load_older(
        &mut self,
        backend: Option<&Arc<dyn NotificationsBackend>>,
        cache: &OrderedCache,
        limit: Duration,
    ) -> Result<PageFetch, InboxError> {
        match self.begin(backend, cache)? {
            PageStart::Skipped(fetch) => Ok(fetch),
            PageStart::Request(request) => {
                let result = request.send(limit).await;
                self.finish(result)
            }
        }
    }
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::backend::{MockNotificationsBackend, DEFAULT_BACKEND_TIMEOUT};
    use crate::inbox::models::NotificationRecord;

    const LIMIT: Duration = DEFAULT_BACKEND_TIMEOUT;

    fn cache_created_at(created: &[i64]) -> OrderedCache {
        let mut cache = OrderedCache::new();
        for (i, at) in created.iter().enumerate() {
            cache.insert(NotificationRecord::new(format!("n{}", i), *at, *at));
        }
        cache
    }

    fn page(ids: &[&str]) -> PollResult {
        PollResult {
            entries: ids
                .iter()
                .map(|id| InboundEvent::insert(NotificationRecord::new(*id, 1, 1)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_not_configured() {
        let mut controller = PaginationController::default();
        let err = controller
            .load_older(None, &OrderedCache::new(), LIMIT)
            .await
            .unwrap_err();
        assert!(err.is_not_configured());
    }

    #[tokio::test]
    async fn test_in_flight_poll_is_not_duplicated() {
        let mut mock = MockNotificationsBackend::new();
        mock.expect_is_polling().return_const(true);
        mock.expect_poll().times(0);
        let backend: Arc<dyn NotificationsBackend> = Arc::new(mock);

        let mut controller = PaginationController::default();
        let fetch = controller
            .load_older(Some(&backend), &cache_created_at(&[100]), LIMIT)
            .await
            .unwrap();

        assert_eq!(fetch, PageFetch::InFlight);
        assert!(!controller.is_exhausted());
    }

    #[tokio::test]
    async fn test_query_uses_oldest_created_at_and_page_size() {
        let mut mock = MockNotificationsBackend::new();
        mock.expect_is_polling().return_const(false);
        mock.expect_poll()
            .withf(|query| {
                *query
                    == PollQuery {
                        limit: 20,
                        created_before: Some(40),
                        publish_to_stream: false,
                    }
            })
            .times(1)
            .returning(|_| Ok(page(&["older"])));
        let backend: Arc<dyn NotificationsBackend> = Arc::new(mock);

        let mut controller = PaginationController::default();
        let fetch = controller
            .load_older(Some(&backend), &cache_created_at(&[100, 40, 70]), LIMIT)
            .await
            .unwrap();

        match fetch {
            PageFetch::Entries(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].record.id, "older");
            }
            other => panic!("Expected entries, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_page_exhausts_for_good() {
        let mut mock = MockNotificationsBackend::new();
        mock.expect_is_polling().return_const(false);
        mock.expect_poll()
            .times(1)
            .returning(|_| Ok(PollResult::default()));
        let backend: Arc<dyn NotificationsBackend> = Arc::new(mock);

        let mut controller = PaginationController::default();
        assert!(controller.offer());
        assert!(controller.can_load_more());

        let cache = cache_created_at(&[100]);
        let fetch = controller.load_older(Some(&backend), &cache, LIMIT).await.unwrap();
        assert_eq!(fetch, PageFetch::ReachedEnd);
        assert_eq!(controller.state(), LoadMoreState::Exhausted);

        // No further poll, and offering again does not re-arm
        let fetch = controller.load_older(Some(&backend), &cache, LIMIT).await.unwrap();
        assert_eq!(fetch, PageFetch::Exhausted);
        assert!(!controller.offer());
        assert!(!controller.can_load_more());
    }

    #[tokio::test]
    async fn test_backend_failure_does_not_exhaust() {
        let mut mock = MockNotificationsBackend::new();
        mock.expect_is_polling().return_const(false);
        mock.expect_poll()
            .returning(|_| Err(anyhow::anyhow!("502 bad gateway")));
        let backend: Arc<dyn NotificationsBackend> = Arc::new(mock);

        let mut controller = PaginationController::default();
        controller.offer();

        let err = controller
            .load_older(Some(&backend), &cache_created_at(&[100]), LIMIT)
            .await
            .unwrap_err();

        assert!(matches!(err, InboxError::Backend(_)));
        assert_eq!(controller.state(), LoadMoreState::Available);
    }

    #[test]
    fn test_begun_page_is_single_flight_until_finished() {
        let mut mock = MockNotificationsBackend::new();
        mock.expect_is_polling().return_const(false);
        mock.expect_poll().times(0);
        let backend: Arc<dyn NotificationsBackend> = Arc::new(mock);
        let cache = cache_created_at(&[100]);

        let mut controller = PaginationController::default();
        let first = controller.begin(Some(&backend), &cache).unwrap();
        assert!(matches!(&first, PageStart::Request(request) if request.query().created_before == Some(100)));
        assert!(controller.is_loading());

        let second = controller.begin(Some(&backend), &cache).unwrap();
        assert!(matches!(second, PageStart::Skipped(PageFetch::InFlight)));

        let fetch = controller.finish(Ok(page(&["older"]))).unwrap();
        assert!(matches!(fetch, PageFetch::Entries(_)));
        assert!(!controller.is_loading());
    }

    #[test]
    fn test_failed_page_clears_in_flight() {
        let mut mock = MockNotificationsBackend::new();
        mock.expect_is_polling().return_const(false);
        let backend: Arc<dyn NotificationsBackend> = Arc::new(mock);

        let mut controller = PaginationController::default();
        controller
            .begin(Some(&backend), &cache_created_at(&[100]))
            .unwrap();

        let err = controller
            .finish(Err(anyhow::anyhow!("poll timed out after 30s")))
            .unwrap_err();

        assert!(matches!(err, InboxError::Backend(_)));
        assert!(!controller.is_loading());
        assert!(!controller.is_exhausted());
    }

    #[test]
    fn test_offer_only_once() {
        let mut controller = PaginationController::new(5);
        assert_eq!(controller.page_size(), 5);
        assert_eq!(controller.state(), LoadMoreState::Hidden);
        assert!(controller.offer());
        assert!(!controller.offer());
    }
}
