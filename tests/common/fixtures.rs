//! Test fixtures: records, seeded windows and a wired-up inbox

use super::constants::*;
use notification_inbox::inbox::{
    InMemoryBackend, NotificationRecord, ReconciliationEngine, RecordingView,
};
use notification_inbox::InboxSettings;
use std::sync::Arc;

pub fn record(id: &str, at: i64) -> NotificationRecord {
    NotificationRecord::new(id, at, at)
}

#[allow(dead_code)]
pub fn bumped_record(id: &str, created_at: i64, order_at: i64) -> NotificationRecord {
    NotificationRecord::new(id, created_at, order_at)
}

/// A full first page: `n0` newest at 1_000_000 down to `n19` at 981_000.
pub fn seed_window() -> Vec<NotificationRecord> {
    (0..SEED_COUNT as i64)
        .map(|i| record(&format!("n{}", i), SEED_NEWEST_AT - i * SEED_STEP))
        .collect()
}

#[allow(dead_code)]
pub fn ids(engine: &ReconciliationEngine) -> Vec<String> {
    engine.cache().iter().map(|r| r.id.clone()).collect()
}

/// Engine with a recording view and, optionally, an in-memory backend.
pub struct TestInbox {
    pub engine: ReconciliationEngine,
    pub view: Arc<RecordingView>,
    #[allow(dead_code)]
    pub backend: Option<Arc<InMemoryBackend>>,
}

impl TestInbox {
    #[allow(dead_code)]
    pub fn without_backend() -> Self {
        let view = Arc::new(RecordingView::new());
        let engine = ReconciliationEngine::new(InboxSettings::default(), view.clone());
        Self {
            engine,
            view,
            backend: None,
        }
    }

    /// Attach a backend holding `archive` and seed the cache with the
    /// same records as the first response.
    #[allow(dead_code)]
    pub fn with_backend(archive: Vec<NotificationRecord>) -> Self {
        Self::with_archive(archive.clone(), archive)
    }

    /// Attach a backend holding `archive`, then deliver `first_response`.
    /// Effects produced while seeding are discarded.
    #[allow(dead_code)]
    pub fn with_archive(
        archive: Vec<NotificationRecord>,
        first_response: Vec<NotificationRecord>,
    ) -> Self {
        let mut inbox = Self::without_backend();
        let backend = Arc::new(InMemoryBackend::new(archive));
        inbox.engine.attach_backend(backend.clone());
        inbox.engine.ingest_initial(first_response);
        inbox.view.take();
        inbox.backend = Some(backend);
        inbox
    }

    #[allow(dead_code)]
    pub fn backend(&self) -> &InMemoryBackend {
        self.backend
            .as_deref()
            .expect("TestInbox was built without a backend")
    }
}
