//! Reconciliation engine.
//!
//! Owns the cache, the unread counter and the pagination state of one inbox,
//! merges the snapshot, the live stream and older pages into them, and tells
//! the view what changed.
//!
//! Backend calls never hold up the engine. [`ReconciliationEngine::accept`]
//! hands back the call an event started as a [`BackendCall`]; whoever runs it
//! feeds its [`Completion`] back in, and only then does the engine touch the
//! cache and counter again.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::backend::{
    require_backend, within, CheckForUpdatesOptions, NotificationsBackend, PollResult,
};
use super::cache::{Merge, OrderedCache, Removal};
use super::classifier::{classify, LiveUpdate};
use super::error::InboxError;
use super::models::{InboundEvent, InboxSnapshot, LoadMoreState, NotificationRecord};
use super::pagination::{PageFetch, PageStart, PaginationController};
use super::read_state::{ReadOutcome, ReadResponse, ReadStateCoordinator, UnreadCounter};
use super::view::InboxView;
use crate::config::InboxSettings;
use crate::metrics;

/// Something the user did in the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UserAction {
    /// Clicked a notification.
    Open { id: String },
    ReadAll,
    LoadMore,
    Refresh,
    /// Asked for the notification settings.
    Settings,
}

/// A backend call in flight. It borrows nothing from the engine.
pub type BackendCall = Pin<Box<dyn Future<Output = Completion> + Send>>;

/// The result of a [`BackendCall`], fed back as [`InboxEvent::Completed`].
#[derive(Debug)]
pub enum Completion {
    MarkedRead {
        /// Mark-all generation when the request was sent.
        generation: u64,
        /// Notification to navigate to once the call settles.
        then_open: Option<String>,
        response: ReadResponse,
    },
    MarkedAllRead(anyhow::Result<()>),
    PageLoaded(anyhow::Result<PollResult>),
    Refreshed(anyhow::Result<()>),
}

impl Completion {
    pub fn operation(&self) -> &'static str {
        match self {
            Completion::MarkedRead { .. } => "mark_as_read",
            Completion::MarkedAllRead(_) => "mark_all_as_read",
            Completion::PageLoaded(_) => "poll",
            Completion::Refreshed(_) => "check_for_updates",
        }
    }
}

/// Everything the engine reacts to, in arrival order.
pub enum InboxEvent {
    /// The backend became available.
    BackendReady(Arc<dyn NotificationsBackend>),
    /// The first page of notifications, or why it could not be loaded.
    FirstResponse(anyhow::Result<Vec<NotificationRecord>>),
    Stream(InboundEvent),
    CountsUpdated { unread_count: usize },
    Action(UserAction),
    Completed(Completion),
}

impl InboxEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            InboxEvent::BackendReady(_) => "backend_ready",
            InboxEvent::FirstResponse(_) => "first_response",
            InboxEvent::Stream(_) => "stream",
            InboxEvent::CountsUpdated { .. } => "counts_updated",
            InboxEvent::Action(_) => "action",
            InboxEvent::Completed(_) => "completed",
        }
    }
}

impl fmt::Debug for InboxEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboxEvent::BackendReady(_) => f.write_str("BackendReady"),
            InboxEvent::FirstResponse(result) => {
                f.debug_tuple("FirstResponse").field(result).finish()
            }
            InboxEvent::Stream(event) => f.debug_tuple("Stream").field(event).finish(),
            InboxEvent::CountsUpdated { unread_count } => f
                .debug_struct("CountsUpdated")
                .field("unread_count", unread_count)
                .finish(),
            InboxEvent::Action(action) => f.debug_tuple("Action").field(action).finish(),
            InboxEvent::Completed(completion) => {
                f.debug_tuple("Completed").field(completion).finish()
            }
        }
    }
}

/// What a "load older" request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// A fetch was already in flight, nothing requested.
    InFlight,
    /// Paging was already retired, nothing requested.
    Exhausted,
    /// The page was empty and paging is now retired.
    ReachedEnd,
    Loaded { merged: usize, rejected: usize },
}

fn boxed<F>(call: F) -> BackendCall
where
    F: Future<Output = Completion> + Send + 'static,
{
    Box::pin(call)
}

pub struct ReconciliationEngine {
    settings: InboxSettings,
    cache: OrderedCache,
    unread: UnreadCounter,
    pagination: PaginationController,
    /// Bumped by every successful mark all.
    read_generation: u64,
    backend: Option<Arc<dyn NotificationsBackend>>,
    view: Arc<dyn InboxView>,
}

impl ReconciliationEngine {
    /// Create an engine with an empty cache and no backend.
    pub fn new(settings: InboxSettings, view: Arc<dyn InboxView>) -> Self {
        let pagination = PaginationController::new(settings.page_size);
        Self {
            settings,
            cache: OrderedCache::new(),
            unread: UnreadCounter::new(),
            pagination,
            read_generation: 0,
            backend: None,
            view,
        }
    }

    pub fn attach_backend(&mut self, backend: Arc<dyn NotificationsBackend>) {
        info!("Notifications backend attached");
        self.backend = Some(backend);
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn settings(&self) -> &InboxSettings {
        &self.settings
    }

    pub fn cache(&self) -> &OrderedCache {
        &self.cache
    }

    pub fn unread_count(&self) -> usize {
        self.unread.get()
    }

    pub fn load_more_state(&self) -> LoadMoreState {
        self.pagination.state()
    }

    pub fn can_load_more(&self) -> bool {
        self.pagination.can_load_more()
    }

    pub fn snapshot(&self) -> InboxSnapshot {
        InboxSnapshot {
            notifications: self.cache.records().to_vec(),
            unread_count: self.unread.get(),
            load_more: self.pagination.state(),
            oldest_loaded_at: self.cache.oldest_loaded_at(),
        }
    }

    // =========================================================================
    // Input channels
    // =========================================================================

    /// Seed the cache from the first response. Tombstones are skipped.
    pub fn ingest_initial(&mut self, records: Vec<NotificationRecord>) {
        let live: Vec<NotificationRecord> =
            records.into_iter().filter(|r| !r.is_tombstone()).collect();

        if live.is_empty() {
            info!("First response has no notifications");
            self.view.render_empty_state();
            return;
        }

        info!("Seeding inbox with {} notifications", live.len());
        for record in live {
            self.apply(LiveUpdate::Insert(record));
        }
    }

    pub fn ingest_initial_error(&mut self, error: anyhow::Error) {
        error!("Failed to load notifications: {:#}", error);
        self.view.render_load_error();
        self.view
            .report_error(&InboxError::Backend(error), "Error loading notifications");
    }

    /// Merge one live event. Malformed events are rejected untouched.
    pub fn ingest_event(&mut self, event: InboundEvent) -> Result<(), InboxError> {
        let update = classify(event).inspect_err(|e| {
            metrics::record_malformed_event();
            warn!("Rejected stream event: {}", e);
        })?;

        metrics::record_live_update(update.kind());
        self.apply(update);
        Ok(())
    }

    /// Take the unread count reported by the backend.
    pub fn ingest_count(&mut self, unread_count: usize) {
        debug!("Unread count updated to {}", unread_count);
        self.unread.set(unread_count);
        self.view.render_unread_indicator(unread_count);
    }

    // =========================================================================
    // Backend operations, awaited in place
    // =========================================================================

    pub async fn mark_as_read<S: AsRef<str> + Sync>(
        &mut self,
        ids: &[S],
    ) -> Result<ReadOutcome, InboxError> {
        let Some(request) = self.read_state().request_mark_as_read(ids)? else {
            return Ok(ReadOutcome::NothingToMark);
        };
        let generation = self.read_generation;
        let response = request.send(self.settings.backend_timeout).await;
        self.finish_mark_as_read(generation, response)
    }

    pub async fn mark_all_as_read(&mut self) -> Result<(), InboxError> {
        let request = self.read_state().request_mark_all_as_read()?;
        let result = request.send(self.settings.backend_timeout).await;
        self.finish_mark_all_as_read(result)
    }

    /// Fetch and merge the next page of older notifications.
    pub async fn load_older(&mut self) -> Result<PageOutcome, InboxError> {
        match self.pagination.begin(self.backend.as_ref(), &self.cache)? {
            PageStart::Skipped(fetch) => Ok(self.merge_page(fetch)),
            PageStart::Request(request) => {
                let result = request.send(self.settings.backend_timeout).await;
                self.finish_page(result)
            }
        }
    }

    /// Ask the backend to poll now.
    pub async fn check_for_updates(&self) -> Result<(), InboxError> {
        self.refresh_call()?.await?;
        Ok(())
    }

    // =========================================================================
    // Events and user actions
    // =========================================================================

    /// Handle an event without waiting on the backend.
    ///
    /// Returns the backend call the event started, if any. Its output must
    /// come back through [`InboxEvent::Completed`] for the operation to take
    /// effect.
    pub fn accept(&mut self, event: InboxEvent) -> Option<BackendCall> {
        match event {
            InboxEvent::BackendReady(backend) => self.attach_backend(backend),
            InboxEvent::FirstResponse(Ok(records)) => self.ingest_initial(records),
            InboxEvent::FirstResponse(Err(e)) => self.ingest_initial_error(e),
            InboxEvent::Stream(event) => {
                if let Err(e) = self.ingest_event(event) {
                    debug!("Dropped stream event: {}", e);
                }
            }
            InboxEvent::CountsUpdated { unread_count } => self.ingest_count(unread_count),
            InboxEvent::Action(action) => return self.start_action(action),
            InboxEvent::Completed(completion) => self.complete(completion),
        }
        None
    }

    /// Handle an event and wait for any backend call it started.
    pub async fn dispatch(&mut self, event: InboxEvent) {
        let mut call = self.accept(event);
        while let Some(pending) = call {
            let completion = pending.await;
            call = self.accept(InboxEvent::Completed(completion));
        }
    }

    /// Run a user action to the end. Failures are reported to the view, not
    /// returned.
    pub async fn handle_action(&mut self, action: UserAction) {
        self.dispatch(InboxEvent::Action(action)).await;
    }

    fn start_action(&mut self, action: UserAction) -> Option<BackendCall> {
        match action {
            UserAction::Open { id } => self.start_open(id),
            UserAction::ReadAll => {
                self.report_metric("notification_read_all", None);
                let request = self.read_state().request_mark_all_as_read();
                match request {
                    Ok(request) => {
                        let limit = self.settings.backend_timeout;
                        Some(boxed(async move {
                            Completion::MarkedAllRead(request.send(limit).await)
                        }))
                    }
                    Err(e) => {
                        self.view
                            .report_error(&e, "Error marking notifications as read");
                        None
                    }
                }
            }
            UserAction::LoadMore => {
                match self.pagination.begin(self.backend.as_ref(), &self.cache) {
                    Ok(PageStart::Request(request)) => {
                        let limit = self.settings.backend_timeout;
                        Some(boxed(async move {
                            Completion::PageLoaded(request.send(limit).await)
                        }))
                    }
                    Ok(PageStart::Skipped(fetch)) => {
                        self.merge_page(fetch);
                        None
                    }
                    Err(e) => {
                        self.view.report_error(&e, "Error loading notifications");
                        None
                    }
                }
            }
            UserAction::Refresh => match self.refresh_call() {
                Ok(call) => Some(boxed(async move { Completion::Refreshed(call.await) })),
                Err(e) => {
                    self.view.report_error(&e, "Notification refresh failed");
                    None
                }
            },
            UserAction::Settings => {
                self.report_metric("notification_settings", None);
                self.view.open_settings();
                None
            }
        }
    }

    /// Mark the notification as read, then follow its navigation target.
    /// Navigation happens even when marking fails.
    fn start_open(&mut self, id: String) -> Option<BackendCall> {
        self.report_metric("notification_open", None);

        let request = self.read_state().request_mark_as_read(&[id.as_str()]);
        match request {
            Ok(Some(request)) => {
                let generation = self.read_generation;
                let limit = self.settings.backend_timeout;
                Some(boxed(async move {
                    Completion::MarkedRead {
                        generation,
                        then_open: Some(id),
                        response: request.send(limit).await,
                    }
                }))
            }
            Ok(None) => {
                self.navigate(&id);
                None
            }
            Err(e) => {
                warn!("Failed to mark notification {} as read: {}", id, e);
                self.navigate(&id);
                None
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        debug!("Backend call {} settled", completion.operation());
        match completion {
            Completion::MarkedRead {
                generation,
                then_open,
                response,
            } => {
                if let Err(e) = self.finish_mark_as_read(generation, response) {
                    warn!("Failed to mark notifications as read: {}", e);
                }
                if let Some(id) = then_open {
                    self.navigate(&id);
                }
            }
            Completion::MarkedAllRead(result) => {
                if let Err(e) = self.finish_mark_all_as_read(result) {
                    self.view
                        .report_error(&e, "Error marking notifications as read");
                }
            }
            Completion::PageLoaded(result) => {
                if let Err(e) = self.finish_page(result) {
                    self.view.report_error(&e, "Error loading notifications");
                }
            }
            Completion::Refreshed(result) => {
                if let Err(e) = result {
                    self.view
                        .report_error(&InboxError::Backend(e), "Notification refresh failed");
                }
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read_state(&mut self) -> ReadStateCoordinator<'_> {
        ReadStateCoordinator::new(self.backend.as_ref(), &mut self.cache, &mut self.unread)
    }

    fn refresh_call(
        &self,
    ) -> Result<impl Future<Output = anyhow::Result<()>> + Send + 'static, InboxError> {
        let backend = require_backend(self.backend.as_ref())?.clone();
        let limit = self.settings.backend_timeout;
        Ok(async move {
            let options = CheckForUpdatesOptions {
                force_polling: true,
            };
            within(limit, "check_for_updates", backend.check_for_updates(options)).await
        })
    }

    /// A count reported before the latest mark all finished is outdated.
    fn finish_mark_as_read(
        &mut self,
        generation: u64,
        response: ReadResponse,
    ) -> Result<ReadOutcome, InboxError> {
        let count_is_current = generation == self.read_generation;
        let outcome = self
            .read_state()
            .apply_mark_as_read(response, count_is_current)?;

        if let ReadOutcome::Marked { ids, unread_count } = &outcome {
            self.render_read(ids);
            self.view.render_unread_indicator(*unread_count);
        }
        Ok(outcome)
    }

    fn finish_mark_all_as_read(&mut self, result: anyhow::Result<()>) -> Result<(), InboxError> {
        let ids = self.read_state().apply_mark_all_as_read(result)?;
        self.read_generation += 1;

        info!("Marked all notifications as read ({} cached)", ids.len());
        self.render_read(&ids);
        self.view.render_unread_indicator(0);
        Ok(())
    }

    fn finish_page(&mut self, result: anyhow::Result<PollResult>) -> Result<PageOutcome, InboxError> {
        let fetch = self.pagination.finish(result)?;
        Ok(self.merge_page(fetch))
    }

    fn merge_page(&mut self, fetch: PageFetch) -> PageOutcome {
        match fetch {
            PageFetch::InFlight => PageOutcome::InFlight,
            PageFetch::Exhausted => PageOutcome::Exhausted,
            PageFetch::ReachedEnd => {
                self.report_metric("load_more", Some(0));
                self.view.render_load_more(false);
                PageOutcome::ReachedEnd
            }
            PageFetch::Entries(entries) => {
                self.report_metric("load_more", Some(entries.len()));

                let mut merged = 0;
                let mut rejected = 0;
                for event in entries {
                    match classify(event) {
                        Ok(update) => {
                            metrics::record_live_update(update.kind());
                            self.apply(update);
                            merged += 1;
                        }
                        Err(e) => {
                            metrics::record_malformed_event();
                            warn!("Skipping page entry: {}", e);
                            rejected += 1;
                        }
                    }
                }

                info!("Loaded {} older notifications", merged);
                PageOutcome::Loaded { merged, rejected }
            }
        }
    }

    fn navigate(&self, id: &str) {
        if let Some(target) = self.cache.get(id).and_then(|r| r.navigate_target()) {
            self.view.navigate_to(target);
        }
    }

    fn apply(&mut self, update: LiveUpdate) {
        match update {
            LiveUpdate::Insert(record) => {
                let id = record.id.clone();
                let merge = self.cache.insert(record);
                self.render_merge(&id, merge, true);
            }
            LiveUpdate::Update(record) => {
                // An update for an unknown id is placed like an insert, but
                // does not bring up the load-more affordance.
                let id = record.id.clone();
                let merge = self.cache.update(record);
                self.render_merge(&id, merge, false);
            }
            LiveUpdate::Delete { id, first_batch } => {
                match self.cache.delete(&id, first_batch) {
                    Removal::FirstBatchIgnored => {
                        debug!("Ignoring delete of first batch notification {}", id);
                        return;
                    }
                    Removal::Removed { .. } => self.view.render_delete(&id),
                    Removal::NotFound => metrics::record_anomalous_delete(),
                }

                metrics::set_cached_notifications(self.cache.len());
                if self.cache.is_empty() {
                    self.view.render_empty_state();
                }
            }
        }
    }

    fn render_merge(&mut self, id: &str, merge: Merge, offer_load_more: bool) {
        if let Some(record) = self.cache.get(id) {
            match merge {
                Merge::Inserted(position) => self.view.render_insert(record, position),
                Merge::Replaced(position) => self.view.render_update(record, position),
            }
        }

        if offer_load_more && merge.is_insert() && self.pagination.offer() {
            self.view.render_load_more(true);
        }
        metrics::set_cached_notifications(self.cache.len());
    }

    fn render_read(&self, ids: &[String]) {
        for id in ids {
            if let (Some(record), Some(position)) = (self.cache.get(id), self.cache.position_of(id))
            {
                self.view.render_update(record, position);
            }
        }
    }

    fn report_metric(&self, action: &str, value: Option<usize>) {
        self.view
            .report_metric(&self.settings.analytics_category, action, value);
    }
}
