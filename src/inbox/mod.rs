//! Notification inbox reconciliation

mod backend;
mod cache;
mod classifier;
pub mod driver;
mod engine;
mod error;
mod models;
mod pagination;
mod read_state;
mod view;

pub use backend::{
    require_backend, within, BackendCalls, CheckForUpdatesOptions, InMemoryBackend,
    MarkAsReadResult, NotificationsBackend, PollQuery, PollResult, DEFAULT_BACKEND_TIMEOUT,
};
#[cfg(any(test, feature = "mock"))]
pub use backend::MockNotificationsBackend;
pub use cache::{Merge, OrderedCache, Removal};
pub use classifier::{classify, LiveUpdate};
pub use engine::{BackendCall, Completion, InboxEvent, PageOutcome, ReconciliationEngine, UserAction};
pub use error::InboxError;
pub use models::{InboundEvent, InboxSnapshot, LoadMoreState, NotificationRecord, Position};
pub use pagination::{PageFetch, PageRequest, PageStart, PaginationController, DEFAULT_PAGE_SIZE};
pub use read_state::{
    MarkAllRequest, ReadOutcome, ReadRequest, ReadResponse, ReadStateCoordinator, UnreadCounter,
};
pub use view::{InboxView, RecordingView, TracingView, ViewEffect};
