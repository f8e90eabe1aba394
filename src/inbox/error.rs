use thiserror::Error;

/// Errors surfaced by inbox operations.
#[derive(Debug, Error)]
pub enum InboxError {
    /// No backend has been attached yet.
    #[error("Notifications backend is not configured")]
    NotConfigured,

    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("Malformed event {id:?}: {reason}")]
    MalformedEvent { id: String, reason: &'static str },
}

impl InboxError {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, InboxError::NotConfigured)
    }
}
