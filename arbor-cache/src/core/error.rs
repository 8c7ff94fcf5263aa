use thiserror::Error;

/// Main error type for cache operations.
///
/// The enum is `Clone` so a single fetch failure can resolve every caller
/// coalesced onto the same in-flight request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArborError {
    /// The underlying source failed while enumerating children. Propagated
    /// to every concurrent waiter and never cached; the next call retries.
    #[error("Source fetch failed for '{target}': {message}")]
    SourceFetch { target: String, message: String },

    /// An invalidation was handed a node that cannot be resolved to a
    /// target identifier.
    #[error("Invalid invalidation target: {0}")]
    InvalidTarget(String),

    /// A limit or depth bound was out of range at construction time.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ArborError {
    /// Fetch failure for `target` with a human-readable cause.
    pub fn fetch(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceFetch {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Error delivered to waiters when the leading fetch was dropped
    /// before producing a result.
    pub(crate) fn fetch_cancelled(target: impl Into<String>) -> Self {
        Self::fetch(target, "fetch cancelled before completion")
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, ArborError>;
