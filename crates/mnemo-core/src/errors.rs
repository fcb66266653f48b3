use std::time::Duration;

/// Error taxonomy for the memory layer.
///
/// Only malformed entries and sanitizer truncation are swallowed locally
/// (the former counted on load, the latter carried in sanitize flags);
/// every other kind surfaces to the caller.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The observation file hash does not match the last audit record.
    /// Fatal to reads; no data is served.
    #[error("tamper detected: observation log hash {actual} != audited {expected}")]
    TamperDetected { expected: String, actual: String },

    /// The audit file itself is corrupt or its hash chain has a broken link.
    /// Fatal; no further writes are permitted.
    #[error("audit chain broken: {reason}")]
    AuditChainBroken { reason: String },

    /// An observation entry could not be parsed. Recovered by skipping and
    /// counting at the log level; surfaced only by single-entry parse APIs.
    #[error("malformed observation entry: {reason}")]
    MalformedEntry { reason: String },

    /// The candidate instruction drifted below the anchor overlap threshold.
    /// Advisory. A 🔴 observation has already been appended, and the caller
    /// decides whether to abort.
    #[error("context drift: overlap {score:.3} below threshold {threshold:.3}")]
    ContextDrift { score: f64, threshold: f64 },

    /// The LLM adapter failed. Recoverable; no files were mutated.
    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),

    /// Filesystem failure. Atomic writes ensure no partial state remains.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TamperDetected { .. } => "tamper_detected",
            Self::AuditChainBroken { .. } => "audit_chain_broken",
            Self::MalformedEntry { .. } => "malformed_entry",
            Self::ContextDrift { .. } => "context_drift",
            Self::Llm(_) => "llm_failure",
            Self::Io(_) => "io_failure",
        }
    }

    /// True for kinds that permanently poison the store (no retry inside the
    /// library will help).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TamperDetected { .. } | Self::AuditChainBroken { .. }
        )
    }
}

/// Errors surfaced by [`crate::adapter::LlmAdapter`] implementations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum LlmError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("provider returned no text content")]
    EmptyResponse,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Cancelled | Self::EmptyResponse => false,
        }
    }

    /// Classify an HTTP status into the adapter error shape.
    pub fn from_status(status: u16, body: String) -> Self {
        Self::Http { status, body }
    }
}
