//! Unified error type for the orchestration kernel (spec §7).
//!
//! Every crate in the workspace funnels its own `thiserror` enum into
//! [`ApexError`] via `#[from]`, so callers at the kernel boundary always
//! see one of the ten kinds named in spec §7 and never a raw
//! language-level fault.

use thiserror::Error;

/// One of the ten error kinds the orchestration kernel recognizes.
///
/// Severity and retry behavior are keyed off the variant, not off any
/// string matching — see [`ApexError::severity`] and
/// [`ApexError::recovery_strategy`].
#[derive(Debug, Error)]
pub enum ApexError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("subprocess failure: {0}")]
    SubprocessFailure(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("critical error: {0}")]
    Critical(String),
}

/// Severity bucket an [`ApexError`] falls into, per spec §7's mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the current operation with cleanup; do not retry.
    Fatal,
    /// Retry with back-off, then give up.
    Retryable,
    /// User-visible, no retry.
    UserError,
    /// Defer to the next cycle / caller decides.
    Deferred,
}

/// Named recovery strategy attached to a persisted error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    Retry,
    Fallback,
    Skip,
    Abort,
    UserIntervention,
}

impl ApexError {
    /// Severity bucket for this error, per spec §7.
    pub fn severity(&self) -> Severity {
        match self {
            ApexError::Critical(_) => Severity::Fatal,
            ApexError::IoFailure(_) | ApexError::SubprocessFailure(_) | ApexError::Timeout(_) => {
                Severity::Retryable
            }
            ApexError::InvalidInput(_) | ApexError::ProtocolViolation(_) => Severity::UserError,
            ApexError::ResourceExhausted(_) => Severity::Deferred,
            ApexError::NotFound(_) | ApexError::AlreadyExists(_) | ApexError::Conflict(_) => {
                Severity::UserError
            }
        }
    }

    /// Default recovery strategy suggested for this error kind.
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self.severity() {
            Severity::Fatal => RecoveryStrategy::Abort,
            Severity::Retryable => RecoveryStrategy::Retry,
            Severity::UserError => RecoveryStrategy::UserIntervention,
            Severity::Deferred => RecoveryStrategy::Skip,
        }
    }

    /// Whether a caller should attempt the back-off/retry loop in
    /// [`crate::retry::Backoff`] for this error.
    pub fn is_retryable(&self) -> bool {
        self.severity() == Severity::Retryable
    }
}

/// Result alias used throughout the workspace.
pub type ApexResult<T> = Result<T, ApexError>;

/// A persisted error record, written to `errors/{err_id}/context` by
/// whichever component first handles the error (spec §7).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorRecord {
    pub err_id: uuid::Uuid,
    pub component: String,
    pub operation: String,
    pub severity: String,
    pub category: String,
    pub strategy: RecoveryStrategy,
    pub message: String,
    pub retry_count: u32,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
}

impl ErrorRecord {
    pub fn new(
        component: impl Into<String>,
        operation: impl Into<String>,
        err: &ApexError,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let category = match err {
            ApexError::NotFound(_) => "NotFound",
            ApexError::AlreadyExists(_) => "AlreadyExists",
            ApexError::InvalidInput(_) => "InvalidInput",
            ApexError::Conflict(_) => "Conflict",
            ApexError::ResourceExhausted(_) => "ResourceExhausted",
            ApexError::Timeout(_) => "Timeout",
            ApexError::IoFailure(_) => "IOFailure",
            ApexError::SubprocessFailure(_) => "SubprocessFailure",
            ApexError::ProtocolViolation(_) => "ProtocolViolation",
            ApexError::Critical(_) => "Critical",
        };
        Self {
            err_id: uuid::Uuid::new_v4(),
            component: component.into(),
            operation: operation.into(),
            severity: format!("{:?}", err.severity()),
            category: category.to_string(),
            strategy: err.recovery_strategy(),
            message: err.to_string(),
            retry_count: 0,
            occurred_at: now,
            resolved: false,
            resolution_notes: None,
        }
    }

    pub fn mark_resolved(&mut self, notes: impl Into<String>) {
        self.resolved = true;
        self.resolution_notes = Some(notes.into());
    }
}
