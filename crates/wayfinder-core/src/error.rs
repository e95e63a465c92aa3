//! Error types for the workflow engine
//!
//! Nothing in the engine is fatal. Errors fall into four groups:
//! - Validation problems in step data (logged, never surfaced)
//! - Network failures from the content API (surfaced as dismissable hints, retryable)
//! - Stale state caused by a fingerprint change (triggers invalidation, not surfaced)
//! - Authentication requirements (routed to the auth gate)
//!
//! Boundary code converts failures into [`Hint`]s with [`WorkflowError::into_hint`].

use crate::fingerprint::Fingerprint;
use crate::types::StepId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main workflow error type
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Malformed step data
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationIssue),

    /// External API failure
    #[error("{operation} failed: {message}")]
    Network {
        /// Operation that failed (e.g. `analyze-website`)
        operation: &'static str,
        /// Failure detail
        message: String,
    },

    /// A background job finished with a failure status
    #[error("job {job_id} failed: {message}")]
    JobFailed {
        /// Job identifier
        job_id: String,
        /// Failure detail reported by the job API
        message: String,
    },

    /// Downstream data was generated from a different analysis
    #[error("stale state: expected fingerprint {expected}, found {actual}")]
    StaleState {
        /// Fingerprint of the current analysis
        expected: Fingerprint,
        /// Fingerprint the stale data was generated from
        actual: Fingerprint,
    },

    /// Action requires an authenticated identity
    #[error("authentication required ({0})")]
    AuthRequired(AuthContext),

    /// Client storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation cancelled by teardown
    #[error("operation cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Create network error
    #[inline]
    pub fn network(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Network {
            operation,
            message: message.into(),
        }
    }

    /// Whether the user should see this error
    #[inline]
    #[must_use]
    pub fn is_surfaced(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::JobFailed { .. })
    }

    /// Whether retrying the same action may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::JobFailed { .. } | Self::Storage(_)
        )
    }

    /// Convert into a user-facing hint, if the error is surfaced at all
    #[must_use]
    pub fn into_hint(self) -> Option<Hint> {
        match self {
            Self::Network { operation, message } => Some(Hint::error(format!(
                "Could not complete {operation}: {message}. Please try again."
            ))),
            Self::JobFailed { message, .. } => Some(Hint::error(format!(
                "Generation failed: {message}. Please try again."
            ))),
            Self::AuthRequired(context) => Some(Hint::info(match context {
                AuthContext::Register => "Create an account to continue.",
                AuthContext::Login => "Sign in to continue.",
            })),
            Self::Validation(_) | Self::StaleState { .. } | Self::Storage(_) | Self::Cancelled => {
                None
            }
        }
    }
}

/// Malformed step data found at the write boundary
///
/// Writes are merged regardless; issues are logged for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    /// Home marked complete without an analysis
    #[error("home marked complete without a website analysis")]
    CompletedWithoutAnalysis,

    /// Required analysis field is blank
    #[error("analysis field `{0}` is empty")]
    EmptyAnalysisField(&'static str),

    /// Strategy id is blank
    #[error("strategy has an empty id")]
    EmptyStrategyId,

    /// Selected topic is not one of the generated topics
    #[error("selected topic `{0}` is not among the generated topics")]
    UnknownTopic(String),

    /// Patch targeted a different step than the caller expected
    #[error("patch for `{actual}` applied while `{expected}` is current")]
    StepMismatch {
        /// Step the caller is on
        expected: StepId,
        /// Step the patch carries
        actual: StepId,
    },
}

/// Client storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend refused the write because it is full
    #[error("storage quota exceeded ({needed} bytes needed, {available} available)")]
    QuotaExceeded {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Persisted blob could not be parsed
    #[error("corrupted state: {0}")]
    Corrupted(String),

    /// Persisted blob has a format version this build does not understand
    #[error("unsupported state version {0}")]
    UnsupportedVersion(u32),

    /// I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which authentication prompt to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthContext {
    /// New account
    Register,
    /// Existing account
    Login,
}

impl fmt::Display for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthContext::Register => f.write_str("register"),
            AuthContext::Login => f.write_str("login"),
        }
    }
}

/// Severity of a user-facing hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintLevel {
    /// Informational nudge
    Info,
    /// Action could not proceed
    Warning,
    /// Something failed; retry is possible
    Error,
}

/// Dismissable, non-blocking message for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    /// Severity
    pub level: HintLevel,
    /// Message text
    pub message: String,
}

impl Hint {
    /// Informational hint
    #[inline]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: HintLevel::Info,
            message: message.into(),
        }
    }

    /// Warning hint
    #[inline]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: HintLevel::Warning,
            message: message.into(),
        }
    }

    /// Error hint
    #[inline]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: HintLevel::Error,
            message: message.into(),
        }
    }
}
