//! Content API boundary
//!
//! The engine never talks HTTP itself. Everything it needs from the backend
//! goes through [`ContentApi`]; long-running generations come back as a
//! [`Submission::Job`] that the poller follows to completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use wayfinder_core::{AnalysisResult, Strategy, Topic, WorkflowError};

/// Opaque background job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Wrap an identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either an immediate result or a job to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<T> {
    /// Result returned inline
    Ready(T),
    /// Result will be available from the job
    Job(JobId),
}

/// Lifecycle of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued
    Pending,
    /// Running
    Running,
    /// Finished with a result
    Succeeded,
    /// Finished with an error
    Failed,
}

impl JobState {
    /// Whether polling should stop
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Response of the job-status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Lifecycle state
    pub status: JobState,
    /// Result payload once succeeded
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Completion percentage
    #[serde(default)]
    pub progress: Option<u8>,
    /// Failure detail
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatus {
    /// Job still running at `progress` percent
    #[must_use]
    pub fn running(progress: u8) -> Self {
        Self {
            status: JobState::Running,
            result: None,
            progress: Some(progress.min(100)),
            error: None,
        }
    }

    /// Job finished with `result`
    #[must_use]
    pub fn succeeded(result: serde_json::Value) -> Self {
        Self {
            status: JobState::Succeeded,
            result: Some(result),
            progress: Some(100),
            error: None,
        }
    }

    /// Job failed with `error`
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobState::Failed,
            result: None,
            progress: None,
            error: Some(error.into()),
        }
    }
}

/// Generated post body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// Post text
    pub content: String,
}

/// Generation credits of the current user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredits {
    /// Remaining credits
    pub available_credits: u32,
    /// Plan without a credit limit
    pub is_unlimited: bool,
}

impl UserCredits {
    /// Whether a generation may start
    #[inline]
    #[must_use]
    pub fn can_generate(&self) -> bool {
        self.is_unlimited || self.available_credits > 0
    }
}

/// Failure reported by a [`ContentApi`] implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Request did not reach the backend
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with an error status
    #[error("status {code}: {message}")]
    Status {
        /// HTTP-like status code
        code: u16,
        /// Backend message
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Convert into a network [`WorkflowError`] for `operation`
    #[must_use]
    pub fn into_workflow(self, operation: &'static str) -> WorkflowError {
        WorkflowError::network(operation, self.to_string())
    }
}

/// Backend operations the workflow depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Analyze a website
    async fn analyze_website(&self, url: &str) -> Result<Submission<AnalysisResult>, ApiError>;

    /// Suggest audience strategies for an analysis
    async fn generate_audiences(
        &self,
        analysis: &AnalysisResult,
    ) -> Result<Vec<Strategy>, ApiError>;

    /// Suggest topics for an analysis and strategy
    async fn generate_topics(
        &self,
        analysis: &AnalysisResult,
        strategy: &Strategy,
    ) -> Result<Vec<Topic>, ApiError>;

    /// Write a post for a topic
    async fn generate_content(
        &self,
        topic: &Topic,
        strategy: &Strategy,
    ) -> Result<Submission<GeneratedContent>, ApiError>;

    /// Status of a background job
    async fn job_status(&self, job_id: &JobId) -> Result<JobStatus, ApiError>;

    /// Credits of the current user
    async fn user_credits(&self) -> Result<UserCredits, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_parses_backend_shape() {
        let status: JobStatus = serde_json::from_str(
            r#"{"status": "running", "progress": 40}"#,
        )
        .unwrap();
        assert_eq!(status, JobStatus::running(40));
        assert!(!status.status.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn credits_gate_generation() {
        assert!(!UserCredits::default().can_generate());
        assert!(UserCredits {
            available_credits: 0,
            is_unlimited: true
        }
        .can_generate());
        assert!(UserCredits {
            available_credits: 2,
            is_unlimited: false
        }
        .can_generate());
    }

    #[test]
    fn api_errors_become_network_errors() {
        let err = ApiError::Status {
            code: 503,
            message: "busy".into(),
        }
        .into_workflow("generate-audiences");
        assert!(err.is_surfaced());
        assert!(err.to_string().contains("generate-audiences"));
    }
}
