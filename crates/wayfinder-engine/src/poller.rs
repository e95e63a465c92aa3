//! Background job polling
//!
//! Follows a [`JobId`] until it reaches a terminal status. Polling stops as
//! soon as the owning view is torn down: a cancelled [`CancelToken`] ends
//! the loop between requests, and a result that arrives after cancellation
//! is discarded rather than merged.

use crate::api::{ContentApi, JobId, JobState};
use crate::events::{EventBus, WorkflowEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wayfinder_core::WorkflowError;

/// Cooperative cancellation flag shared by clones
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Fresh, uncancelled token
    #[must_use]
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    /// Cancel every holder of this token
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) was called
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Guard that cancels this token when dropped
    #[must_use]
    pub fn drop_guard(&self) -> PollGuard {
        PollGuard {
            token: self.clone(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its token on drop
#[derive(Debug)]
pub struct PollGuard {
    token: CancelToken,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Job poller
#[derive(Debug, Clone)]
pub struct JobPoller {
    interval: Duration,
    max_attempts: Option<u32>,
    events: Option<EventBus>,
}

impl JobPoller {
    /// Poll every `interval`
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            events: None,
        }
    }

    /// Give up after `attempts` status requests
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Publish [`WorkflowEvent::JobProgress`] on `events`
    #[inline]
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Poll `job_id` until it finishes
    ///
    /// # Errors
    /// - [`WorkflowError::Cancelled`] once `cancel` fires
    /// - [`WorkflowError::JobFailed`] when the job reports failure
    /// - [`WorkflowError::Network`] on request failure or when the attempt
    ///   limit is reached
    pub async fn poll(
        &self,
        api: &dyn ContentApi,
        job_id: &JobId,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            attempts += 1;

            let status = api
                .job_status(job_id)
                .await
                .map_err(|e| e.into_workflow("job-status"))?;
            if cancel.is_cancelled() {
                tracing::debug!(%job_id, "discarding job status after cancellation");
                return Err(WorkflowError::Cancelled);
            }

            if let Some(events) = &self.events {
                events.publish(WorkflowEvent::JobProgress {
                    job_id: job_id.to_string(),
                    progress: status.progress,
                });
            }
            tracing::trace!(%job_id, attempts, status = ?status.status, "job polled");

            match status.status {
                JobState::Succeeded => {
                    return Ok(status.result.unwrap_or(serde_json::Value::Null));
                }
                JobState::Failed => {
                    return Err(WorkflowError::JobFailed {
                        job_id: job_id.to_string(),
                        message: status.error.unwrap_or_else(|| "unknown error".into()),
                    });
                }
                JobState::Pending | JobState::Running => {}
            }

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(WorkflowError::network(
                    "job-status",
                    format!("job {job_id} did not finish after {attempts} attempts"),
                ));
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, JobStatus, MockContentApi};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn poller() -> JobPoller {
        JobPoller::new(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn polls_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut api = MockContentApi::new();
        api.expect_job_status().times(3).returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(if n < 2 {
                JobStatus::running(u8::try_from(n * 40).unwrap_or(100))
            } else {
                JobStatus::succeeded(serde_json::json!({"content": "hello"}))
            })
        });

        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let result = poller()
            .with_events(events)
            .poll(&api, &JobId::new("j1"), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result["content"], "hello");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            rx.try_recv().unwrap(),
            WorkflowEvent::JobProgress { progress: Some(0), .. }
        ));
    }

    #[tokio::test]
    async fn failed_job_is_reported() {
        let mut api = MockContentApi::new();
        api.expect_job_status()
            .returning(|_| Ok(JobStatus::failed("model overloaded")));

        let err = poller()
            .poll(&api, &JobId::new("j2"), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::JobFailed { ref message, .. } if message == "model overloaded"));
        assert!(err.is_surfaced());
    }

    #[tokio::test]
    async fn transport_error_is_network_error() {
        let mut api = MockContentApi::new();
        api.expect_job_status()
            .returning(|_| Err(ApiError::Transport("connection reset".into())));

        let err = poller()
            .poll(&api, &JobId::new("j3"), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Network { operation: "job-status", .. }));
    }

    #[tokio::test]
    async fn attempt_limit_stops_polling() {
        let mut api = MockContentApi::new();
        api.expect_job_status()
            .times(2)
            .returning(|_| Ok(JobStatus::running(10)));

        let err = poller()
            .with_max_attempts(Some(2))
            .poll(&api, &JobId::new("j4"), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Network { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_request() {
        let api = MockContentApi::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = poller()
            .poll(&api, &JobId::new("j5"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled));
    }

    #[tokio::test]
    async fn dropping_guard_cancels_sleeping_poll() {
        let mut api = MockContentApi::new();
        api.expect_job_status()
            .returning(|_| Ok(JobStatus::running(50)));

        let cancel = CancelToken::new();
        let guard = cancel.drop_guard();
        let slow = JobPoller::new(Duration::from_secs(60));

        let job_id = JobId::new("j6");
        let poll = slow.poll(&api, &job_id, &cancel);
        let teardown = async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        };
        let (result, ()) = tokio::join!(poll, teardown);
        assert!(matches!(result, Err(WorkflowError::Cancelled)));
    }
}
