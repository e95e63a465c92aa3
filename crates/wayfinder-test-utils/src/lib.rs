//! Testing utilities for the wayfinder workspace
//!
//! Shared fixtures and a scriptable [`FakeContentApi`].

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use wayfinder_core::{AnalysisResult, HomePatch, Strategy, StrategyPricing, Topic};
use wayfinder_engine::{
    ApiError, ContentApi, EngineConfig, GeneratedContent, JobId, JobStatus, Submission,
    UserCredits, WorkflowEngine,
};
use wayfinder_persistence::{MemoryStorage, StorageBackend, StorageScope};

// ----------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------

pub fn acme_analysis() -> AnalysisResult {
    AnalysisResult::new("Acme Tools", "Small workshops", "Power tool guides")
        .with_url("https://acme.example")
}

pub fn globex_analysis() -> AnalysisResult {
    AnalysisResult::new("Globex", "Platform teams", "Infrastructure automation")
        .with_url("https://globex.example")
}

pub fn strategies() -> Vec<Strategy> {
    vec![
        Strategy::new("hobbyists")
            .with_name("Weekend hobbyists")
            .with_segment("DIY"),
        Strategy {
            pricing: Some(StrategyPricing {
                monthly_cents: 4900,
                posts_per_month: 8,
            }),
            ..Strategy::new("pros")
                .with_name("Trade professionals")
                .with_segment("B2B")
        },
    ]
}

pub fn topics() -> Vec<Topic> {
    vec![
        Topic::new("t-sharpening", "Keeping chisels sharp"),
        Topic::new("t-dust", "Dust extraction on a budget"),
    ]
}

pub fn complete_home(analysis: AnalysisResult) -> HomePatch {
    HomePatch::new()
        .analysis_completed(true)
        .website_analysis(analysis)
}

/// Config with fast polling and inline persistence
pub fn test_config() -> EngineConfig {
    EngineConfig::new()
        .with_poll_interval(Duration::from_millis(5))
        .with_max_poll_attempts(50)
        .with_background_persistence(false)
}

pub fn memory_backend() -> Arc<dyn StorageBackend> {
    Arc::new(MemoryStorage::new())
}

pub fn session_scope(name: &str) -> StorageScope {
    StorageScope::Session(name.to_string())
}

/// Engine whose home step holds [`acme_analysis`]
pub fn analyzed_engine() -> WorkflowEngine {
    let mut engine = WorkflowEngine::in_memory(&test_config());
    engine.set_step(complete_home(acme_analysis()));
    engine
}

// ----------------------------------------------------------------------
// Fake content API
// ----------------------------------------------------------------------

/// Operation names accepted by [`FakeContentApi::failing`] and friends
pub mod ops {
    pub const ANALYZE: &str = "analyze-website";
    pub const AUDIENCES: &str = "generate-audiences";
    pub const TOPICS: &str = "generate-topics";
    pub const CONTENT: &str = "generate-content";
    pub const JOB_STATUS: &str = "job-status";
    pub const CREDITS: &str = "user-credits";
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct FakeState {
    analysis: Option<AnalysisResult>,
    analysis_polls: Option<u32>,
    strategies: Vec<Strategy>,
    topics: Vec<Topic>,
    content: String,
    content_polls: Option<u32>,
    failing_jobs: bool,
    credits: UserCredits,
    failing: HashSet<&'static str>,
    hooks: HashMap<&'static str, Hook>,
    calls: HashMap<&'static str, usize>,
    jobs: HashMap<String, (u32, serde_json::Value)>,
    next_job: u32,
}

/// In-memory [`ContentApi`] with scripted responses
pub struct FakeContentApi {
    state: Mutex<FakeState>,
}

impl FakeContentApi {
    /// Answers every call inline with the fixtures above
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                analysis: Some(acme_analysis()),
                strategies: strategies(),
                topics: topics(),
                content: "Sharp chisels cut cleaner and safer.".to_string(),
                credits: UserCredits {
                    available_credits: 3,
                    is_unlimited: false,
                },
                ..FakeState::default()
            }),
        }
    }

    pub fn with_analysis(self, analysis: AnalysisResult) -> Self {
        self.state.lock().analysis = Some(analysis);
        self
    }

    /// Return the analysis as a job finishing after `polls` running statuses
    pub fn analysis_via_job(self, polls: u32) -> Self {
        self.state.lock().analysis_polls = Some(polls);
        self
    }

    /// Return content as a job finishing after `polls` running statuses
    pub fn content_via_job(self, polls: u32) -> Self {
        self.state.lock().content_polls = Some(polls);
        self
    }

    /// Jobs finish with a failure status
    pub fn failing_jobs(self) -> Self {
        self.state.lock().failing_jobs = true;
        self
    }

    pub fn with_credits(self, credits: UserCredits) -> Self {
        self.state.lock().credits = credits;
        self
    }

    /// `operation` answers with a 503
    pub fn failing(self, operation: &'static str) -> Self {
        self.state.lock().failing.insert(operation);
        self
    }

    /// Run `hook` while `operation` is in flight
    pub fn on_call(self, operation: &'static str, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.state.lock().hooks.insert(operation, Arc::new(hook));
        self
    }

    /// Number of calls to `operation`
    pub fn calls(&self, operation: &'static str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn enter(&self, operation: &'static str) -> Result<(), ApiError> {
        let hook = {
            let mut state = self.state.lock();
            *state.calls.entry(operation).or_default() += 1;
            if state.failing.contains(operation) {
                return Err(ApiError::Status {
                    code: 503,
                    message: format!("{operation} unavailable"),
                });
            }
            state.hooks.get(operation).cloned()
        };
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    fn submit<T: serde::Serialize>(
        &self,
        value: T,
        polls: Option<u32>,
    ) -> Result<Submission<T>, ApiError> {
        let Some(polls) = polls else {
            return Ok(Submission::Ready(value));
        };
        let payload = serde_json::to_value(&value).map_err(|e| ApiError::Decode(e.to_string()))?;
        let mut state = self.state.lock();
        state.next_job += 1;
        let id = format!("job-{}", state.next_job);
        state.jobs.insert(id.clone(), (polls, payload));
        Ok(Submission::Job(JobId::new(id)))
    }
}

impl Default for FakeContentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FakeContentApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeContentApi")
            .field("calls", &self.state.lock().calls)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ContentApi for FakeContentApi {
    async fn analyze_website(&self, url: &str) -> Result<Submission<AnalysisResult>, ApiError> {
        self.enter(ops::ANALYZE)?;
        let (analysis, polls) = {
            let state = self.state.lock();
            (state.analysis.clone(), state.analysis_polls)
        };
        let analysis =
            analysis.ok_or_else(|| ApiError::Decode(format!("no analysis scripted for {url}")))?;
        self.submit(analysis, polls)
    }

    async fn generate_audiences(
        &self,
        _analysis: &AnalysisResult,
    ) -> Result<Vec<Strategy>, ApiError> {
        self.enter(ops::AUDIENCES)?;
        Ok(self.state.lock().strategies.clone())
    }

    async fn generate_topics(
        &self,
        _analysis: &AnalysisResult,
        _strategy: &Strategy,
    ) -> Result<Vec<Topic>, ApiError> {
        self.enter(ops::TOPICS)?;
        Ok(self.state.lock().topics.clone())
    }

    async fn generate_content(
        &self,
        _topic: &Topic,
        _strategy: &Strategy,
    ) -> Result<Submission<GeneratedContent>, ApiError> {
        self.enter(ops::CONTENT)?;
        let (content, polls) = {
            let state = self.state.lock();
            (state.content.clone(), state.content_polls)
        };
        self.submit(GeneratedContent { content }, polls)
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatus, ApiError> {
        self.enter(ops::JOB_STATUS)?;
        let mut state = self.state.lock();
        let failing = state.failing_jobs;
        let Some((remaining, payload)) = state.jobs.get_mut(job_id.as_str()) else {
            return Err(ApiError::Status {
                code: 404,
                message: format!("unknown job {job_id}"),
            });
        };
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(JobStatus::running(50));
        }
        Ok(if failing {
            JobStatus::failed("generation failed")
        } else {
            JobStatus::succeeded(payload.clone())
        })
    }

    async fn user_credits(&self) -> Result<UserCredits, ApiError> {
        self.enter(ops::CREDITS)?;
        Ok(self.state.lock().credits)
    }
}
