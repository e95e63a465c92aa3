//! Async workflow session
//!
//! Glues the synchronous [`WorkflowEngine`] to the [`ContentApi`]. Each
//! operation snapshots what it needs under the engine lock, releases it for
//! the network round trip, and re-checks the analysis fingerprint before
//! merging the result. Results that belong to an analysis the user has
//! since replaced are dropped.

use crate::api::{ContentApi, GeneratedContent, Submission};
use crate::config::EngineConfig;
use crate::credits::{CreditGuard, GenerateGate};
use crate::engine::WorkflowEngine;
use crate::events::WorkflowEvent;
use crate::poller::{CancelToken, JobPoller};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;
use wayfinder_core::{
    AnalysisResult, AudiencePatch, Fingerprint, Hint, HomePatch, PostsPatch, Strategy, Topic,
    WorkflowError,
};
use wayfinder_persistence::{
    BackgroundPersister, PersistenceBridge, StorageBackend, StorageKey, StorageScope,
};

/// One user's guided workflow
pub struct WorkflowSession {
    engine: Arc<Mutex<WorkflowEngine>>,
    api: Arc<dyn ContentApi>,
    poller: JobPoller,
    credits: CreditGuard,
    cancel: CancelToken,
    background: Option<Arc<BackgroundPersister>>,
}

impl WorkflowSession {
    /// Open the session stored under `scope`
    ///
    /// With background persistence enabled this spawns the writer task, so
    /// it must run inside a tokio runtime.
    #[must_use]
    pub fn open(
        config: &EngineConfig,
        backend: Arc<dyn StorageBackend>,
        scope: &StorageScope,
        api: Arc<dyn ContentApi>,
    ) -> Self {
        let key = StorageKey::workflow(&config.storage_namespace, scope);
        let bridge = Arc::new(PersistenceBridge::new(backend, key));
        let engine = WorkflowEngine::new(config, bridge.clone());

        let (engine, background) = if config.persist_in_background {
            let persister = Arc::new(BackgroundPersister::spawn(bridge));
            (engine.with_persister(persister.clone()), Some(persister))
        } else {
            (engine, None)
        };

        let poller = JobPoller::new(config.poll_interval())
            .with_max_attempts(config.max_poll_attempts)
            .with_events(engine.events());

        tracing::info!(%scope, background = background.is_some(), "workflow session opened");
        Self {
            engine: Arc::new(Mutex::new(engine)),
            api,
            poller,
            credits: CreditGuard,
            cancel: CancelToken::new(),
            background,
        }
    }

    /// Scope for a visitor without an account
    #[must_use]
    pub fn anonymous_scope() -> StorageScope {
        StorageScope::Session(Uuid::new_v4().to_string())
    }

    /// Shared handle to the engine
    #[must_use]
    pub fn engine(&self) -> Arc<Mutex<WorkflowEngine>> {
        self.engine.clone()
    }

    /// Run `f` with the engine locked
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut WorkflowEngine) -> R) -> R {
        f(&mut self.engine.lock())
    }

    /// Subscribe to engine and job events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.engine.lock().subscribe()
    }

    /// Token cancelled on teardown
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Stop in-flight polls; late results are discarded
    pub fn teardown(&self) {
        tracing::debug!("workflow session torn down");
        self.cancel.cancel();
    }

    /// Wait for background writes to land
    pub async fn flush(&self) {
        if let Some(background) = &self.background {
            background.flush().await;
        }
    }

    async fn resolve<T: DeserializeOwned>(
        &self,
        submission: Submission<T>,
    ) -> Result<T, WorkflowError> {
        match submission {
            Submission::Ready(value) => Ok(value),
            Submission::Job(job_id) => {
                let value = self
                    .poller
                    .poll(self.api.as_ref(), &job_id, &self.cancel)
                    .await?;
                serde_json::from_value(value)
                    .map_err(|e| WorkflowError::network("job-result", e.to_string()))
            }
        }
    }

    fn report(&self, error: WorkflowError) {
        if matches!(error, WorkflowError::Cancelled) {
            tracing::debug!("operation cancelled by teardown");
            return;
        }
        self.with_engine(|engine| engine.surface(error));
    }

    fn hint(&self, hint: Hint) {
        self.with_engine(|engine| engine.hint(hint));
    }

    /// Discard a result generated for `actual` when the session moved on
    fn is_current(engine: &WorkflowEngine, actual: Fingerprint) -> bool {
        match engine.state().analysis_fingerprint() {
            Some(expected) if expected == actual => true,
            Some(expected) => {
                tracing::info!(
                    "{}; dropping late result",
                    WorkflowError::StaleState { expected, actual }
                );
                false
            }
            None => {
                tracing::info!(actual = %actual.short(), "analysis cleared; dropping late result");
                false
            }
        }
    }

    /// Analyze `url` and record the result on home
    pub async fn analyze_website(&self, url: &str) -> Option<AnalysisResult> {
        let result = match self.api.analyze_website(url).await {
            Ok(submission) => self.resolve(submission).await,
            Err(e) => Err(e.into_workflow("analyze-website")),
        };
        let mut analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => {
                self.report(e);
                return None;
            }
        };
        if self.cancel.is_cancelled() {
            return None;
        }

        if analysis.website_url.is_none() {
            analysis.website_url = Some(url.to_string());
        }
        self.with_engine(|engine| {
            engine.set_step(
                HomePatch::new()
                    .analysis_completed(true)
                    .website_analysis(analysis.clone()),
            );
        });
        Some(analysis)
    }

    /// Audience strategies for the current analysis
    ///
    /// Served from the strategy cache while the analysis is unchanged.
    pub async fn generate_audiences(&self) -> Vec<Strategy> {
        let snapshot = self.with_engine(|engine| {
            let analysis = engine.state().steps.home.website_analysis.clone()?;
            Some((Fingerprint::of(&analysis), analysis, engine.bridge().clone()))
        });
        let Some((fingerprint, analysis, bridge)) = snapshot else {
            self.hint(Hint::warning("Analyze a website first."));
            return Vec::new();
        };

        if let Some(cached) = bridge.cached_strategies(&fingerprint) {
            tracing::debug!(fingerprint = %fingerprint.short(), "strategies served from cache");
            return cached;
        }

        let strategies = match self.api.generate_audiences(&analysis).await {
            Ok(strategies) => strategies,
            Err(e) => {
                self.report(e.into_workflow("generate-audiences"));
                return Vec::new();
            }
        };
        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        let fresh = self.with_engine(|engine| {
            if !Self::is_current(engine, fingerprint) {
                return false;
            }
            engine
                .bridge()
                .cache_strategies(fingerprint, strategies.clone());
            engine.persist_now();
            true
        });
        if fresh {
            strategies
        } else {
            Vec::new()
        }
    }

    /// Pick a strategy
    pub fn select_strategy(&self, strategy: Strategy) {
        self.with_engine(|engine| {
            engine.set_step(AudiencePatch::new().customer_strategy(strategy));
        });
    }

    /// Topics for the current analysis and strategy
    pub async fn generate_topics(&self) -> Vec<Topic> {
        let snapshot = self.with_engine(|engine| {
            let steps = &engine.state().steps;
            let analysis = steps.home.website_analysis.clone()?;
            let strategy = steps.audience.customer_strategy.clone()?;
            Some((Fingerprint::of(&analysis), analysis, strategy))
        });
        let Some((fingerprint, analysis, strategy)) = snapshot else {
            self.hint(Hint::warning("Pick an audience strategy first."));
            return Vec::new();
        };

        let topics = match self.api.generate_topics(&analysis, &strategy).await {
            Ok(topics) => topics,
            Err(e) => {
                self.report(e.into_workflow("generate-topics"));
                return Vec::new();
            }
        };
        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        self.with_engine(|engine| {
            let same_strategy = engine
                .state()
                .steps
                .audience
                .customer_strategy
                .as_ref()
                .is_some_and(|s| s.id == strategy.id);
            if !Self::is_current(engine, fingerprint) || !same_strategy {
                return Vec::new();
            }
            engine.set_step(PostsPatch::new().generated_topics(topics.clone()));
            topics
        })
    }

    /// Pick a topic
    pub fn select_topic(&self, topic: Topic) {
        self.with_engine(|engine| {
            engine.set_step(PostsPatch::new().selected_topic(topic));
        });
    }

    /// Write the post for the selected topic
    ///
    /// Checks credits first; an empty balance shows the paywall hint.
    pub async fn generate_content(&self) -> Option<String> {
        let snapshot = self.with_engine(|engine| {
            let steps = &engine.state().steps;
            let analysis = steps.home.website_analysis.as_ref()?;
            Some((
                Fingerprint::of(analysis),
                steps.posts.selected_topic.clone()?,
                steps.audience.customer_strategy.clone()?,
            ))
        });
        let Some((fingerprint, topic, strategy)) = snapshot else {
            self.hint(Hint::warning("Select a topic first."));
            return None;
        };

        if self.credits.check(self.api.as_ref()).await == GenerateGate::Paywall {
            self.hint(Hint::warning(
                "You are out of credits. Upgrade your plan to keep generating posts.",
            ));
            return None;
        }

        let result = match self.api.generate_content(&topic, &strategy).await {
            Ok(submission) => self.resolve::<GeneratedContent>(submission).await,
            Err(e) => Err(e.into_workflow("generate-content")),
        };
        let generated = match result {
            Ok(generated) => generated,
            Err(e) => {
                self.report(e);
                return None;
            }
        };
        if self.cancel.is_cancelled() {
            return None;
        }

        self.with_engine(|engine| {
            let same_topic = engine
                .state()
                .steps
                .posts
                .selected_topic
                .as_ref()
                .is_some_and(|t| t.id == topic.id);
            if !Self::is_current(engine, fingerprint) || !same_topic {
                return None;
            }
            engine.set_step(PostsPatch::new().generated_content(generated.content.clone()));
            Some(generated.content)
        })
    }

    /// Save the selected post, asking anonymous users to register first
    pub fn save_post(&self) -> bool {
        self.with_engine(WorkflowEngine::save_post)
    }

    /// Authentication finished; resumes a parked action
    pub fn on_login_succeeded(&self) {
        self.with_engine(WorkflowEngine::on_login_succeeded);
    }
}

impl fmt::Debug for WorkflowSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowSession")
            .field("engine", &self.engine)
            .field("poller", &self.poller)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Drop for WorkflowSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
