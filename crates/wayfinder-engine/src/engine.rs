//! Workflow engine
//!
//! Owns the [`StepResultStore`] and wires the components together. Every
//! mutation runs the same pipeline:
//!
//! 1. write through the store (or the mode controller)
//! 2. on a new analysis, compare fingerprints and drop stale downstream data
//! 3. re-evaluate section visibility (union only)
//! 4. hand the state to the persister
//! 5. publish events
//!
//! The engine is synchronous and single-threaded; async callers wrap it in a
//! [`WorkflowSession`](crate::WorkflowSession).

use crate::auth::{AuthGate, AuthPhase};
use crate::config::EngineConfig;
use crate::events::{EventBus, WorkflowEvent};
use crate::mode::{Advance, Affordances, ModeController};
use crate::visibility::{Reachability, SectionVisibilityGate};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use wayfinder_core::{
    AuthContext, Fingerprint, Hint, Mode, PostsPatch, StepChange, StepId, StepPatch, StepResult,
    StepResultStore, WorkflowError, WorkflowState,
};
use wayfinder_persistence::{
    MemoryStorage, PersistenceBridge, Persister, StorageKey, StorageScope,
};

/// Action parked by the auth gate until the user signs in
pub struct PendingAction {
    label: String,
    run: Box<dyn FnOnce(&mut WorkflowEngine) + Send>,
}

impl PendingAction {
    /// Wrap `run` under a human-readable `label`
    pub fn new(
        label: impl Into<String>,
        run: impl FnOnce(&mut WorkflowEngine) + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    /// What the action does
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn run(self, engine: &mut WorkflowEngine) {
        (self.run)(engine);
    }
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Guided workflow engine
#[derive(Debug)]
pub struct WorkflowEngine {
    store: StepResultStore,
    modes: ModeController,
    gate: SectionVisibilityGate,
    auth: AuthGate<PendingAction>,
    authenticated: bool,
    bridge: Arc<PersistenceBridge>,
    persister: Arc<dyn Persister>,
    events: EventBus,
    hints: Vec<Hint>,
}

impl WorkflowEngine {
    /// Load the session behind `bridge`, or start a fresh one
    ///
    /// Writes go straight through `bridge` until
    /// [`with_persister`](Self::with_persister) installs another sink.
    #[must_use]
    pub fn new(config: &EngineConfig, bridge: Arc<PersistenceBridge>) -> Self {
        let state = bridge.rehydrate().unwrap_or_default();
        let persister: Arc<dyn Persister> = bridge.clone();
        let mut engine = Self {
            store: StepResultStore::new(state),
            modes: ModeController::new(),
            gate: SectionVisibilityGate::new(config.focus_unlock),
            auth: AuthGate::new(),
            authenticated: false,
            bridge,
            persister,
            events: EventBus::new(config.event_capacity),
            hints: Vec::new(),
        };
        if !engine.gate.reevaluate(&mut engine.store, false).is_empty() {
            engine.persister.persist(engine.store.state());
        }
        tracing::debug!(
            key = %engine.bridge.key(),
            step = %engine.store.state().current_step,
            mode = %engine.store.state().mode,
            "workflow engine ready"
        );
        engine
    }

    /// Engine over a private in-memory store
    #[must_use]
    pub fn in_memory(config: &EngineConfig) -> Self {
        let key = StorageKey::workflow(
            &config.storage_namespace,
            &StorageScope::Session("local".into()),
        );
        Self::new(
            config,
            Arc::new(PersistenceBridge::new(Arc::new(MemoryStorage::new()), key)),
        )
    }

    /// Replace the persistence sink
    #[must_use]
    pub fn with_persister(mut self, persister: Arc<dyn Persister>) -> Self {
        self.persister = persister;
        self
    }

    /// Publish on `events` instead of a private bus
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    // ------------------------------------------------------------------
    // Step results
    // ------------------------------------------------------------------

    /// Whole aggregate
    #[inline]
    #[must_use]
    pub fn state(&self) -> &WorkflowState {
        self.store.state()
    }

    /// Snapshot of one step
    #[inline]
    #[must_use]
    pub fn get_step(&self, id: StepId) -> StepResult {
        self.store.get_step(id)
    }

    /// Completion predicate of one step
    #[inline]
    #[must_use]
    pub fn is_complete(&self, id: StepId) -> bool {
        self.store.is_complete(id)
    }

    /// Merge a partial update
    pub fn set_step(&mut self, patch: impl Into<StepPatch>) -> StepChange {
        let before = self.store.state().analysis_fingerprint();
        let change = self.store.set_step(patch);
        self.after_write(&change, before);
        self.sync();
        change
    }

    fn after_write(&mut self, change: &StepChange, before: Option<Fingerprint>) {
        self.events.publish(WorkflowEvent::StepChanged {
            step: change.step,
            complete: change.is_complete,
        });
        if let Some(current) = change.analysis {
            self.track_fingerprint(current, before);
        }
    }

    /// Downstream results belong to the recorded generation fingerprint, or
    /// to the analysis present before the write when none was recorded
    fn track_fingerprint(&mut self, current: Fingerprint, before: Option<Fingerprint>) {
        match self.store.state().generation_fingerprint.or(before) {
            Some(previous) if previous == current => return,
            Some(previous) => {
                let stale = WorkflowError::StaleState {
                    expected: current,
                    actual: previous,
                };
                tracing::info!("{stale}; discarding downstream results");
                self.store.invalidate_downstream(StepId::Home);
                self.bridge.invalidate_cache();
                self.events
                    .publish(WorkflowEvent::Invalidated { previous, current });
            }
            None => {}
        }
        self.store.set_generation_fingerprint(Some(current));
    }

    fn sync(&mut self) {
        let revealed = self.gate.reevaluate(&mut self.store, self.authenticated);
        if !revealed.is_empty() {
            self.events
                .publish(WorkflowEvent::SectionsUnlocked { sections: revealed });
        }
        self.persister.persist(self.store.state());
    }

    // ------------------------------------------------------------------
    // Modes and navigation
    // ------------------------------------------------------------------

    /// Mode `section` renders in, `None` when it is not mounted
    #[must_use]
    pub fn get_mode(&self, section: StepId) -> Option<Mode> {
        self.modes.get_mode(self.store.state(), section)
    }

    /// Switch to workflow mode from `section`
    pub fn enter_workflow_mode(&mut self, section: StepId) -> bool {
        let changed = self.modes.enter_workflow_mode(&mut self.store, section);
        if changed {
            self.events.publish(WorkflowEvent::ModeChanged {
                mode: Mode::Workflow,
                section,
            });
        }
        self.sync();
        changed
    }

    /// Switch to focus mode from `section`
    ///
    /// Focus mode is for signed-in users; anonymous callers get a login
    /// prompt and the switch happens after authentication.
    pub fn exit_to_focus_mode(&mut self, section: StepId) -> bool {
        if !self.authenticated {
            self.require_auth(
                PendingAction::new("switch to focus mode", move |engine| {
                    engine.exit_to_focus_mode(section);
                }),
                AuthContext::Login,
            );
            return false;
        }
        let changed = self.modes.exit_to_focus_mode(&mut self.store, section);
        if changed {
            self.events.publish(WorkflowEvent::ModeChanged {
                mode: Mode::Focus,
                section,
            });
        }
        self.sync();
        changed
    }

    /// Commit `step_data` and advance, `None` when blocked or at the end
    ///
    /// In focus mode there is no sequence: supplied data is merged and the
    /// cursor stays put.
    pub fn continue_to_next_step(&mut self, step_data: Option<StepPatch>) -> Option<StepId> {
        if self.store.state().mode == Mode::Focus {
            if let Some(patch) = step_data {
                self.set_step(patch);
            }
            return None;
        }

        let before = self.store.state().analysis_fingerprint();
        match self.modes.continue_to_next_step(&mut self.store, step_data) {
            Advance::Blocked { step } => {
                self.hint(Hint::warning(format!(
                    "Complete the {step} step before continuing."
                )));
                None
            }
            Advance::Rejected { step, target } => {
                self.hint(Hint::warning(format!(
                    "Those {target} details cannot be saved from the {step} step."
                )));
                None
            }
            Advance::Finished { change, .. } => {
                if let Some(change) = &change {
                    self.after_write(change, before);
                }
                self.sync();
                None
            }
            Advance::Moved { from, to, change } => {
                if let Some(change) = &change {
                    self.after_write(change, before);
                }
                let revealed = self.store.reveal(&BTreeSet::from([to]));
                if !revealed.is_empty() {
                    self.events
                        .publish(WorkflowEvent::SectionsUnlocked { sections: revealed });
                }
                self.events.publish(WorkflowEvent::StepAdvanced { from, to });
                self.sync();
                Some(to)
            }
        }
    }

    /// Move back one section, `None` at the start or in focus mode
    pub fn go_to_previous_step(&mut self) -> Option<StepId> {
        if self.store.state().mode == Mode::Focus {
            return None;
        }
        let from = self.store.state().current_step;
        let to = self.modes.go_to_previous_step(&mut self.store)?;
        self.events.publish(WorkflowEvent::StepAdvanced { from, to });
        self.persister.persist(self.store.state());
        Some(to)
    }

    /// Jump to `section` if the current mode allows it
    ///
    /// Focus mode jumps to any visible section. Workflow mode only moves to
    /// an adjacent section: back at any time, forward once the current step
    /// is finished.
    pub fn navigate_to(&mut self, section: StepId) -> Option<StepId> {
        let state = self.store.state();
        let current = state.current_step;
        if section == current {
            return Some(section);
        }

        let allowed = match self.gate.reachability(state, section) {
            Reachability::Locked => {
                self.hint(Hint::warning(format!(
                    "The {section} step is not available yet."
                )));
                return None;
            }
            Reachability::Direct => true,
            Reachability::Sequential => {
                section.next() == Some(current)
                    || (current.next() == Some(section) && state.is_completed(current))
            }
        };
        if !allowed {
            self.hint(Hint::info("Use continue and back to move between steps."));
            return None;
        }

        self.store.set_current_step(section);
        self.events.publish(WorkflowEvent::StepAdvanced {
            from: current,
            to: section,
        });
        self.persister.persist(self.store.state());
        Some(section)
    }

    /// Controls `section` should render
    #[must_use]
    pub fn affordances(&self, section: StepId) -> Affordances {
        self.modes
            .affordances(self.store.state(), section, self.authenticated)
    }

    /// Mounted sections
    #[inline]
    #[must_use]
    pub fn visible_sections(&self) -> &BTreeSet<StepId> {
        &self.store.state().visible_sections
    }

    /// How `section` can be reached
    #[must_use]
    pub fn reachability(&self, section: StepId) -> Reachability {
        self.gate.reachability(self.store.state(), section)
    }

    /// Discard every result and start over from home
    ///
    /// The only operation that hides sections again.
    pub fn start_new_analysis(&mut self) {
        tracing::info!("starting new analysis");
        self.store.reset();
        self.bridge.invalidate_cache();
        self.events.publish(WorkflowEvent::Reset);
        self.sync();
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Whether the user is signed in
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Phase of the auth gate
    #[inline]
    #[must_use]
    pub fn auth_phase(&self) -> AuthPhase {
        self.auth.phase()
    }

    /// Dialog the UI should show, if an action is waiting
    #[inline]
    #[must_use]
    pub fn auth_prompt(&self) -> Option<AuthContext> {
        self.auth.pending_context()
    }

    /// Run `action` now if signed in, otherwise park it behind a `context` prompt
    ///
    /// Returns whether the action ran.
    pub fn require_auth(&mut self, action: PendingAction, context: AuthContext) -> bool {
        if self.authenticated {
            action.run(self);
            return true;
        }

        let label = action.label().to_string();
        match self.auth.require_auth(action, context) {
            Ok(Some(replaced)) => {
                tracing::info!(replaced = replaced.label(), with = %label, "pending action replaced");
            }
            Ok(None) => tracing::debug!(action = %label, %context, "action awaiting authentication"),
            Err(e) => {
                tracing::warn!(action = %label, "cannot park action: {e}");
                return false;
            }
        }

        self.events.publish(WorkflowEvent::AuthPrompt {
            context,
            action: label,
        });
        self.surface(WorkflowError::AuthRequired(context));
        false
    }

    /// Authentication succeeded: resume the parked action exactly once
    pub fn on_login_succeeded(&mut self) {
        self.authenticated = true;
        let resumed = match self.auth.begin_resume() {
            Ok(action) => {
                tracing::info!(action = action.label(), "resuming after authentication");
                action.run(self);
                self.auth.finish_resume();
                true
            }
            Err(_) => false,
        };
        self.events.publish(WorkflowEvent::AuthResolved { resumed });
        self.sync();
    }

    /// The user dismissed the auth dialog; the parked action is dropped
    pub fn cancel_auth(&mut self) -> bool {
        match self.auth.cancel() {
            Ok(action) => {
                tracing::debug!(action = action.label(), "auth cancelled");
                self.events
                    .publish(WorkflowEvent::AuthResolved { resumed: false });
                true
            }
            Err(_) => false,
        }
    }

    /// Forget the identity; visible sections stay mounted
    pub fn sign_out(&mut self) {
        self.authenticated = false;
        self.sync();
    }

    /// Save the selected topic's post to the account
    ///
    /// Anonymous users are asked to register first; the save runs once they
    /// have. Returns whether the post was saved now.
    pub fn save_post(&mut self) -> bool {
        let Some(topic) = self.store.state().steps.posts.selected_topic.clone() else {
            self.hint(Hint::warning("Select a topic before saving."));
            return false;
        };
        self.require_auth(
            PendingAction::new("save post", move |engine| {
                engine.set_step(PostsPatch::new().saved_topic(topic.id));
                engine.hint(Hint::info("Post saved."));
            }),
            AuthContext::Register,
        )
    }

    // ------------------------------------------------------------------
    // Events, hints, persistence
    // ------------------------------------------------------------------

    /// Subscribe to engine events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Bus the engine publishes on
    #[must_use]
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Queue a message for the user
    pub fn hint(&mut self, hint: Hint) {
        self.events.publish(WorkflowEvent::Hint(hint.clone()));
        self.hints.push(hint);
    }

    /// Route an error to the user when it is meant to be seen
    pub fn surface(&mut self, error: WorkflowError) {
        tracing::debug!("workflow error: {error}");
        if let Some(hint) = error.into_hint() {
            self.hint(hint);
        }
    }

    /// Drain queued hints
    pub fn take_hints(&mut self) -> Vec<Hint> {
        std::mem::take(&mut self.hints)
    }

    /// Bridge backing this engine
    #[inline]
    #[must_use]
    pub fn bridge(&self) -> &Arc<PersistenceBridge> {
        &self.bridge
    }

    /// Persist the current state outside the mutation pipeline
    pub fn persist_now(&self) {
        self.persister.persist(self.store.state());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wayfinder_core::{AnalysisResult, AudiencePatch, HomePatch, Strategy, Topic};

    fn engine() -> WorkflowEngine {
        WorkflowEngine::in_memory(&EngineConfig::default())
    }

    fn home(analysis: AnalysisResult) -> HomePatch {
        HomePatch::new()
            .analysis_completed(true)
            .website_analysis(analysis)
    }

    #[test]
    fn fresh_engine_shows_home_only() {
        let engine = engine();
        assert_eq!(engine.visible_sections(), &BTreeSet::from([StepId::Home]));
        assert_eq!(engine.get_mode(StepId::Home), Some(Mode::Workflow));
        assert_eq!(engine.auth_phase(), AuthPhase::Idle);
    }

    #[test]
    fn completing_home_unlocks_audience() {
        let mut engine = engine();
        let mut events = engine.subscribe();

        engine.set_step(home(AnalysisResult::new("Acme", "Devs", "APIs")));
        assert!(engine.state().is_visible(StepId::Audience));
        assert!(engine.state().generation_fingerprint.is_some());

        assert!(matches!(
            events.try_recv().unwrap(),
            WorkflowEvent::StepChanged {
                step: StepId::Home,
                complete: true
            }
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            WorkflowEvent::SectionsUnlocked {
                sections: vec![StepId::Audience]
            }
        );
    }

    #[test]
    fn blocked_continue_leaves_a_hint() {
        let mut engine = engine();
        let before = engine.state().clone();

        assert_eq!(engine.continue_to_next_step(None), None);
        assert_eq!(engine.state(), &before);
        let hints = engine.take_hints();
        assert_eq!(hints.len(), 1);
        assert!(engine.take_hints().is_empty());
    }

    #[test]
    fn new_analysis_invalidates_strategy() {
        let mut engine = engine();
        engine.set_step(home(AnalysisResult::new("Acme", "Devs", "APIs")));
        engine.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));
        assert!(engine.is_complete(StepId::Audience));

        let mut events = engine.subscribe();
        engine.set_step(home(AnalysisResult::new("Globex", "Ops", "Infra")));

        assert!(!engine.is_complete(StepId::Audience));
        assert!(engine.state().is_visible(StepId::Posts));
        assert!(std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| matches!(e, WorkflowEvent::Invalidated { .. })));
    }

    #[test]
    fn same_analysis_keeps_downstream() {
        let mut engine = engine();
        let analysis = AnalysisResult::new("Acme", "Devs", "APIs");
        engine.set_step(home(analysis.clone()));
        engine.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));

        engine.set_step(home(analysis));
        assert!(engine.is_complete(StepId::Audience));
    }

    #[test]
    fn save_post_waits_for_registration() {
        let mut engine = engine();
        engine.set_step(PostsPatch::new().selected_topic(Topic::new("t1", "Launch notes")));

        assert!(!engine.save_post());
        assert_eq!(engine.auth_prompt(), Some(AuthContext::Register));
        assert!(engine.state().steps.posts.saved_topic_ids.is_empty());

        engine.on_login_succeeded();
        assert_eq!(engine.state().steps.posts.saved_topic_ids, vec!["t1".to_string()]);
        assert_eq!(engine.auth_phase(), AuthPhase::Idle);

        // Nothing left to resume
        engine.on_login_succeeded();
        assert_eq!(engine.state().steps.posts.saved_topic_ids.len(), 1);
    }

    #[test]
    fn cancelled_auth_drops_action() {
        let mut engine = engine();
        engine.set_step(PostsPatch::new().selected_topic(Topic::new("t1", "Launch notes")));
        engine.save_post();

        assert!(engine.cancel_auth());
        engine.on_login_succeeded();
        assert!(engine.state().steps.posts.saved_topic_ids.is_empty());
    }

    #[test]
    fn focus_switch_requires_login() {
        let mut engine = engine();
        assert!(!engine.exit_to_focus_mode(StepId::Home));
        assert_eq!(engine.get_mode(StepId::Home), Some(Mode::Workflow));
        assert_eq!(engine.auth_prompt(), Some(AuthContext::Login));

        engine.on_login_succeeded();
        assert_eq!(engine.get_mode(StepId::Home), Some(Mode::Focus));
    }

    #[test]
    fn workflow_navigation_is_adjacent_only() {
        let mut engine = engine();
        engine.set_step(home(AnalysisResult::new("Acme", "Devs", "APIs")));
        engine.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));
        assert!(engine.state().is_visible(StepId::Posts));

        assert_eq!(engine.navigate_to(StepId::Posts), None);
        assert_eq!(engine.continue_to_next_step(None), Some(StepId::Audience));
        assert_eq!(engine.navigate_to(StepId::Home), Some(StepId::Home));
        assert_eq!(engine.navigate_to(StepId::Audience), Some(StepId::Audience));
    }

    #[test]
    fn start_new_analysis_resets_visibility() {
        let mut engine = engine();
        engine.set_step(home(AnalysisResult::new("Acme", "Devs", "APIs")));
        engine.continue_to_next_step(None);

        engine.start_new_analysis();
        assert_eq!(engine.visible_sections(), &BTreeSet::from([StepId::Home]));
        assert_eq!(engine.state().current_step, StepId::Home);
        assert!(engine.state().generation_fingerprint.is_none());
    }

    #[test]
    fn state_survives_reload() {
        let config = EngineConfig::default();
        let mut engine = WorkflowEngine::in_memory(&config);
        engine.set_step(home(AnalysisResult::new("Acme", "Devs", "APIs")));
        engine.continue_to_next_step(None);

        let reloaded = WorkflowEngine::new(&config, engine.bridge().clone());
        assert_eq!(reloaded.state(), engine.state());
    }

    #[test]
    fn new_analysis_invalidates_results_without_recorded_fingerprint() {
        let key = StorageKey::workflow("wayfinder", &StorageScope::Session("legacy".into()));
        let bridge = Arc::new(PersistenceBridge::new(Arc::new(MemoryStorage::new()), key));

        let mut legacy = WorkflowState::default();
        StepPatch::from(home(AnalysisResult::new("Acme", "Devs", "APIs"))).apply(&mut legacy.steps);
        StepPatch::from(AudiencePatch::new().customer_strategy(Strategy::new("s1")))
            .apply(&mut legacy.steps);
        legacy.completed_steps.insert(StepId::Audience);
        assert!(legacy.generation_fingerprint.is_none());
        bridge.try_persist(&legacy).unwrap();

        let mut engine = WorkflowEngine::new(&EngineConfig::default(), bridge);
        engine.set_step(home(AnalysisResult::new("Globex", "Ops", "Infra")));

        assert!(engine.state().steps.audience.customer_strategy.is_none());
        assert!(!engine.state().is_completed(StepId::Audience));
        assert_eq!(
            engine.state().generation_fingerprint,
            engine.state().analysis_fingerprint()
        );
    }

    #[test]
    fn same_analysis_without_recorded_fingerprint_keeps_results() {
        let mut engine = engine();
        engine.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));
        engine.set_step(home(AnalysisResult::new("Acme", "Devs", "APIs")));

        assert!(engine.state().steps.audience.customer_strategy.is_some());
    }
}
