//! Step result store
//!
//! Single source of truth for what the user has accomplished. Every
//! mutation of [`WorkflowState`] goes through this narrow API; each write
//! returns a [`StepChange`] describing what happened so the controller can
//! notify its observers.

use crate::error::ValidationIssue;
use crate::fingerprint::Fingerprint;
use crate::state::WorkflowState;
use crate::step::{StepPatch, StepResult};
use crate::types::{Mode, StepId};
use std::collections::BTreeSet;

/// Outcome of a single [`StepResultStore::set_step`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepChange {
    /// Step that was written
    pub step: StepId,
    /// Completion predicate before the merge
    pub was_complete: bool,
    /// Completion predicate after the merge
    pub is_complete: bool,
    /// Fingerprint of a newly written analysis
    pub analysis: Option<Fingerprint>,
    /// Problems found in the merged payload (logged, not rejected)
    pub issues: Vec<ValidationIssue>,
}

impl StepChange {
    /// Whether the write flipped the completion predicate
    #[inline]
    #[must_use]
    pub fn completion_changed(&self) -> bool {
        self.was_complete != self.is_complete
    }
}

/// Owner of [`WorkflowState`]
#[derive(Debug, Clone, Default)]
pub struct StepResultStore {
    state: WorkflowState,
}

impl StepResultStore {
    /// Wrap existing state
    #[inline]
    #[must_use]
    pub fn new(state: WorkflowState) -> Self {
        Self { state }
    }

    /// Read-only view of the whole aggregate
    #[inline]
    #[must_use]
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Consume the store
    #[inline]
    #[must_use]
    pub fn into_state(self) -> WorkflowState {
        self.state
    }

    /// Snapshot of one step
    #[inline]
    #[must_use]
    pub fn get_step(&self, id: StepId) -> StepResult {
        self.state.steps.get(id)
    }

    /// Step-specific completion predicate
    #[inline]
    #[must_use]
    pub fn is_complete(&self, id: StepId) -> bool {
        self.state.steps.is_complete(id)
    }

    /// Merge a partial update into its step
    ///
    /// Writes are never rejected. Malformed payloads are merged as-is and the
    /// issues are logged and reported in the returned [`StepChange`]. A step
    /// whose predicate turns false also loses its completed mark.
    pub fn set_step(&mut self, patch: impl Into<StepPatch>) -> StepChange {
        let patch = patch.into();
        let step = patch.step_id();
        let analysis = patch.new_analysis().map(Fingerprint::of);
        let was_complete = self.state.steps.is_complete(step);

        patch.apply(&mut self.state.steps);

        let is_complete = self.state.steps.is_complete(step);
        if !is_complete {
            self.state.completed_steps.remove(&step);
        }

        let issues = self.state.steps.validate(step);
        for issue in &issues {
            tracing::warn!(step = %step, "merged malformed step data: {issue}");
        }
        tracing::debug!(step = %step, was_complete, is_complete, "step updated");

        StepChange {
            step,
            was_complete,
            is_complete,
            analysis,
            issues,
        }
    }

    /// Record that the user finished a step
    ///
    /// Returns `false` (and records nothing) if the step's predicate does not hold.
    pub fn mark_completed(&mut self, id: StepId) -> bool {
        if !self.state.steps.is_complete(id) {
            return false;
        }
        self.state.completed_steps.insert(id);
        if id == StepId::Posts && !self.state.onboarding_completed {
            tracing::info!("onboarding completed");
            self.state.onboarding_completed = true;
        }
        true
    }

    /// Move the cursor
    #[inline]
    pub fn set_current_step(&mut self, id: StepId) {
        self.state.current_step = id;
    }

    /// Switch the mode of the guided flow
    #[inline]
    pub fn set_mode(&mut self, mode: Mode) {
        self.state.mode = mode;
    }

    /// Union `sections` into the visible set, returning the newly revealed ones
    pub fn reveal(&mut self, sections: &BTreeSet<StepId>) -> Vec<StepId> {
        sections
            .iter()
            .copied()
            .filter(|id| self.state.visible_sections.insert(*id))
            .collect()
    }

    /// Record the fingerprint downstream results belong to
    #[inline]
    pub fn set_generation_fingerprint(&mut self, fingerprint: Option<Fingerprint>) {
        self.state.generation_fingerprint = fingerprint;
    }

    /// Drop results after `from`, keeping visible sections
    #[inline]
    pub fn invalidate_downstream(&mut self, from: StepId) {
        self.state.invalidate_downstream(from);
    }

    /// Explicit "start new analysis" reset
    #[inline]
    pub fn reset(&mut self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{AudiencePatch, HomePatch, PostsPatch};
    use crate::types::{AnalysisResult, Strategy, Topic};

    fn acme() -> AnalysisResult {
        AnalysisResult::new("Acme", "Devs", "APIs")
    }

    #[test]
    fn set_step_reports_completion() {
        let mut store = StepResultStore::default();
        let change = store.set_step(
            HomePatch::new()
                .analysis_completed(true)
                .website_analysis(acme()),
        );

        assert_eq!(change.step, StepId::Home);
        assert!(!change.was_complete);
        assert!(change.is_complete);
        assert!(change.completion_changed());
        assert_eq!(change.analysis, Some(Fingerprint::of(&acme())));
        assert!(change.issues.is_empty());
    }

    #[test]
    fn malformed_write_is_merged() {
        let mut store = StepResultStore::default();
        let change = store.set_step(HomePatch::new().analysis_completed(true));

        assert_eq!(change.issues, vec![ValidationIssue::CompletedWithoutAnalysis]);
        assert!(store.state().steps.home.analysis_completed);
        assert!(!store.is_complete(StepId::Home));
    }

    #[test]
    fn mark_completed_requires_predicate() {
        let mut store = StepResultStore::default();
        assert!(!store.mark_completed(StepId::Audience));
        assert!(store.state().completed_steps.is_empty());

        store.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));
        assert!(store.mark_completed(StepId::Audience));
        assert!(store.state().is_completed(StepId::Audience));
    }

    #[test]
    fn incomplete_write_clears_completed_mark() {
        let mut store = StepResultStore::default();
        store.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));
        store.mark_completed(StepId::Audience);

        store.set_step(AudiencePatch::new().clear_strategy());
        assert!(!store.state().is_completed(StepId::Audience));
    }

    #[test]
    fn completing_posts_sets_onboarding_flag() {
        let mut store = StepResultStore::default();
        store.set_step(PostsPatch::new().selected_topic(Topic::new("t1", "Hello")));
        assert!(store.mark_completed(StepId::Posts));
        assert!(store.state().onboarding_completed);
    }

    #[test]
    fn reveal_returns_new_sections_only() {
        let mut store = StepResultStore::default();
        let newly = store.reveal(&BTreeSet::from([StepId::Home, StepId::Audience]));
        assert_eq!(newly, vec![StepId::Audience]);

        let newly = store.reveal(&BTreeSet::from([StepId::Audience]));
        assert!(newly.is_empty());
    }
}
