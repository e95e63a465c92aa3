//! The per-session root aggregate

use crate::fingerprint::Fingerprint;
use crate::step::Steps;
use crate::types::{Mode, StepId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything the guided flow knows about a session
///
/// Created on first load (rehydrated or empty) and mutated only through
/// [`StepResultStore`](crate::StepResultStore). `visible_sections` only grows,
/// except through [`WorkflowState::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    /// Per-step results
    pub steps: Steps,
    /// Mode of the guided flow
    pub mode: Mode,
    /// Section the user is on
    pub current_step: StepId,
    /// Sections currently mounted, in flow order
    pub visible_sections: BTreeSet<StepId>,
    /// Sections the user has finished
    pub completed_steps: BTreeSet<StepId>,
    /// Fingerprint of the analysis downstream results were generated from
    pub generation_fingerprint: Option<Fingerprint>,
    /// User finished the whole flow at least once
    pub onboarding_completed: bool,
}

impl WorkflowState {
    /// Fresh session state
    ///
    /// The mode defaults to focus for users who completed onboarding before.
    #[must_use]
    pub fn new_session(onboarding_completed: bool) -> Self {
        Self {
            steps: Steps::default(),
            mode: Mode::default_for(onboarding_completed),
            current_step: StepId::Home,
            visible_sections: BTreeSet::from([StepId::Home]),
            completed_steps: BTreeSet::new(),
            generation_fingerprint: None,
            onboarding_completed,
        }
    }

    /// Whether a section is mounted
    #[inline]
    #[must_use]
    pub fn is_visible(&self, id: StepId) -> bool {
        self.visible_sections.contains(&id)
    }

    /// Whether the user finished a section
    #[inline]
    #[must_use]
    pub fn is_completed(&self, id: StepId) -> bool {
        self.completed_steps.contains(&id)
    }

    /// Fingerprint of the current analysis, if any
    #[must_use]
    pub fn analysis_fingerprint(&self) -> Option<Fingerprint> {
        self.steps.home.website_analysis.as_ref().map(Fingerprint::of)
    }

    /// Drop results of every step after `from`
    ///
    /// Visible sections are left alone so the UI does not collapse mid-session.
    pub fn invalidate_downstream(&mut self, from: StepId) {
        for id in from.downstream() {
            self.steps.clear(*id);
            self.completed_steps.remove(id);
        }
    }

    /// Explicit "start new analysis" reset
    pub fn reset(&mut self) {
        self.steps = Steps::default();
        self.completed_steps.clear();
        self.visible_sections = BTreeSet::from([StepId::Home]);
        self.current_step = StepId::Home;
        self.generation_fingerprint = None;
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new_session(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{AudiencePatch, HomePatch, StepPatch};
    use crate::types::{AnalysisResult, Strategy};

    fn populated() -> WorkflowState {
        let mut state = WorkflowState::default();
        StepPatch::from(
            HomePatch::new()
                .analysis_completed(true)
                .website_analysis(AnalysisResult::new("Acme", "Devs", "APIs")),
        )
        .apply(&mut state.steps);
        StepPatch::from(AudiencePatch::new().customer_strategy(Strategy::new("s1")))
            .apply(&mut state.steps);
        state.visible_sections.extend(StepId::ORDER);
        state.completed_steps.extend([StepId::Home, StepId::Audience]);
        state
    }

    #[test]
    fn fresh_session_shows_home_only() {
        let state = WorkflowState::default();
        assert_eq!(state.visible_sections, BTreeSet::from([StepId::Home]));
        assert_eq!(state.mode, Mode::Workflow);
        assert_eq!(WorkflowState::new_session(true).mode, Mode::Focus);
    }

    #[test]
    fn invalidation_keeps_sections_visible() {
        let mut state = populated();
        state.invalidate_downstream(StepId::Home);

        assert!(state.steps.audience.customer_strategy.is_none());
        assert!(!state.is_completed(StepId::Audience));
        assert!(state.is_completed(StepId::Home));
        assert!(state.is_visible(StepId::Posts));
    }

    #[test]
    fn reset_returns_to_home() {
        let mut state = populated();
        state.current_step = StepId::Audience;
        state.onboarding_completed = true;
        state.reset();

        assert_eq!(state.visible_sections, BTreeSet::from([StepId::Home]));
        assert!(state.completed_steps.is_empty());
        assert_eq!(state.current_step, StepId::Home);
        assert!(state.steps.home.website_analysis.is_none());
        // The onboarding flag survives resets
        assert!(state.onboarding_completed);
    }
}
