//! Section visibility gate
//!
//! Computes which sections are mounted. The visible set only ever grows
//! during a session: a recomputation is unioned into the current set, so a
//! section the user has seen never disappears behind them. Only an explicit
//! reset shrinks it back to home.

use crate::config::FocusUnlockPolicy;
use std::collections::BTreeSet;
use wayfinder_core::{Mode, StepId, StepResultStore, WorkflowState};

/// How a user can get to a section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Jump there directly (focus mode, visible section)
    Direct,
    /// Only by walking the sequence (workflow mode, visible section)
    Sequential,
    /// Not mounted
    Locked,
}

/// Visibility rules for the guided flow
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionVisibilityGate {
    policy: FocusUnlockPolicy,
}

impl SectionVisibilityGate {
    /// Gate using `policy` for focus mode
    #[inline]
    #[must_use]
    pub fn new(policy: FocusUnlockPolicy) -> Self {
        Self { policy }
    }

    /// Focus unlock policy in effect
    #[inline]
    #[must_use]
    pub fn policy(&self) -> FocusUnlockPolicy {
        self.policy
    }

    /// Sections the current data and mode unlock
    ///
    /// This is the rule alone; callers union it into the visible set.
    #[must_use]
    pub fn compute_visible_sections(
        &self,
        state: &WorkflowState,
        authenticated: bool,
    ) -> BTreeSet<StepId> {
        let mut visible = BTreeSet::from([StepId::Home]);
        let steps = &state.steps;

        match state.mode {
            Mode::Workflow => {
                if steps.is_complete(StepId::Home) {
                    visible.insert(StepId::Audience);
                    if steps.is_complete(StepId::Audience) {
                        visible.insert(StepId::Posts);
                    }
                }
            }
            Mode::Focus if authenticated => {
                if self.policy == FocusUnlockPolicy::ReturningUsers && state.onboarding_completed
                {
                    visible.extend(StepId::ORDER);
                } else if steps.home.website_analysis.is_some() {
                    visible.insert(StepId::Audience);
                    if steps.audience.customer_strategy.is_some() {
                        visible.insert(StepId::Posts);
                    }
                }
            }
            Mode::Focus => {}
        }

        visible
    }

    /// Union the unlocked sections into the store, returning newly visible ones
    pub fn reevaluate(&self, store: &mut StepResultStore, authenticated: bool) -> Vec<StepId> {
        let unlocked = self.compute_visible_sections(store.state(), authenticated);
        let revealed = store.reveal(&unlocked);
        if !revealed.is_empty() {
            tracing::debug!(?revealed, "sections unlocked");
        }
        revealed
    }

    /// How `section` can be reached right now
    #[must_use]
    pub fn reachability(&self, state: &WorkflowState, section: StepId) -> Reachability {
        if !state.is_visible(section) {
            return Reachability::Locked;
        }
        match state.mode {
            Mode::Focus => Reachability::Direct,
            Mode::Workflow => Reachability::Sequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wayfinder_core::{AnalysisResult, AudiencePatch, HomePatch, Strategy};

    fn analyzed(store: &mut StepResultStore) {
        store.set_step(
            HomePatch::new()
                .analysis_completed(true)
                .website_analysis(AnalysisResult::new("Acme", "Devs", "APIs")),
        );
    }

    #[test]
    fn home_is_always_visible() {
        let gate = SectionVisibilityGate::default();
        for authenticated in [false, true] {
            let visible = gate.compute_visible_sections(&WorkflowState::default(), authenticated);
            assert_eq!(visible, BTreeSet::from([StepId::Home]));
        }
    }

    #[test]
    fn workflow_unlocks_in_sequence() {
        let gate = SectionVisibilityGate::default();
        let mut store = StepResultStore::default();

        analyzed(&mut store);
        assert_eq!(gate.reevaluate(&mut store, false), vec![StepId::Audience]);

        store.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));
        assert_eq!(gate.reevaluate(&mut store, false), vec![StepId::Posts]);
        assert!(gate.reevaluate(&mut store, false).is_empty());
    }

    #[test]
    fn focus_requires_auth_and_prior_data() {
        let gate = SectionVisibilityGate::new(FocusUnlockPolicy::RequirePriorData);
        let mut store = StepResultStore::default();
        store.set_mode(Mode::Focus);
        store.set_step(HomePatch::new().website_analysis(AnalysisResult::new("a", "b", "c")));

        let anonymous = gate.compute_visible_sections(store.state(), false);
        assert_eq!(anonymous, BTreeSet::from([StepId::Home]));

        let signed_in = gate.compute_visible_sections(store.state(), true);
        assert_eq!(signed_in, BTreeSet::from([StepId::Home, StepId::Audience]));
    }

    #[test]
    fn returning_users_see_everything_in_focus() {
        let gate = SectionVisibilityGate::new(FocusUnlockPolicy::ReturningUsers);
        let mut state = WorkflowState::new_session(true);
        state.mode = Mode::Focus;

        let visible = gate.compute_visible_sections(&state, true);
        assert_eq!(visible, StepId::ORDER.into_iter().collect());
        assert_eq!(
            gate.compute_visible_sections(&state, false),
            BTreeSet::from([StepId::Home])
        );
    }

    #[test]
    fn recomputation_never_hides_sections() {
        let gate = SectionVisibilityGate::default();
        let mut store = StepResultStore::default();
        analyzed(&mut store);
        gate.reevaluate(&mut store, false);

        store.set_step(HomePatch::new().clear_analysis());
        gate.reevaluate(&mut store, false);
        assert!(store.state().is_visible(StepId::Audience));
    }

    #[test]
    fn reachability_by_mode() {
        let gate = SectionVisibilityGate::default();
        let mut store = StepResultStore::default();
        assert_eq!(gate.reachability(store.state(), StepId::Home), Reachability::Sequential);
        assert_eq!(gate.reachability(store.state(), StepId::Posts), Reachability::Locked);

        store.set_mode(Mode::Focus);
        assert_eq!(gate.reachability(store.state(), StepId::Home), Reachability::Direct);
    }
}
