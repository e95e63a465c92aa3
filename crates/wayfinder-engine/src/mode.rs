//! Mode controller
//!
//! Decides how each section behaves. In workflow mode the sections form a
//! strict sequence and "continue" only advances once the current step's
//! completion predicate holds. In focus mode every visible section is
//! independently usable and there is no next/back navigation.
//!
//! The controller works directly on a [`StepResultStore`] and reports what
//! happened; side effects (visibility, persistence, events) belong to the
//! engine.

use wayfinder_core::{
    Mode, StepChange, StepId, StepPatch, StepResultStore, ValidationIssue, WorkflowState,
};

/// Result of [`ModeController::continue_to_next_step`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Current step incomplete; nothing was written
    Blocked {
        /// Step that is missing data
        step: StepId,
    },
    /// Data addressed to another step; nothing was written
    Rejected {
        /// Current step
        step: StepId,
        /// Step the data belongs to
        target: StepId,
    },
    /// Step committed and the cursor moved on
    Moved {
        /// Completed step
        from: StepId,
        /// New current step
        to: StepId,
        /// Write performed on the way, if data was supplied
        change: Option<StepChange>,
    },
    /// Last step committed; there is nowhere to move
    Finished {
        /// Completed step
        step: StepId,
        /// Write performed on the way, if data was supplied
        change: Option<StepChange>,
    },
}

impl Advance {
    /// Step the cursor moved to
    #[inline]
    #[must_use]
    pub fn next_step(&self) -> Option<StepId> {
        match self {
            Advance::Moved { to, .. } => Some(*to),
            Advance::Blocked { .. } | Advance::Rejected { .. } | Advance::Finished { .. } => None,
        }
    }
}

/// Navigation controls a section should render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Affordances {
    /// Render a "continue" control
    pub show_next: bool,
    /// "Continue" is clickable
    pub next_enabled: bool,
    /// Render a "back" control
    pub show_back: bool,
    /// Offer switching between workflow and focus mode
    pub show_mode_switch: bool,
}

/// Workflow/focus state machine over the step sequence
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeController;

impl ModeController {
    /// Create a controller
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Mode `section` renders in, `None` when it is not mounted
    #[must_use]
    pub fn get_mode(&self, state: &WorkflowState, section: StepId) -> Option<Mode> {
        state.is_visible(section).then_some(state.mode)
    }

    /// Switch to workflow mode, focusing `section` when it is visible
    ///
    /// Returns whether the mode changed.
    pub fn enter_workflow_mode(&self, store: &mut StepResultStore, section: StepId) -> bool {
        self.switch(store, Mode::Workflow, section)
    }

    /// Switch to focus mode, focusing `section` when it is visible
    ///
    /// Returns whether the mode changed.
    pub fn exit_to_focus_mode(&self, store: &mut StepResultStore, section: StepId) -> bool {
        self.switch(store, Mode::Focus, section)
    }

    fn switch(&self, store: &mut StepResultStore, mode: Mode, section: StepId) -> bool {
        if store.state().is_visible(section) {
            store.set_current_step(section);
        }
        let changed = store.state().mode != mode;
        if changed {
            tracing::info!(%mode, %section, "mode switched");
            store.set_mode(mode);
        }
        changed
    }

    /// Commit `step_data` and advance past the current step
    ///
    /// `step_data` must belong to the current step. The completion predicate
    /// is checked against the current data merged with `step_data` before
    /// anything is written. When either check fails the store is left
    /// untouched.
    pub fn continue_to_next_step(
        &self,
        store: &mut StepResultStore,
        step_data: Option<StepPatch>,
    ) -> Advance {
        let current = store.state().current_step;

        if let Some(patch) = &step_data {
            if patch.step_id() != current {
                let issue = ValidationIssue::StepMismatch {
                    expected: current,
                    actual: patch.step_id(),
                };
                tracing::warn!("{issue}; continue rejected");
                return Advance::Rejected {
                    step: current,
                    target: patch.step_id(),
                };
            }
        }

        let complete = match &step_data {
            Some(patch) => {
                let mut merged = store.state().steps.clone();
                patch.clone().apply(&mut merged);
                merged.is_complete(current)
            }
            None => store.is_complete(current),
        };
        if !complete {
            tracing::debug!(step = %current, "continue blocked by incomplete step");
            return Advance::Blocked { step: current };
        }

        let change = step_data.map(|patch| store.set_step(patch));
        store.mark_completed(current);

        match current.next() {
            Some(next) => {
                store.set_current_step(next);
                tracing::debug!(from = %current, to = %next, "advanced");
                Advance::Moved {
                    from: current,
                    to: next,
                    change,
                }
            }
            None => Advance::Finished {
                step: current,
                change,
            },
        }
    }

    /// Move the cursor back one section, keeping completion marks
    pub fn go_to_previous_step(&self, store: &mut StepResultStore) -> Option<StepId> {
        let previous = store.state().current_step.previous()?;
        store.set_current_step(previous);
        Some(previous)
    }

    /// Controls `section` should render
    #[must_use]
    pub fn affordances(
        &self,
        state: &WorkflowState,
        section: StepId,
        authenticated: bool,
    ) -> Affordances {
        if !state.is_visible(section) {
            return Affordances::default();
        }
        match state.mode {
            Mode::Workflow => {
                let show_next = section.next().is_some();
                Affordances {
                    show_next,
                    next_enabled: show_next && state.steps.is_complete(section),
                    show_back: section.previous().is_some(),
                    show_mode_switch: authenticated,
                }
            }
            Mode::Focus => Affordances {
                show_mode_switch: true,
                ..Affordances::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wayfinder_core::{AnalysisResult, AudiencePatch, HomePatch, Strategy};

    fn acme() -> AnalysisResult {
        AnalysisResult::new("Acme", "Devs", "APIs")
    }

    fn complete_home() -> StepPatch {
        HomePatch::new()
            .analysis_completed(true)
            .website_analysis(acme())
            .into()
    }

    #[test]
    fn continue_with_incomplete_step_changes_nothing() {
        let mut store = StepResultStore::default();
        let before = store.state().clone();

        let outcome = ModeController::new().continue_to_next_step(
            &mut store,
            Some(HomePatch::new().analysis_completed(true).into()),
        );

        assert_eq!(outcome, Advance::Blocked { step: StepId::Home });
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn continue_commits_and_advances() {
        let mut store = StepResultStore::default();
        let outcome =
            ModeController::new().continue_to_next_step(&mut store, Some(complete_home()));

        assert_eq!(outcome.next_step(), Some(StepId::Audience));
        assert!(store.state().is_completed(StepId::Home));
        assert_eq!(store.state().current_step, StepId::Audience);
        match outcome {
            Advance::Moved { change, .. } => assert!(change.unwrap().analysis.is_some()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn continue_without_data_uses_stored_results() {
        let mut store = StepResultStore::default();
        store.set_step(complete_home());

        let outcome = ModeController::new().continue_to_next_step(&mut store, None);
        assert_eq!(outcome.next_step(), Some(StepId::Audience));
    }

    #[test]
    fn continue_on_last_step_finishes() {
        let mut store = StepResultStore::default();
        store.set_current_step(StepId::Posts);
        store.set_step(wayfinder_core::PostsPatch::new().selected_topic(
            wayfinder_core::Topic::new("t1", "Ten API tips"),
        ));

        let outcome = ModeController::new().continue_to_next_step(&mut store, None);
        assert!(matches!(outcome, Advance::Finished { step: StepId::Posts, .. }));
        assert!(store.state().onboarding_completed);
    }

    #[test]
    fn patch_for_other_step_does_not_complete_current() {
        let mut store = StepResultStore::default();
        let outcome = ModeController::new().continue_to_next_step(
            &mut store,
            Some(AudiencePatch::new().customer_strategy(Strategy::new("s1")).into()),
        );
        assert_eq!(
            outcome,
            Advance::Rejected {
                step: StepId::Home,
                target: StepId::Audience
            }
        );
        assert!(!store.is_complete(StepId::Audience));
    }

    #[test]
    fn upstream_patch_is_rejected_on_later_step() {
        let mut store = StepResultStore::default();
        let controller = ModeController::new();
        controller.continue_to_next_step(&mut store, Some(complete_home()));
        store.set_step(AudiencePatch::new().customer_strategy(Strategy::new("s1")));
        let before = store.state().clone();

        let outcome = controller.continue_to_next_step(
            &mut store,
            Some(
                HomePatch::new()
                    .website_analysis(AnalysisResult::new("Globex", "Ops", "Infra"))
                    .into(),
            ),
        );

        assert_eq!(outcome.next_step(), None);
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn back_keeps_completion() {
        let mut store = StepResultStore::default();
        let controller = ModeController::new();
        controller.continue_to_next_step(&mut store, Some(complete_home()));

        assert_eq!(controller.go_to_previous_step(&mut store), Some(StepId::Home));
        assert!(store.state().is_completed(StepId::Home));
        assert_eq!(controller.go_to_previous_step(&mut store), None);
    }

    #[test]
    fn mode_switch_reports_change() {
        let mut store = StepResultStore::default();
        let controller = ModeController::new();

        assert!(controller.exit_to_focus_mode(&mut store, StepId::Home));
        assert!(!controller.exit_to_focus_mode(&mut store, StepId::Home));
        assert_eq!(controller.get_mode(store.state(), StepId::Home), Some(Mode::Focus));
        assert_eq!(controller.get_mode(store.state(), StepId::Posts), None);
        assert!(controller.enter_workflow_mode(&mut store, StepId::Home));
    }

    #[test]
    fn affordances_follow_mode() {
        let mut store = StepResultStore::default();
        let controller = ModeController::new();

        let home = controller.affordances(store.state(), StepId::Home, false);
        assert_eq!(
            home,
            Affordances {
                show_next: true,
                next_enabled: false,
                show_back: false,
                show_mode_switch: false,
            }
        );

        store.set_step(complete_home());
        assert!(controller.affordances(store.state(), StepId::Home, true).next_enabled);

        controller.exit_to_focus_mode(&mut store, StepId::Home);
        let focus = controller.affordances(store.state(), StepId::Home, true);
        assert!(!focus.show_next && !focus.show_back && focus.show_mode_switch);
    }
}
