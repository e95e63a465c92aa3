//! Randomized workflow simulator
//!
//! Drives a [`WorkflowEngine`] with a seeded stream of user actions and
//! checks the engine's guarantees after every step:
//! - visible sections never shrink outside an explicit reset
//! - home and the current section are always visible
//! - "continue" never advances past an incomplete step, and a blocked
//!   continue changes nothing
//! - a different analysis clears audience and posts results
//! - the persisted blob always rehydrates to the in-memory state
//! - a parked action runs exactly once after login

use crate::config::{EngineConfig, FocusUnlockPolicy};
use crate::engine::{PendingAction, WorkflowEngine};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wayfinder_core::{
    AnalysisResult, AudiencePatch, AuthContext, Fingerprint, HomePatch, Mode, PostsPatch,
    PostsStep, StepId, StepPatch, Strategy, Topic,
};

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of operations to run
    pub operations: u64,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
    /// Focus unlock policy under test
    pub focus_unlock: FocusUnlockPolicy,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            operations: 1000,
            stop_on_first_violation: true,
            focus_unlock: FocusUnlockPolicy::default(),
        }
    }
}

/// User action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOperation {
    /// Record analysis fixture `n`
    Analyze(usize),
    /// Clear the analysis
    ClearAnalysis,
    /// Pick strategy fixture `n`
    SelectStrategy(usize),
    /// Clear the strategy
    ClearStrategy,
    /// Pick topic fixture `n`
    SelectTopic(usize),
    /// Press continue, optionally supplying data for the current step
    Continue {
        /// Supply fixture data
        with_data: bool,
    },
    /// Press back
    Back,
    /// Jump to a section
    Navigate(StepId),
    /// Switch to workflow mode
    EnterWorkflow,
    /// Switch to focus mode
    ExitToFocus,
    /// Complete the auth dialog
    Login,
    /// Drop the identity
    SignOut,
    /// Dismiss the auth dialog
    CancelAuth,
    /// Save the selected post
    SavePost,
    /// Gated action counting its own executions
    GatedAction,
    /// Reset to a fresh analysis
    StartNewAnalysis,
    /// Reload the engine from storage
    Reload,
}

/// Broken guarantee
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A section disappeared without a reset
    VisibilityShrank {
        /// Offending operation
        operation: SimulatedOperation,
        /// Sections that disappeared
        lost: Vec<StepId>,
    },
    /// Home or the cursor's section is not visible
    HiddenSection {
        /// Offending operation
        operation: SimulatedOperation,
        /// Section that should be visible
        step: StepId,
    },
    /// Continue advanced past an incomplete step
    ProgressedWhileIncomplete {
        /// Incomplete step
        step: StepId,
    },
    /// Blocked continue still changed state
    BlockedContinueMutated {
        /// Step that blocked
        step: StepId,
    },
    /// Continue on a complete step did not advance
    AdvanceMissed {
        /// Complete step
        step: StepId,
    },
    /// Downstream results survived a new analysis
    StaleDownstream {
        /// Fingerprint of the new analysis
        fingerprint: String,
    },
    /// Persisted blob does not match the in-memory state
    RoundTripMismatch {
        /// Offending operation
        operation: SimulatedOperation,
    },
    /// Parked action ran the wrong number of times
    ResumeCount {
        /// Offending operation
        operation: SimulatedOperation,
        /// Expected runs so far
        expected: usize,
        /// Actual runs so far
        actual: usize,
    },
}

/// Statistics for simulation
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    /// Operations executed
    pub operations: u64,
    /// Successful continues
    pub advances: u64,
    /// Continues blocked by incomplete data
    pub blocked_continues: u64,
    /// Analyses that invalidated downstream data
    pub invalidations: u64,
    /// Actions parked behind the auth gate
    pub parked_actions: u64,
    /// Parked actions resumed after login
    pub resumed_actions: u64,
    /// Engine reloads from storage
    pub reloads: u64,
}

/// Final report from simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Broken guarantees in order of detection
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let s = &self.stats;

        report.push_str("=== Wayfinder Simulator Report ===\n\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Focus Unlock: {:?}", self.config.focus_unlock);
        let _ = writeln!(report, "Operations: {}", s.operations);
        let _ = writeln!(report, "Advances: {}", s.advances);
        let _ = writeln!(report, "Blocked Continues: {}", s.blocked_continues);
        let _ = writeln!(report, "Invalidations: {}", s.invalidations);
        let _ = writeln!(report, "Parked Actions: {}", s.parked_actions);
        let _ = writeln!(report, "Resumed Actions: {}", s.resumed_actions);
        let _ = writeln!(report, "Reloads: {}", s.reloads);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {v:?}", i + 1);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

fn analysis_fixture(n: usize) -> AnalysisResult {
    const SITES: [(&str, &str, &str); 3] = [
        ("Acme Tools", "Small workshops", "Power tool guides"),
        ("Globex", "Platform teams", "Infrastructure automation"),
        ("Initech", "Finance leads", "Reporting workflows"),
    ];
    let (name, audience, focus) = SITES[n % SITES.len()];
    AnalysisResult::new(name, audience, focus)
}

fn strategy_fixture(n: usize) -> Strategy {
    Strategy::new(format!("strategy-{n}")).with_name(format!("Strategy {n}"))
}

fn topic_fixture(n: usize) -> Topic {
    Topic::new(format!("topic-{n}"), format!("Topic {n}"))
}

fn fixture_patch(step: StepId) -> StepPatch {
    match step {
        StepId::Home => HomePatch::new()
            .analysis_completed(true)
            .website_analysis(analysis_fixture(0))
            .into(),
        StepId::Audience => AudiencePatch::new().customer_strategy(strategy_fixture(0)).into(),
        StepId::Posts => PostsPatch::new().selected_topic(topic_fixture(0)).into(),
    }
}

fn generate_operation(rng: &mut StdRng) -> SimulatedOperation {
    match rng.random_range(0..17u32) {
        0 | 1 => SimulatedOperation::Analyze(rng.random_range(0..3)),
        2 => SimulatedOperation::ClearAnalysis,
        3 => SimulatedOperation::SelectStrategy(rng.random_range(0..3)),
        4 => SimulatedOperation::ClearStrategy,
        5 => SimulatedOperation::SelectTopic(rng.random_range(0..3)),
        6 | 7 => SimulatedOperation::Continue {
            with_data: rng.random_bool(0.5),
        },
        8 => SimulatedOperation::Back,
        9 => SimulatedOperation::Navigate(StepId::ORDER[rng.random_range(0..StepId::ORDER.len())]),
        10 => SimulatedOperation::EnterWorkflow,
        11 => SimulatedOperation::ExitToFocus,
        12 => SimulatedOperation::Login,
        13 => {
            if rng.random_bool(0.5) {
                SimulatedOperation::SignOut
            } else {
                SimulatedOperation::CancelAuth
            }
        }
        14 => {
            if rng.random_bool(0.5) {
                SimulatedOperation::SavePost
            } else {
                SimulatedOperation::GatedAction
            }
        }
        15 => SimulatedOperation::StartNewAnalysis,
        _ => SimulatedOperation::Reload,
    }
}

/// Gated action bookkeeping for exactly-once resumption
#[derive(Debug, Default)]
struct GatedLedger {
    runs: Arc<AtomicUsize>,
    expected: usize,
    parked: bool,
}

impl GatedLedger {
    fn action(&self) -> PendingAction {
        let runs = self.runs.clone();
        PendingAction::new("gated-action", move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn actual(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

/// Run the simulator
#[must_use]
pub fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let engine_config = EngineConfig::new()
        .with_focus_unlock(config.focus_unlock)
        .with_background_persistence(false);
    let mut engine = WorkflowEngine::in_memory(&engine_config);

    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    let mut ledger = GatedLedger::default();

    for _ in 0..config.operations {
        let operation = generate_operation(&mut rng);
        let before = engine.state().clone();
        stats.operations += 1;

        let mut found = Vec::new();
        match &operation {
            SimulatedOperation::Analyze(n) => {
                let analysis = analysis_fixture(*n);
                let fingerprint = Fingerprint::of(&analysis);
                engine.set_step(
                    HomePatch::new()
                        .analysis_completed(true)
                        .website_analysis(analysis),
                );
                if before
                    .generation_fingerprint
                    .is_some_and(|previous| previous != fingerprint)
                {
                    stats.invalidations += 1;
                    let steps = &engine.state().steps;
                    if steps.audience.customer_strategy.is_some() || steps.posts != PostsStep::default()
                    {
                        found.push(Violation::StaleDownstream {
                            fingerprint: fingerprint.short(),
                        });
                    }
                }
            }
            SimulatedOperation::ClearAnalysis => {
                engine.set_step(HomePatch::new().analysis_completed(false).clear_analysis());
            }
            SimulatedOperation::SelectStrategy(n) => {
                engine.set_step(AudiencePatch::new().customer_strategy(strategy_fixture(*n)));
            }
            SimulatedOperation::ClearStrategy => {
                engine.set_step(AudiencePatch::new().clear_strategy());
            }
            SimulatedOperation::SelectTopic(n) => {
                engine.set_step(PostsPatch::new().selected_topic(topic_fixture(*n)));
            }
            SimulatedOperation::Continue { with_data } => {
                let step = before.current_step;
                let data = with_data.then(|| fixture_patch(step));
                let complete = match &data {
                    Some(patch) => {
                        let mut merged_steps = before.steps.clone();
                        patch.clone().apply(&mut merged_steps);
                        merged_steps.is_complete(step)
                    }
                    None => before.steps.is_complete(step),
                };

                let result = engine.continue_to_next_step(data);
                if before.mode == Mode::Workflow {
                    if complete {
                        if result.is_some() {
                            stats.advances += 1;
                        }
                        if result != step.next() {
                            found.push(Violation::AdvanceMissed { step });
                        }
                    } else {
                        stats.blocked_continues += 1;
                        if result.is_some() {
                            found.push(Violation::ProgressedWhileIncomplete { step });
                        }
                        if engine.state() != &before {
                            found.push(Violation::BlockedContinueMutated { step });
                        }
                    }
                }
            }
            SimulatedOperation::Back => {
                engine.go_to_previous_step();
            }
            SimulatedOperation::Navigate(step) => {
                engine.navigate_to(*step);
            }
            SimulatedOperation::EnterWorkflow => {
                engine.enter_workflow_mode(before.current_step);
            }
            SimulatedOperation::ExitToFocus => {
                if !engine.is_authenticated() {
                    ledger.parked = false;
                    stats.parked_actions += 1;
                }
                engine.exit_to_focus_mode(before.current_step);
            }
            SimulatedOperation::Login => {
                if engine.auth_phase() == crate::auth::AuthPhase::AwaitingAuth {
                    stats.resumed_actions += 1;
                }
                if ledger.parked {
                    ledger.expected += 1;
                    ledger.parked = false;
                }
                engine.on_login_succeeded();
            }
            SimulatedOperation::SignOut => engine.sign_out(),
            SimulatedOperation::CancelAuth => {
                ledger.parked = false;
                engine.cancel_auth();
            }
            SimulatedOperation::SavePost => {
                if !engine.is_authenticated() && before.steps.posts.selected_topic.is_some() {
                    ledger.parked = false;
                    stats.parked_actions += 1;
                }
                engine.save_post();
            }
            SimulatedOperation::GatedAction => {
                if engine.is_authenticated() {
                    ledger.expected += 1;
                } else {
                    ledger.parked = true;
                    stats.parked_actions += 1;
                }
                engine.require_auth(ledger.action(), AuthContext::Register);
            }
            SimulatedOperation::StartNewAnalysis => engine.start_new_analysis(),
            SimulatedOperation::Reload => {
                stats.reloads += 1;
                ledger.parked = false;
                let bridge = engine.bridge().clone();
                engine = WorkflowEngine::new(&engine_config, bridge);
                if engine.state() != &before {
                    found.push(Violation::RoundTripMismatch {
                        operation: operation.clone(),
                    });
                }
            }
        }
        engine.take_hints();

        check_invariants(&operation, &before, &engine, &ledger, &mut found);
        if !found.is_empty() {
            violations.extend(found);
            if config.stop_on_first_violation {
                break;
            }
        }
    }

    SimulatorReport {
        config,
        stats,
        violations,
    }
}

fn check_invariants(
    operation: &SimulatedOperation,
    before: &wayfinder_core::WorkflowState,
    engine: &WorkflowEngine,
    ledger: &GatedLedger,
    found: &mut Vec<Violation>,
) {
    let state = engine.state();

    if *operation != SimulatedOperation::StartNewAnalysis {
        let lost: Vec<StepId> = before
            .visible_sections
            .difference(&state.visible_sections)
            .copied()
            .collect();
        if !lost.is_empty() {
            found.push(Violation::VisibilityShrank {
                operation: operation.clone(),
                lost,
            });
        }
    }

    for step in BTreeSet::from([StepId::Home, state.current_step]) {
        if !state.is_visible(step) {
            found.push(Violation::HiddenSection {
                operation: operation.clone(),
                step,
            });
        }
    }

    if let Ok(Some(blob)) = engine.bridge().load_snapshot() {
        if &blob.into_state() != state {
            found.push(Violation::RoundTripMismatch {
                operation: operation.clone(),
            });
        }
    }

    if ledger.actual() != ledger.expected {
        found.push(Violation::ResumeCount {
            operation: operation.clone(),
            expected: ledger.expected,
            actual: ledger.actual(),
        });
    }
}
