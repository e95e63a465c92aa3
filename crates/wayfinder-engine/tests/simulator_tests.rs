//! Randomized runs of the workflow simulator.
//!
//! The simulator drives a persisted engine with random user actions and
//! checks monotonic visibility, gated progression, downstream invalidation,
//! reload round trips and exactly-once resumption after every step.

use wayfinder_engine::{run_simulator, FocusUnlockPolicy, SimulatorConfig};

/// Tenet: no seed breaks a guarantee under either focus unlock policy.
#[test]
fn seed_sweep_passes() {
    for seed in 0..16 {
        for focus_unlock in [
            FocusUnlockPolicy::RequirePriorData,
            FocusUnlockPolicy::ReturningUsers,
        ] {
            let report = run_simulator(SimulatorConfig {
                seed,
                operations: 400,
                stop_on_first_violation: true,
                focus_unlock,
            });
            assert!(report.passed(), "{}", report.generate_text());
        }
    }
}

/// Tenet: long runs exercise parking, resumption and reloads.
#[test]
fn long_run_covers_auth_and_reload() {
    let report = run_simulator(SimulatorConfig {
        seed: 2024,
        operations: 5_000,
        ..SimulatorConfig::default()
    });

    assert!(report.passed(), "{}", report.generate_text());
    assert!(report.stats.parked_actions > 0);
    assert!(report.stats.resumed_actions > 0);
    assert!(report.stats.reloads > 0);
    assert!(report.stats.invalidations > 0);
}
