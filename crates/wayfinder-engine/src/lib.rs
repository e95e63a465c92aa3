//! Wayfinder Engine
//!
//! Guided three-step onboarding (analyze a website, pick an audience,
//! write posts) on top of [`wayfinder_core`] and [`wayfinder_persistence`].
//!
//! # Components
//!
//! - [`ModeController`]: workflow vs. focus mode, gated "continue" and "back"
//! - [`SectionVisibilityGate`]: which sections are mounted; the set only grows
//! - [`AuthGate`]: parks actions until the user signs in, then resumes them once
//! - [`WorkflowEngine`]: synchronous owner of the state running the mutation pipeline
//! - [`WorkflowSession`]: async wrapper calling the [`ContentApi`] and polling jobs
//!
//! # Example
//!
//! ```rust
//! use wayfinder_core::{AnalysisResult, HomePatch, StepId};
//! use wayfinder_engine::{EngineConfig, WorkflowEngine};
//!
//! let mut engine = WorkflowEngine::in_memory(&EngineConfig::default());
//! engine.set_step(
//!     HomePatch::new()
//!         .analysis_completed(true)
//!         .website_analysis(AnalysisResult::new("Acme", "Devs", "APIs")),
//! );
//!
//! assert!(engine.state().is_visible(StepId::Audience));
//! assert_eq!(engine.continue_to_next_step(None), Some(StepId::Audience));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod api;
pub mod auth;
pub mod config;
pub mod credits;
pub mod engine;
pub mod events;
pub mod logging;
pub mod mode;
pub mod poller;
pub mod session;
pub mod simulator;
pub mod visibility;

// Re-exports
pub use api::{
    ApiError, ContentApi, GeneratedContent, JobId, JobState, JobStatus, Submission, UserCredits,
};
pub use auth::{AuthGate, AuthPhase, AuthState, AuthTransitionError};
pub use config::{ConfigError, EngineConfig, FocusUnlockPolicy};
pub use credits::{CreditGuard, GenerateGate};
pub use engine::{PendingAction, WorkflowEngine};
pub use events::{EventBus, WorkflowEvent};
pub use logging::init_tracing;
pub use mode::{Advance, Affordances, ModeController};
pub use poller::{CancelToken, JobPoller, PollGuard};
pub use session::WorkflowSession;
pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport, Violation};
pub use visibility::{Reachability, SectionVisibilityGate};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
