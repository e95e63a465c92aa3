//! Wayfinder Core
//!
//! The data model of the guided workflow engine:
//! - [`StepId`] and [`Mode`]: the three sequential stages and the two presentation modes
//! - Typed step payloads ([`HomeStep`], [`AudienceStep`], [`PostsStep`]) and their patches
//! - [`WorkflowState`]: the per-session root aggregate
//! - [`Fingerprint`]: derived identity of an analysis, used to detect stale downstream data
//! - [`StepResultStore`]: the narrow mutation API over step results
//!
//! # Example
//!
//! ```rust
//! use wayfinder_core::{AnalysisResult, HomePatch, StepId, StepResultStore, WorkflowState};
//!
//! let mut store = StepResultStore::new(WorkflowState::default());
//! let analysis = AnalysisResult::new("Acme", "Devs", "APIs");
//! store.set_step(HomePatch::new().analysis_completed(true).website_analysis(analysis));
//!
//! assert!(store.is_complete(StepId::Home));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod fingerprint;
pub mod state;
pub mod step;
pub mod store;
pub mod types;

// Re-exports
pub use error::{
    AuthContext, Hint, HintLevel, StorageError, ValidationIssue, WorkflowError,
};
pub use fingerprint::{Fingerprint, FingerprintError};
pub use state::WorkflowState;
pub use step::{
    AudiencePatch, AudienceStep, HomePatch, HomeStep, PostsPatch, PostsStep, StepPatch,
    StepResult, Steps,
};
pub use store::{StepChange, StepResultStore};
pub use types::{AnalysisResult, Mode, StepId, Strategy, StrategyPricing, Topic};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
