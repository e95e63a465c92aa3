//! Persisted blob layout
//!
//! A single JSON document per scope. The `version` field guards against
//! reading blobs written by an incompatible build; unknown versions are
//! treated as absent state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use wayfinder_core::{Fingerprint, Mode, StepId, Steps, StorageError, Strategy, WorkflowState};

/// Current blob format version.
/// Increment when making breaking changes to [`PersistedWorkflow`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Generated strategies, valid only for the analysis they came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyCache {
    /// Fingerprint of the analysis the strategies were generated from
    pub fingerprint: Fingerprint,
    /// Generated strategies
    pub strategies: Vec<Strategy>,
}

/// On-disk form of a [`WorkflowState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWorkflow {
    /// Blob format version
    pub version: u32,
    /// When the blob was written
    pub saved_at: DateTime<Utc>,
    /// Step results
    pub steps: Steps,
    /// Finished sections
    #[serde(default)]
    pub completed_steps: BTreeSet<StepId>,
    /// Mounted sections
    #[serde(default)]
    pub visible_sections: BTreeSet<StepId>,
    /// Fingerprint downstream results belong to
    #[serde(default)]
    pub generation_fingerprint: Option<Fingerprint>,
    /// Section the user was on
    #[serde(default)]
    pub current_step: Option<StepId>,
    /// Mode of the guided flow; absent blobs fall back to the onboarding default
    #[serde(default)]
    pub mode: Option<Mode>,
    /// User finished the flow at least once
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Cached strategies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_cache: Option<StrategyCache>,
}

impl PersistedWorkflow {
    /// Capture `state` and the strategy cache
    #[must_use]
    pub fn capture(state: &WorkflowState, strategy_cache: Option<StrategyCache>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            steps: state.steps.clone(),
            completed_steps: state.completed_steps.clone(),
            visible_sections: state.visible_sections.clone(),
            generation_fingerprint: state.generation_fingerprint,
            current_step: Some(state.current_step),
            mode: Some(state.mode),
            onboarding_completed: state.onboarding_completed,
            strategy_cache,
        }
    }

    /// Parse a blob
    ///
    /// # Errors
    /// [`StorageError::Corrupted`] for unparseable JSON,
    /// [`StorageError::UnsupportedVersion`] for foreign versions
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        let blob: Self =
            serde_json::from_str(raw).map_err(|e| StorageError::Corrupted(e.to_string()))?;
        if blob.version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion(blob.version));
        }
        Ok(blob)
    }

    /// Serialize to JSON
    ///
    /// # Errors
    /// Serialization failure
    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore the workflow state
    ///
    /// Home is always visible, and a cursor pointing at a hidden section
    /// falls back to home.
    #[must_use]
    pub fn into_state(self) -> WorkflowState {
        let mut visible_sections = self.visible_sections;
        visible_sections.insert(StepId::Home);

        let current_step = self
            .current_step
            .filter(|id| visible_sections.contains(id))
            .unwrap_or(StepId::Home);

        WorkflowState {
            steps: self.steps,
            mode: self
                .mode
                .unwrap_or_else(|| Mode::default_for(self.onboarding_completed)),
            current_step,
            visible_sections,
            completed_steps: self.completed_steps,
            generation_fingerprint: self.generation_fingerprint,
            onboarding_completed: self.onboarding_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wayfinder_core::{AnalysisResult, HomePatch, StepResultStore};

    #[test]
    fn capture_and_restore() {
        let mut store = StepResultStore::default();
        store.set_step(
            HomePatch::new()
                .analysis_completed(true)
                .website_analysis(AnalysisResult::new("Acme", "Devs", "APIs")),
        );
        store.mark_completed(StepId::Home);
        let state = store.into_state();

        let json = PersistedWorkflow::capture(&state, None).to_json().unwrap();
        let restored = PersistedWorkflow::from_json(&json).unwrap().into_state();
        assert_eq!(restored, state);
    }

    #[test]
    fn layout_uses_camel_case_keys() {
        let json = PersistedWorkflow::capture(&WorkflowState::default(), None)
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in [
            "version",
            "savedAt",
            "steps",
            "completedSteps",
            "visibleSections",
            "generationFingerprint",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["visibleSections"], serde_json::json!(["home"]));
    }

    #[test]
    fn missing_mode_uses_onboarding_default() {
        let raw = r#"{
            "version": 1,
            "savedAt": "2024-01-01T00:00:00Z",
            "steps": {},
            "onboardingCompleted": true
        }"#;
        let state = PersistedWorkflow::from_json(raw).unwrap().into_state();
        assert_eq!(state.mode, Mode::Focus);
        assert!(state.is_visible(StepId::Home));
        assert_eq!(state.current_step, StepId::Home);
    }

    #[test]
    fn hidden_cursor_falls_back_to_home() {
        let raw = r#"{
            "version": 1,
            "savedAt": "2024-01-01T00:00:00Z",
            "steps": {},
            "visibleSections": ["home"],
            "currentStep": "posts"
        }"#;
        let state = PersistedWorkflow::from_json(raw).unwrap().into_state();
        assert_eq!(state.current_step, StepId::Home);
    }

    #[test]
    fn rejects_corrupted_and_foreign_blobs() {
        assert!(matches!(
            PersistedWorkflow::from_json("{not json"),
            Err(StorageError::Corrupted(_))
        ));

        let raw = r#"{"version": 99, "savedAt": "2024-01-01T00:00:00Z", "steps": {}}"#;
        assert!(matches!(
            PersistedWorkflow::from_json(raw),
            Err(StorageError::UnsupportedVersion(99))
        ));
    }
}
