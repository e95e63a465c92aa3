//! Engine configuration
//!
//! Loaded from TOML; every key is optional and falls back to [`EngineConfig::default`].
//!
//! ```toml
//! poll_interval_ms = 2000
//! storage_namespace = "wayfinder"
//! focus_unlock = "require_prior_data"
//! persist_in_background = true
//! event_capacity = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How focus mode unlocks sections for authenticated users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusUnlockPolicy {
    /// Audience needs a prior analysis, posts needs a prior strategy
    #[default]
    RequirePriorData,
    /// Users who completed onboarding see every section
    ReturningUsers,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between job-status requests
    pub poll_interval_ms: u64,
    /// Give up polling after this many attempts; `None` polls until a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_poll_attempts: Option<u32>,
    /// Prefix of every storage key
    pub storage_namespace: String,
    /// Focus-mode unlock rule
    pub focus_unlock: FocusUnlockPolicy,
    /// Persist on a background task instead of inline
    pub persist_in_background: bool,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With polling attempt limit
    #[inline]
    #[must_use]
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    /// With focus unlock policy
    #[inline]
    #[must_use]
    pub fn with_focus_unlock(mut self, policy: FocusUnlockPolicy) -> Self {
        self.focus_unlock = policy;
        self
    }

    /// With inline or background persistence
    #[inline]
    #[must_use]
    pub fn with_background_persistence(mut self, enabled: bool) -> Self {
        self.persist_in_background = enabled;
        self
    }

    /// With storage namespace
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }

    /// Poll interval as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Parse failure or invalid values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// I/O, parse failure or invalid values
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Serialization failure
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the offending key
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.max_poll_attempts == Some(0) {
            return Err(ConfigError::Invalid("max_poll_attempts must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        if self.storage_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_namespace must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            max_poll_attempts: None,
            storage_namespace: "wayfinder".to_string(),
            focus_unlock: FocusUnlockPolicy::default(),
            persist_in_background: true,
            event_capacity: 64,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML could not be parsed
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML could not be rendered
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// Value out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.max_poll_attempts.is_none());
    }

    #[test]
    fn partial_toml_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            poll_interval_ms = 250
            focus_unlock = "returning_users"
            max_poll_attempts = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.focus_unlock, FocusUnlockPolicy::ReturningUsers);
        assert_eq!(config.max_poll_attempts, Some(10));
        assert_eq!(config.storage_namespace, "wayfinder");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("poll_interval_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("storage_namespace = \" \""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("poll_interval_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn toml_round_trip() {
        let config = EngineConfig::new()
            .with_poll_interval(Duration::from_millis(500))
            .with_max_poll_attempts(3)
            .with_namespace("acme");
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wayfinder.toml");
        std::fs::write(&path, "event_capacity = 8\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.event_capacity, 8);
        assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
