//! Core identifiers and payload types
//!
//! Defines the stages of the guided flow, the presentation modes and the
//! domain payloads produced by the external content API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three sequential stages of the guided flow
///
/// Ordering follows the flow: `Home < Audience < Posts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepId {
    /// Website analysis
    Home,
    /// Audience strategy selection
    Audience,
    /// Topic and content generation
    Posts,
}

impl StepId {
    /// Fixed linear ordering of the flow
    pub const ORDER: [StepId; 3] = [StepId::Home, StepId::Audience, StepId::Posts];

    /// Position in [`StepId::ORDER`]
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            StepId::Home => 0,
            StepId::Audience => 1,
            StepId::Posts => 2,
        }
    }

    /// Next step in the flow, `None` at the last step
    #[inline]
    #[must_use]
    pub fn next(self) -> Option<StepId> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    /// Previous step in the flow, `None` at the first step
    #[inline]
    #[must_use]
    pub fn previous(self) -> Option<StepId> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }

    /// Steps strictly after this one
    #[must_use]
    pub fn downstream(self) -> &'static [StepId] {
        &Self::ORDER[self.index() + 1..]
    }

    /// Lowercase name, matching the serialized form
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StepId::Home => "home",
            StepId::Audience => "audience",
            StepId::Posts => "posts",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(StepId::Home),
            "audience" => Ok(StepId::Audience),
            "posts" => Ok(StepId::Posts),
            other => Err(format!("unknown step: {other}")),
        }
    }
}

/// Presentation mode of the guided flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Guided, linear, next/back navigation
    #[default]
    Workflow,
    /// Free navigation between unlocked sections
    Focus,
}

impl Mode {
    /// Default mode for a session
    ///
    /// Users who finished onboarding start in focus mode; everyone else is guided.
    #[inline]
    #[must_use]
    pub const fn default_for(onboarding_completed: bool) -> Self {
        if onboarding_completed {
            Mode::Focus
        } else {
            Mode::Workflow
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Workflow => f.write_str("workflow"),
            Mode::Focus => f.write_str("focus"),
        }
    }
}

/// Result of analyzing a website
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Business name detected on the site
    pub business_name: String,
    /// Primary audience the business targets
    pub target_audience: String,
    /// Focus area for generated content
    pub content_focus: String,
    /// Analyzed URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    /// Business category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Extracted keywords
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl AnalysisResult {
    /// Create analysis with the three identifying fields
    #[must_use]
    pub fn new(
        business_name: impl Into<String>,
        target_audience: impl Into<String>,
        content_focus: impl Into<String>,
    ) -> Self {
        Self {
            business_name: business_name.into(),
            target_audience: target_audience.into(),
            content_focus: content_focus.into(),
            ..Self::default()
        }
    }

    /// With analyzed URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.website_url = Some(url.into());
        self
    }
}

/// Pricing attached to an audience strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPricing {
    /// Monthly price in cents
    pub monthly_cents: u32,
    /// Posts included per month
    pub posts_per_month: u32,
}

/// Customer strategy produced by audience generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    /// Stable identifier
    pub id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Audience segment this strategy addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_segment: Option<String>,
    /// Subscription pricing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<StrategyPricing>,
}

impl Strategy {
    /// Create strategy with an id only
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            target_segment: None,
            pricing: None,
        }
    }

    /// With display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With target segment
    #[must_use]
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.target_segment = Some(segment.into());
        self
    }
}

/// Blog post topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Stable identifier
    pub id: String,
    /// Headline
    pub title: String,
    /// Optional secondary line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subheader: Option<String>,
}

impl Topic {
    /// Create topic
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subheader: None,
        }
    }
}
