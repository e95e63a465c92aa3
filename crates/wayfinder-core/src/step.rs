//! Step payloads and partial updates
//!
//! Each [`StepId`] has exactly one payload type. Updates arrive as patches
//! whose fields are all optional; applying a patch overwrites only the
//! fields it carries, so concurrent completions that touch different fields
//! never clobber each other.

use crate::error::ValidationIssue;
use crate::types::{AnalysisResult, StepId, Strategy, Topic};
use serde::{Deserialize, Serialize};

/// Results of the website analysis step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HomeStep {
    /// Analysis finished
    pub analysis_completed: bool,
    /// Analysis payload
    pub website_analysis: Option<AnalysisResult>,
}

impl HomeStep {
    /// Complete iff the analysis finished and produced a result
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.analysis_completed && self.website_analysis.is_some()
    }

    /// Lazily check the payload for malformed data
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        match &self.website_analysis {
            None if self.analysis_completed => {
                issues.push(ValidationIssue::CompletedWithoutAnalysis);
            }
            Some(analysis) => {
                for (name, value) in [
                    ("businessName", &analysis.business_name),
                    ("targetAudience", &analysis.target_audience),
                    ("contentFocus", &analysis.content_focus),
                ] {
                    if value.trim().is_empty() {
                        issues.push(ValidationIssue::EmptyAnalysisField(name));
                    }
                }
            }
            None => {}
        }
        issues
    }
}

/// Results of the audience step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudienceStep {
    /// Strategy the user picked
    pub customer_strategy: Option<Strategy>,
}

impl AudienceStep {
    /// Complete iff a strategy is selected
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.customer_strategy.is_some()
    }

    /// Lazily check the payload for malformed data
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        match &self.customer_strategy {
            Some(strategy) if strategy.id.trim().is_empty() => {
                vec![ValidationIssue::EmptyStrategyId]
            }
            _ => Vec::new(),
        }
    }
}

/// Results of the posts step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsStep {
    /// Topics offered for the current strategy
    #[serde(default)]
    pub generated_topics: Vec<Topic>,
    /// Topic the user picked
    #[serde(default)]
    pub selected_topic: Option<Topic>,
    /// Generated post body for the selected topic
    #[serde(default)]
    pub generated_content: Option<String>,
    /// Topics whose posts were saved to the account
    #[serde(default)]
    pub saved_topic_ids: Vec<String>,
}

impl PostsStep {
    /// Complete iff a topic is selected
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.selected_topic.is_some()
    }

    /// Lazily check the payload for malformed data
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        match &self.selected_topic {
            Some(topic)
                if !self.generated_topics.is_empty()
                    && !self.generated_topics.iter().any(|t| t.id == topic.id) =>
            {
                vec![ValidationIssue::UnknownTopic(topic.id.clone())]
            }
            _ => Vec::new(),
        }
    }
}

/// Per-step results of a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Steps {
    /// Website analysis
    #[serde(default)]
    pub home: HomeStep,
    /// Audience strategy
    #[serde(default)]
    pub audience: AudienceStep,
    /// Topics and content
    #[serde(default)]
    pub posts: PostsStep,
}

impl Steps {
    /// Snapshot of one step
    #[must_use]
    pub fn get(&self, id: StepId) -> StepResult {
        match id {
            StepId::Home => StepResult::Home(self.home.clone()),
            StepId::Audience => StepResult::Audience(self.audience.clone()),
            StepId::Posts => StepResult::Posts(self.posts.clone()),
        }
    }

    /// Step-specific completion predicate
    #[must_use]
    pub fn is_complete(&self, id: StepId) -> bool {
        match id {
            StepId::Home => self.home.is_complete(),
            StepId::Audience => self.audience.is_complete(),
            StepId::Posts => self.posts.is_complete(),
        }
    }

    /// Validation issues of one step
    #[must_use]
    pub fn validate(&self, id: StepId) -> Vec<ValidationIssue> {
        match id {
            StepId::Home => self.home.validate(),
            StepId::Audience => self.audience.validate(),
            StepId::Posts => self.posts.validate(),
        }
    }

    /// Reset one step to its empty payload
    pub fn clear(&mut self, id: StepId) {
        match id {
            StepId::Home => self.home = HomeStep::default(),
            StepId::Audience => self.audience = AudienceStep::default(),
            StepId::Posts => self.posts = PostsStep::default(),
        }
    }
}

/// Tagged snapshot of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum StepResult {
    /// Website analysis
    Home(HomeStep),
    /// Audience strategy
    Audience(AudienceStep),
    /// Topics and content
    Posts(PostsStep),
}

impl StepResult {
    /// Step this result belongs to
    #[inline]
    #[must_use]
    pub fn id(&self) -> StepId {
        match self {
            StepResult::Home(_) => StepId::Home,
            StepResult::Audience(_) => StepId::Audience,
            StepResult::Posts(_) => StepId::Posts,
        }
    }

    /// Step-specific completion predicate
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            StepResult::Home(s) => s.is_complete(),
            StepResult::Audience(s) => s.is_complete(),
            StepResult::Posts(s) => s.is_complete(),
        }
    }
}

/// Partial update of [`HomeStep`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HomePatch {
    /// New completion flag
    pub analysis_completed: Option<bool>,
    /// New analysis (`Some(None)` clears it)
    pub website_analysis: Option<Option<AnalysisResult>>,
}

impl HomePatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set completion flag
    #[inline]
    #[must_use]
    pub fn analysis_completed(mut self, completed: bool) -> Self {
        self.analysis_completed = Some(completed);
        self
    }

    /// Set analysis
    #[inline]
    #[must_use]
    pub fn website_analysis(mut self, analysis: AnalysisResult) -> Self {
        self.website_analysis = Some(Some(analysis));
        self
    }

    /// Clear analysis
    #[inline]
    #[must_use]
    pub fn clear_analysis(mut self) -> Self {
        self.website_analysis = Some(None);
        self
    }

    fn apply(self, target: &mut HomeStep) {
        if let Some(completed) = self.analysis_completed {
            target.analysis_completed = completed;
        }
        if let Some(analysis) = self.website_analysis {
            target.website_analysis = analysis;
        }
    }
}

/// Partial update of [`AudienceStep`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudiencePatch {
    /// New strategy (`Some(None)` clears it)
    pub customer_strategy: Option<Option<Strategy>>,
}

impl AudiencePatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select strategy
    #[inline]
    #[must_use]
    pub fn customer_strategy(mut self, strategy: Strategy) -> Self {
        self.customer_strategy = Some(Some(strategy));
        self
    }

    /// Clear strategy
    #[inline]
    #[must_use]
    pub fn clear_strategy(mut self) -> Self {
        self.customer_strategy = Some(None);
        self
    }

    fn apply(self, target: &mut AudienceStep) {
        if let Some(strategy) = self.customer_strategy {
            target.customer_strategy = strategy;
        }
    }
}

/// Partial update of [`PostsStep`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostsPatch {
    /// Replacement topic list
    pub generated_topics: Option<Vec<Topic>>,
    /// New selection (`Some(None)` clears it)
    pub selected_topic: Option<Option<Topic>>,
    /// New content (`Some(None)` clears it)
    pub generated_content: Option<Option<String>>,
    /// Topic id to append to the saved list
    pub saved_topic_id: Option<String>,
}

impl PostsPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace topic list
    #[inline]
    #[must_use]
    pub fn generated_topics(mut self, topics: Vec<Topic>) -> Self {
        self.generated_topics = Some(topics);
        self
    }

    /// Select topic
    #[inline]
    #[must_use]
    pub fn selected_topic(mut self, topic: Topic) -> Self {
        self.selected_topic = Some(Some(topic));
        self
    }

    /// Set generated content
    #[inline]
    #[must_use]
    pub fn generated_content(mut self, content: impl Into<String>) -> Self {
        self.generated_content = Some(Some(content.into()));
        self
    }

    /// Mark topic as saved
    #[inline]
    #[must_use]
    pub fn saved_topic(mut self, topic_id: impl Into<String>) -> Self {
        self.saved_topic_id = Some(topic_id.into());
        self
    }

    fn apply(self, target: &mut PostsStep) {
        if let Some(topics) = self.generated_topics {
            target.generated_topics = topics;
        }
        if let Some(topic) = self.selected_topic {
            target.selected_topic = topic;
        }
        if let Some(content) = self.generated_content {
            target.generated_content = content;
        }
        if let Some(id) = self.saved_topic_id {
            if !target.saved_topic_ids.contains(&id) {
                target.saved_topic_ids.push(id);
            }
        }
    }
}

/// Partial update addressed to exactly one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepPatch {
    /// Update home
    Home(HomePatch),
    /// Update audience
    Audience(AudiencePatch),
    /// Update posts
    Posts(PostsPatch),
}

impl StepPatch {
    /// Step this patch targets
    #[inline]
    #[must_use]
    pub fn step_id(&self) -> StepId {
        match self {
            StepPatch::Home(_) => StepId::Home,
            StepPatch::Audience(_) => StepId::Audience,
            StepPatch::Posts(_) => StepId::Posts,
        }
    }

    /// Whether the patch carries a new website analysis
    #[must_use]
    pub fn new_analysis(&self) -> Option<&AnalysisResult> {
        match self {
            StepPatch::Home(HomePatch {
                website_analysis: Some(Some(analysis)),
                ..
            }) => Some(analysis),
            _ => None,
        }
    }

    /// Merge into `steps`, touching only the fields the patch carries
    pub fn apply(self, steps: &mut Steps) {
        match self {
            StepPatch::Home(p) => p.apply(&mut steps.home),
            StepPatch::Audience(p) => p.apply(&mut steps.audience),
            StepPatch::Posts(p) => p.apply(&mut steps.posts),
        }
    }
}

impl From<HomePatch> for StepPatch {
    fn from(value: HomePatch) -> Self {
        StepPatch::Home(value)
    }
}

impl From<AudiencePatch> for StepPatch {
    fn from(value: AudiencePatch) -> Self {
        StepPatch::Audience(value)
    }
}

impl From<PostsPatch> for StepPatch {
    fn from(value: PostsPatch) -> Self {
        StepPatch::Posts(value)
    }
}
