//! Pipeline configuration.
//!
//! Library defaults match the environment defaults documented on the
//! server binary; nothing here reads the environment.

use std::time::Duration;

use tokenlift_core::error::CoreError;
use tokenlift_core::retry::RetryConfig;
use tokenlift_core::styles::ExtractionConfig;
use tokenlift_core::visual::{ComparatorConfig, ScoreBlend};

/// Selectors sampled for style extraction when none are configured.
pub const DEFAULT_SELECTORS: &[&str] = &[
    "body", "header", "nav", "main", "footer", "h1", "h2", "h3", "p", "a", "button", ".btn",
    "input", "label", ".card",
];

/// Upper bound on a single external call attempt.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings of the optional comparison stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonConfig {
    pub enabled: bool,
    pub comparator: ComparatorConfig,
    /// Blend of SSIM and color score; owned here, not by the comparator.
    pub blend: ScoreBlend,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            comparator: ComparatorConfig::default(),
            blend: ScoreBlend::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Retry policy applied to each external call individually.
    pub retry: RetryConfig,
    pub stage_timeout: Duration,
    pub selectors: Vec<String>,
    pub extraction: ExtractionConfig,
    pub comparison: ComparisonConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            selectors: DEFAULT_SELECTORS.iter().map(|s| (*s).to_string()).collect(),
            extraction: ExtractionConfig::default(),
            comparison: ComparisonConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.selectors.is_empty() {
            return Err(CoreError::Validation("at least one selector is required".into()));
        }
        if self.stage_timeout.is_zero() {
            return Err(CoreError::Validation("stage_timeout must be positive".into()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(CoreError::Validation(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(CoreError::Validation(
                "initial retry delay must not exceed the maximum delay".into(),
            ));
        }
        ScoreBlend::new(self.comparison.blend.ssim_weight)?;
        self.comparison.comparator.validate()
    }
}
