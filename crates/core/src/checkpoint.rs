//! The extraction checkpoint: identity, state machine, and accumulated
//! results of one extraction job.
//!
//! The checkpoint is the only channel through which job progress and
//! failures reach consumers, so its JSON shape (camelCase) is the read
//! model polled by the HTTP layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{CheckpointId, Timestamp};

// ---------------------------------------------------------------------------
// Progress constants
// ---------------------------------------------------------------------------

pub const PROGRESS_PENDING: u8 = 0;
pub const PROGRESS_SCREENSHOT: u8 = 20;
pub const PROGRESS_VISION: u8 = 40;
pub const PROGRESS_EXTRACTION: u8 = 60;
/// Progress once the optional comparison stage has finished.
pub const PROGRESS_COMPARISON: u8 = 90;
pub const PROGRESS_COMPLETE: u8 = 100;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Pipeline state of a checkpoint.
///
/// ```text
/// pending -> screenshot -> vision -> extraction -> comparison -> complete
///                  (any non-terminal state) -> failed
/// ```
///
/// `comparison` is optional: `extraction -> complete` is also legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Pending,
    Screenshot,
    Vision,
    Extraction,
    Comparison,
    Complete,
    Failed,
}

impl CheckpointStatus {
    pub const ALL: [CheckpointStatus; 7] = [
        CheckpointStatus::Pending,
        CheckpointStatus::Screenshot,
        CheckpointStatus::Vision,
        CheckpointStatus::Extraction,
        CheckpointStatus::Comparison,
        CheckpointStatus::Complete,
        CheckpointStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Screenshot => "screenshot",
            CheckpointStatus::Vision => "vision",
            CheckpointStatus::Extraction => "extraction",
            CheckpointStatus::Comparison => "comparison",
            CheckpointStatus::Complete => "complete",
            CheckpointStatus::Failed => "failed",
        }
    }

    /// `complete` and `failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, CheckpointStatus::Complete | CheckpointStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: CheckpointStatus) -> bool {
        use CheckpointStatus::*;

        if self.is_terminal() {
            return false;
        }
        match next {
            Failed => true,
            Screenshot => self == Pending,
            Vision => self == Screenshot,
            Extraction => self == Vision,
            Comparison => self == Extraction,
            Complete => matches!(self, Extraction | Comparison),
            Pending => false,
        }
    }

    /// Whether token data may exist in this state.
    pub fn has_tokens(self) -> bool {
        matches!(
            self,
            CheckpointStatus::Extraction | CheckpointStatus::Comparison | CheckpointStatus::Complete
        )
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckpointStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unknown checkpoint status '{s}'. Valid statuses: {}",
                    CheckpointStatus::ALL.map(|s| s.as_str()).join(", ")
                ))
            })
    }
}

/// Validate a transition, returning a [`CoreError::Conflict`] when illegal.
pub fn validate_transition(from: CheckpointStatus, to: CheckpointStatus) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Illegal checkpoint transition {from} -> {to}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// Pixel rectangle inside a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A UI component located on the screenshot by the identifier service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedComponent {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    pub bounding_box: BoundingBox,
    pub confidence: f64,
}

impl IdentifiedComponent {
    /// Stable id used to key comparison results: `<type>:<name>`.
    pub fn component_id(&self) -> String {
        format!("{}:{}", self.component_type, self.name)
    }
}

/// Metadata about the captured page screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotInfo {
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Typography attributes keyed by `fontFamily_fontSize_fontWeight`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypographyToken {
    pub font_family: String,
    pub font_size: String,
    pub font_weight: String,
    pub line_height: String,
}

/// The design-token bundle produced by the extraction stage.
///
/// Colors and spacing map a normalized value to the selectors using it,
/// in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTokens {
    pub colors: BTreeMap<String, Vec<String>>,
    pub typography: BTreeMap<String, TypographyToken>,
    pub spacing: BTreeMap<String, Vec<String>>,
}

/// Visual-fidelity result for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub component_id: String,
    pub ssim_score: f64,
    pub color_score: f64,
    pub combined_score: f64,
    pub passed: bool,
}

/// Aggregate over all comparison results, judged by the overall threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub average_score: f64,
    pub passed_count: usize,
    pub total: usize,
    pub passed: bool,
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable record of one extraction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub url: String,
    pub status: CheckpointStatus,
    pub progress: u8,
    pub started_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identified_components: Option<Vec<IdentifiedComponent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_tokens: Option<ExtractedTokens>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparisons: Option<Vec<ComparisonResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_summary: Option<ComparisonSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Checkpoint {
    /// A fresh `pending` checkpoint with a newly generated id.
    ///
    /// Ids are UUID v7, so they are unique and sort by creation time.
    pub fn new(url: impl Into<String>, now: Timestamp) -> Self {
        Self::with_id(uuid::Uuid::now_v7().to_string(), url, now)
    }

    pub fn with_id(id: impl Into<String>, url: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            status: CheckpointStatus::Pending,
            progress: PROGRESS_PENDING,
            started_at: now,
            updated_at: now,
            screenshot: None,
            identified_components: None,
            extracted_tokens: None,
            comparisons: None,
            comparison_summary: None,
            error: None,
        }
    }

    /// Merge the populated fields of `update` and refresh `updated_at`.
    ///
    /// This is the single merge rule shared by every store backend.
    pub fn apply(&mut self, update: &CheckpointUpdate, now: Timestamp) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(PROGRESS_COMPLETE);
        }
        if let Some(screenshot) = &update.screenshot {
            self.screenshot = Some(screenshot.clone());
        }
        if let Some(components) = &update.identified_components {
            self.identified_components = Some(components.clone());
        }
        if let Some(tokens) = &update.extracted_tokens {
            self.extracted_tokens = Some(tokens.clone());
        }
        if let Some(comparisons) = &update.comparisons {
            self.comparisons = Some(comparisons.clone());
        }
        if let Some(summary) = &update.comparison_summary {
            self.comparison_summary = Some(summary.clone());
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        self.updated_at = now;
    }
}

/// Partial checkpoint fields; `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointUpdate {
    pub status: Option<CheckpointStatus>,
    pub progress: Option<u8>,
    pub screenshot: Option<ScreenshotInfo>,
    pub identified_components: Option<Vec<IdentifiedComponent>>,
    pub extracted_tokens: Option<ExtractedTokens>,
    pub comparisons: Option<Vec<ComparisonResult>>,
    pub comparison_summary: Option<ComparisonSummary>,
    pub error: Option<String>,
}

impl CheckpointUpdate {
    /// Status + progress, the common core of every stage update.
    pub fn stage(status: CheckpointStatus, progress: u8) -> Self {
        Self {
            status: Some(status),
            progress: Some(progress),
            ..Default::default()
        }
    }

    /// Terminal failure with a human-readable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(CheckpointStatus::Failed),
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Filter for administrative listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckpointFilter {
    pub status: Option<CheckpointStatus>,
    /// Maximum rows returned; `None` means unbounded.
    pub limit: Option<usize>,
}

impl CheckpointFilter {
    pub fn matches(&self, checkpoint: &Checkpoint) -> bool {
        self.status.map_or(true, |status| checkpoint.status == status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
