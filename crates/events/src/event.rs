//! Typed stage-completion events.

use serde::{Deserialize, Serialize};
use tokenlift_core::checkpoint::{
    CheckpointStatus, CheckpointUpdate, ComparisonResult, ComparisonSummary, ExtractedTokens,
    IdentifiedComponent, ScreenshotInfo, PROGRESS_COMPARISON, PROGRESS_COMPLETE,
    PROGRESS_EXTRACTION, PROGRESS_SCREENSHOT, PROGRESS_VISION,
};

/// Emitted by the pipeline after each stage, in stage order.
///
/// Each variant carries exactly the data its stage produced, so an
/// observer can rebuild the checkpoint from the event stream alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PipelineEvent {
    /// The run began; the checkpoint is still `pending`.
    Start { url: String },
    Screenshot { screenshot: ScreenshotInfo },
    Vision { components: Vec<IdentifiedComponent> },
    Extraction { tokens: ExtractedTokens },
    Comparison {
        results: Vec<ComparisonResult>,
        summary: ComparisonSummary,
    },
    Complete,
    Error { message: String },
}

impl PipelineEvent {
    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Start { .. } => "start",
            PipelineEvent::Screenshot { .. } => "screenshot",
            PipelineEvent::Vision { .. } => "vision",
            PipelineEvent::Extraction { .. } => "extraction",
            PipelineEvent::Comparison { .. } => "comparison",
            PipelineEvent::Complete => "complete",
            PipelineEvent::Error { .. } => "error",
        }
    }

    /// Checkpoint status the event moves the job into; `None` for `start`.
    pub fn target_status(&self) -> Option<CheckpointStatus> {
        match self {
            PipelineEvent::Start { .. } => None,
            PipelineEvent::Screenshot { .. } => Some(CheckpointStatus::Screenshot),
            PipelineEvent::Vision { .. } => Some(CheckpointStatus::Vision),
            PipelineEvent::Extraction { .. } => Some(CheckpointStatus::Extraction),
            PipelineEvent::Comparison { .. } => Some(CheckpointStatus::Comparison),
            PipelineEvent::Complete => Some(CheckpointStatus::Complete),
            PipelineEvent::Error { .. } => Some(CheckpointStatus::Failed),
        }
    }

    /// The checkpoint fields this event writes. `start` writes nothing.
    pub fn to_update(&self) -> Option<CheckpointUpdate> {
        let update = match self {
            PipelineEvent::Start { .. } => return None,
            PipelineEvent::Screenshot { screenshot } => CheckpointUpdate {
                screenshot: Some(screenshot.clone()),
                ..CheckpointUpdate::stage(CheckpointStatus::Screenshot, PROGRESS_SCREENSHOT)
            },
            PipelineEvent::Vision { components } => CheckpointUpdate {
                identified_components: Some(components.clone()),
                ..CheckpointUpdate::stage(CheckpointStatus::Vision, PROGRESS_VISION)
            },
            PipelineEvent::Extraction { tokens } => CheckpointUpdate {
                extracted_tokens: Some(tokens.clone()),
                ..CheckpointUpdate::stage(CheckpointStatus::Extraction, PROGRESS_EXTRACTION)
            },
            PipelineEvent::Comparison { results, summary } => CheckpointUpdate {
                comparisons: Some(results.clone()),
                comparison_summary: Some(summary.clone()),
                ..CheckpointUpdate::stage(CheckpointStatus::Comparison, PROGRESS_COMPARISON)
            },
            PipelineEvent::Complete => {
                CheckpointUpdate::stage(CheckpointStatus::Complete, PROGRESS_COMPLETE)
            }
            PipelineEvent::Error { message } => CheckpointUpdate::failed(message.clone()),
        };
        Some(update)
    }
}
