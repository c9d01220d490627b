//! Orchestration of extraction jobs.
//!
//! - [`ExtractionPipeline`]: drives one checkpoint through
//!   `screenshot -> vision -> extraction -> comparison -> complete`.
//! - [`ExtractionService`]: creates checkpoints, spawns pipeline runs,
//!   and owns their cancellation tokens.
//! - [`stubs`]: deterministic collaborators for dry runs.

pub mod config;
pub mod pipeline;
pub mod service;
pub mod stubs;

pub use config::{ComparisonConfig, PipelineConfig};
pub use pipeline::{Collaborators, ExtractionPipeline, RunOutcome, CANCELLED_MESSAGE};
pub use service::{ExtractionService, ServiceError};
