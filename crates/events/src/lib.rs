//! Pipeline events and the observers that consume them.
//!
//! - [`PipelineEvent`]: what a stage reports when it finishes.
//! - [`PipelineObserver`]: awaited, in-order consumer of those events.
//! - [`CheckpointPersistence`]: observer turning events into
//!   checkpoint store updates.
//! - [`EventBus`]: observer re-publishing every event on a
//!   `tokio::sync::broadcast` channel for in-process subscribers.

pub mod bus;
pub mod event;
pub mod logger;
pub mod observer;
pub mod persistence;

pub use bus::{EventBus, ExtractionEvent};
pub use event::PipelineEvent;
pub use logger::EventLogger;
pub use observer::{ObserverError, PipelineObserver};
pub use persistence::CheckpointPersistence;
