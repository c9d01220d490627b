use async_trait::async_trait;
use tokenlift_db::StoreError;

use crate::event::PipelineEvent;

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}

/// Consumer of pipeline events.
///
/// The pipeline awaits every observer, in registration order, before it
/// starts the next stage. An observer error is reported back to the
/// pipeline, which decides whether the run can continue.
#[async_trait]
pub trait PipelineObserver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn on_event(&self, checkpoint_id: &str, event: &PipelineEvent) -> Result<(), ObserverError>;
}
