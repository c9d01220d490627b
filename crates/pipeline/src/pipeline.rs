//! The extraction pipeline: one checkpoint, four stages, strictly in
//! sequence.
//!
//! Every external call runs under the stage [`RetryPolicy`], each attempt
//! bounded by the stage timeout, and the whole call races the job's
//! [`CancellationToken`]. After a stage succeeds its event is handed to
//! every observer in order; the first observer is always
//! [`CheckpointPersistence`], so a stage's results are durable before the
//! next stage starts. Any stage failure ends the run with a terminal
//! `failed` checkpoint. Nothing is propagated to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use tokenlift_core::checkpoint::{
    validate_transition, CheckpointStatus, ComparisonResult, ComparisonSummary, ExtractedTokens,
    IdentifiedComponent, ScreenshotInfo,
};
use tokenlift_core::collaborators::{
    ComponentIdentifier, ComponentRenderer, ImageSimilarity, PageHandle, PageRenderer,
    RenderedPage,
};
use tokenlift_core::error::{CoreError, StageError};
use tokenlift_core::hashing::sha256_hex;
use tokenlift_core::retry::RetryPolicy;
use tokenlift_core::styles::StyleExtractor;
use tokenlift_core::tokens::derive_tokens;
use tokenlift_core::visual::{crop_region, decode_image, GrayscaleSsim, VisualComparator};
use tokenlift_db::SharedStore;
use tokenlift_events::{CheckpointPersistence, PipelineEvent, PipelineObserver};

use crate::config::PipelineConfig;

/// Error message recorded on a checkpoint whose job was cancelled.
pub const CANCELLED_MESSAGE: &str = "extraction cancelled";

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External services the pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn PageRenderer>,
    pub identifier: Arc<dyn ComponentIdentifier>,
    /// Without a component renderer the comparison stage is skipped.
    pub component_renderer: Option<Arc<dyn ComponentRenderer>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("component_renderer", &self.component_renderer.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a call to [`ExtractionPipeline::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    /// The checkpoint was moved to `failed` with this message.
    Failed { message: String },
    /// The checkpoint was missing or not `pending`; nothing was written.
    NotRunnable { reason: String },
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct ExtractionPipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    store: SharedStore,
    observers: Vec<Arc<dyn PipelineObserver>>,
    retry: RetryPolicy<StageError>,
    extractor: StyleExtractor,
    comparator: VisualComparator,
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("config", &self.config)
            .field("collaborators", &self.collaborators)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl ExtractionPipeline {
    /// Build a pipeline whose first observer persists every event to
    /// `store`. Fails if `config` does not validate.
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
        store: SharedStore,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let observers: Vec<Arc<dyn PipelineObserver>> =
            vec![Arc::new(CheckpointPersistence::new(store.clone()))];
        Ok(Self {
            retry: RetryPolicy::for_stages(config.retry.clone()),
            extractor: StyleExtractor::new(config.extraction.clone()),
            comparator: VisualComparator::new(
                config.comparison.comparator.clone(),
                Arc::new(GrayscaleSsim),
            ),
            config,
            collaborators,
            store,
            observers,
        })
    }

    /// Register an additional observer, notified after persistence.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace the default [`GrayscaleSsim`] routine.
    pub fn with_image_similarity(mut self, similarity: Arc<dyn ImageSimilarity>) -> Self {
        self.comparator = VisualComparator::new(self.config.comparison.comparator.clone(), similarity);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Drive `checkpoint_id` from `pending` to a terminal state.
    pub async fn run(&self, checkpoint_id: &str, cancel: &CancellationToken) -> RunOutcome {
        let checkpoint = match self.store.load(checkpoint_id).await {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => {
                tracing::error!(checkpoint_id, "Checkpoint not found, nothing to run");
                return RunOutcome::NotRunnable {
                    reason: format!("checkpoint {checkpoint_id} not found"),
                };
            }
            Err(e) => {
                tracing::error!(checkpoint_id, error = %e, "Failed to load checkpoint");
                return RunOutcome::NotRunnable {
                    reason: e.to_string(),
                };
            }
        };

        if checkpoint.status != CheckpointStatus::Pending {
            tracing::warn!(checkpoint_id, status = %checkpoint.status, "Checkpoint is not pending, refusing to run");
            return RunOutcome::NotRunnable {
                reason: format!("checkpoint is {}", checkpoint.status),
            };
        }

        let span = tracing::info_span!("extraction", checkpoint_id, url = %checkpoint.url);
        async {
            let mut current = checkpoint.status;
            match self.execute(checkpoint_id, &checkpoint.url, &mut current, cancel).await {
                Ok(()) => {
                    tracing::info!("Extraction complete");
                    RunOutcome::Complete
                }
                Err(err) => {
                    self.fail(checkpoint_id, current, &err).await;
                    RunOutcome::Failed {
                        message: err.message,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        checkpoint_id: &str,
        url: &str,
        current: &mut CheckpointStatus,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        self.advance(checkpoint_id, current, PipelineEvent::Start { url: url.to_string() })
            .await?;

        // -- screenshot --
        tracing::debug!(stage = "screenshot", "Stage started");
        let page = self
            .with_retry("screenshot", checkpoint_id, cancel, || {
                self.collaborators.renderer.render(url)
            })
            .await?;

        // The DOM session is released once extraction is over, whatever
        // the outcome.
        let captured = self.capture(checkpoint_id, &page, current, cancel).await;
        self.release(page.dom.as_ref()).await;
        let (screenshot, components, tokens) = captured?;

        // -- comparison (optional) --
        match (&self.collaborators.component_renderer, self.config.comparison.enabled) {
            (Some(renderer), true) => {
                tracing::debug!(stage = "comparison", "Stage started");
                let (results, summary) = self
                    .compare_components(
                        checkpoint_id,
                        cancel,
                        renderer.as_ref(),
                        &screenshot,
                        &components,
                        &tokens,
                    )
                    .await?;
                self.advance(
                    checkpoint_id,
                    current,
                    PipelineEvent::Comparison { results, summary },
                )
                .await?;
            }
            _ => tracing::debug!("Comparison stage skipped"),
        }

        self.advance(checkpoint_id, current, PipelineEvent::Complete).await
    }

    /// Screenshot, vision and extraction: every stage that needs the
    /// rendered page.
    async fn capture(
        &self,
        checkpoint_id: &str,
        page: &RenderedPage,
        current: &mut CheckpointStatus,
        cancel: &CancellationToken,
    ) -> Result<(RgbaImage, Vec<IdentifiedComponent>, ExtractedTokens), StageError> {
        let screenshot = decode_image(&page.screenshot)
            .map_err(|e| StageError::permanent(format!("screenshot could not be decoded: {e}")))?;
        let info = ScreenshotInfo {
            width: screenshot.width(),
            height: screenshot.height(),
            size_bytes: page.screenshot.len() as u64,
            sha256: sha256_hex(&page.screenshot),
        };
        self.advance(checkpoint_id, current, PipelineEvent::Screenshot { screenshot: info })
            .await?;

        // -- vision --
        tracing::debug!(stage = "vision", "Stage started");
        let components = self
            .with_retry("vision", checkpoint_id, cancel, || {
                self.collaborators.identifier.identify(&page.screenshot)
            })
            .await?;
        self.advance(
            checkpoint_id,
            current,
            PipelineEvent::Vision {
                components: components.clone(),
            },
        )
        .await?;

        // -- extraction --
        tracing::debug!(stage = "extraction", "Stage started");
        let records = guarded(
            cancel,
            bounded("extraction", self.config.stage_timeout, async {
                Ok(self
                    .extractor
                    .extract_many(page.dom.as_ref(), &self.config.selectors)
                    .await)
            }),
        )
        .await?;
        let tokens = derive_tokens(&records);
        tracing::debug!(
            records = records.len(),
            colors = tokens.colors.len(),
            typography = tokens.typography.len(),
            spacing = tokens.spacing.len(),
            "Tokens derived"
        );
        self.advance(
            checkpoint_id,
            current,
            PipelineEvent::Extraction {
                tokens: tokens.clone(),
            },
        )
        .await?;

        Ok((screenshot, components, tokens))
    }

    /// Close the page session. Failures are logged, never fatal.
    async fn release(&self, dom: &dyn PageHandle) {
        match tokio::time::timeout(self.config.stage_timeout, dom.close()).await {
            Ok(Ok(())) => tracing::debug!("Page session closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to close page session"),
            Err(_) => tracing::warn!(
                timeout = ?self.config.stage_timeout,
                "Timed out closing page session"
            ),
        }
    }

    /// Score every component whose bounding box lies inside the screenshot.
    async fn compare_components(
        &self,
        checkpoint_id: &str,
        cancel: &CancellationToken,
        renderer: &dyn ComponentRenderer,
        screenshot: &RgbaImage,
        components: &[IdentifiedComponent],
        tokens: &ExtractedTokens,
    ) -> Result<(Vec<ComparisonResult>, ComparisonSummary), StageError> {
        let mut results = Vec::with_capacity(components.len());

        for component in components {
            let component_id = component.component_id();
            let original = match crop_region(screenshot, &component.bounding_box) {
                Ok(original) => original,
                Err(e) => {
                    tracing::debug!(component_id = %component_id, error = %e, "Skipping component");
                    continue;
                }
            };

            let generated = self
                .with_retry("comparison", checkpoint_id, cancel, || {
                    renderer.render_component(component, tokens)
                })
                .await?;
            let generated = decode_image(&generated).map_err(|e| {
                StageError::permanent(format!(
                    "generated image for {component_id} could not be decoded: {e}"
                ))
            })?;

            let result = self.comparator.compare_images(
                &component_id,
                &original,
                &generated,
                self.config.comparison.blend,
            );
            tracing::debug!(
                component_id = %component_id,
                ssim = result.ssim_score,
                color = result.color_score,
                combined = result.combined_score,
                passed = result.passed,
                "Component compared"
            );
            results.push(result);
        }

        let summary = self.comparator.summarize(&results);
        Ok((results, summary))
    }

    // ---- events ----

    /// Validate the transition, then hand the event to every observer.
    async fn advance(
        &self,
        checkpoint_id: &str,
        current: &mut CheckpointStatus,
        event: PipelineEvent,
    ) -> Result<(), StageError> {
        let next = event.target_status();
        if let Some(next) = next {
            validate_transition(*current, next)?;
        }

        self.notify(checkpoint_id, &event).await?;

        if let Some(next) = next {
            *current = next;
            tracing::info!(stage = event.kind(), status = %next, "Stage complete");
        }
        Ok(())
    }

    async fn notify(&self, checkpoint_id: &str, event: &PipelineEvent) -> Result<(), StageError> {
        for observer in &self.observers {
            if let Err(e) = observer.on_event(checkpoint_id, event).await {
                tracing::error!(
                    observer = observer.name(),
                    event = event.kind(),
                    error = %e,
                    "Observer failed"
                );
                return Err(StageError::permanent(format!(
                    "failed to record {} event: {e}",
                    event.kind()
                )));
            }
        }
        Ok(())
    }

    /// Record the terminal failure. Errors here can only be logged.
    async fn fail(&self, checkpoint_id: &str, current: CheckpointStatus, err: &StageError) {
        if err.message == CANCELLED_MESSAGE {
            tracing::info!(status = %current, "Extraction cancelled");
        } else {
            tracing::error!(status = %current, error = %err, "Extraction failed");
        }

        if current.is_terminal() {
            return;
        }
        let event = PipelineEvent::Error {
            message: err.message.clone(),
        };
        if let Err(e) = self.notify(checkpoint_id, &event).await {
            tracing::error!(error = %e, "Failed to record extraction failure");
        }
    }

    // ---- guarded calls ----

    /// Run an external call under the retry policy with a per-attempt
    /// timeout, racing the cancellation token.
    async fn with_retry<T, F, Fut>(
        &self,
        stage: &'static str,
        checkpoint_id: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, StageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let timeout = self.config.stage_timeout;
        let attempts = self.retry.execute_observed(
            || bounded(stage, timeout, operation()),
            |attempt, err, delay| {
                tracing::warn!(
                    checkpoint_id,
                    stage,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Stage call failed, retrying"
                );
            },
        );
        guarded(cancel, attempts).await
    }
}

/// Bound one attempt; expiry is a retryable failure.
async fn bounded<T>(
    stage: &'static str,
    timeout: Duration,
    attempt: impl Future<Output = Result<T, StageError>>,
) -> Result<T, StageError> {
    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(StageError::retryable(format!(
            "{stage} timed out after {timeout:?}"
        ))),
    }
}

/// Abandon `work` as soon as `cancel` fires.
async fn guarded<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, StageError>>,
) -> Result<T, StageError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StageError::permanent(CANCELLED_MESSAGE)),
        result = work => result,
    }
}
