#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use tokenlift_core::checkpoint::{Checkpoint, CheckpointStatus, IdentifiedComponent};
use tokenlift_core::collaborators::{
    ComponentIdentifier, ImageSimilarity, PageHandle, PageRenderer, PseudoClass, RenderedPage,
    StyleMap,
};
use tokenlift_core::error::StageError;
use tokenlift_core::retry::RetryConfig;
use tokenlift_db::{CheckpointStore, MemoryCheckpointStore, SharedStore};
use tokenlift_events::{ObserverError, PipelineEvent, PipelineObserver};
use tokenlift_pipeline::stubs::{StubComponentIdentifier, StubPageRenderer};
use tokenlift_pipeline::{Collaborators, PipelineConfig};

/// Pipeline config with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        },
        stage_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn memory_store() -> (Arc<MemoryCheckpointStore>, SharedStore) {
    let store = Arc::new(MemoryCheckpointStore::new());
    let shared: SharedStore = store.clone();
    (store, shared)
}

pub async fn seed_checkpoint(store: &dyn CheckpointStore, id: &str) {
    store
        .create(&Checkpoint::with_id(id, "https://example.com", Utc::now()))
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Recording observer
// ---------------------------------------------------------------------------

/// Snapshots the stored checkpoint after each event, i.e. what a polling
/// consumer would see.
pub struct Recorder {
    store: SharedStore,
    pub snapshots: Mutex<Vec<(String, CheckpointStatus, u8)>>,
}

impl Recorder {
    pub fn new(store: SharedStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            snapshots: Mutex::new(Vec::new()),
        })
    }

    pub fn snapshots(&self) -> Vec<(String, CheckpointStatus, u8)> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineObserver for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn on_event(&self, checkpoint_id: &str, event: &PipelineEvent) -> Result<(), ObserverError> {
        let checkpoint = self
            .store
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| ObserverError::Other("checkpoint vanished".into()))?;
        self.snapshots.lock().unwrap().push((
            event.kind().to_string(),
            checkpoint.status,
            checkpoint.progress,
        ));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Fails with `error` for the first `failures` calls, then renders the
/// stub page. `hang_first` makes the first call never finish instead.
pub struct FlakyRenderer {
    pub calls: AtomicU32,
    pub failures: u32,
    pub error: StageError,
    pub hang_first: bool,
}

impl FlakyRenderer {
    pub fn failing(failures: u32, error: StageError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures,
            error,
            hang_first: false,
        })
    }

    pub fn hanging_once() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures: 0,
            error: StageError::permanent("unused"),
            hang_first: true,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for FlakyRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang_first && call == 1 {
            std::future::pending::<()>().await;
        }
        if call <= self.failures {
            return Err(self.error.clone());
        }
        StubPageRenderer.render(url).await
    }
}

/// Renders the stub screenshot with a DOM that never answers.
pub struct StalledDomRenderer;

struct StalledPage;

#[async_trait]
impl PageHandle for StalledPage {
    async fn computed_styles(
        &self,
        _selector: &str,
        _properties: &[String],
    ) -> Result<Option<StyleMap>, StageError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }

    async fn pseudo_styles(
        &self,
        _selector: &str,
        _pseudo: PseudoClass,
        _properties: &[String],
    ) -> Result<StyleMap, StageError> {
        Ok(StyleMap::new())
    }
}

#[async_trait]
impl PageRenderer for StalledDomRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, StageError> {
        let page = StubPageRenderer.render(url).await?;
        Ok(RenderedPage {
            screenshot: page.screenshot,
            dom: Arc::new(StalledPage),
        })
    }
}

/// Identifier that always fails with the given error.
pub struct FailingIdentifier {
    pub calls: AtomicU32,
    pub error: StageError,
}

impl FailingIdentifier {
    pub fn new(error: StageError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            error,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComponentIdentifier for FailingIdentifier {
    async fn identify(&self, _screenshot: &[u8]) -> Result<Vec<IdentifiedComponent>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

pub fn with_renderer(renderer: Arc<dyn PageRenderer>) -> Collaborators {
    Collaborators {
        renderer,
        ..tokenlift_pipeline::stubs::dry_run_collaborators()
    }
}

pub fn with_identifier(identifier: Arc<dyn ComponentIdentifier>) -> Collaborators {
    Collaborators {
        renderer: Arc::new(StubPageRenderer),
        identifier,
        component_renderer: Some(Arc::new(tokenlift_pipeline::stubs::StubComponentRenderer)),
    }
}

pub fn stub_identifier() -> Arc<dyn ComponentIdentifier> {
    Arc::new(StubComponentIdentifier)
}

/// Renderer whose call panics, standing in for a bug inside a stage.
pub struct PanickingRenderer;

#[async_trait]
impl PageRenderer for PanickingRenderer {
    async fn render(&self, _url: &str) -> Result<RenderedPage, StageError> {
        panic!("renderer state corrupted");
    }
}

/// Stub page whose `close` calls are counted.
pub struct TrackedPage {
    inner: Arc<dyn PageHandle>,
    pub closes: AtomicU32,
}

#[async_trait]
impl PageHandle for TrackedPage {
    async fn computed_styles(
        &self,
        selector: &str,
        properties: &[String],
    ) -> Result<Option<StyleMap>, StageError> {
        self.inner.computed_styles(selector, properties).await
    }

    async fn pseudo_styles(
        &self,
        selector: &str,
        pseudo: PseudoClass,
        properties: &[String],
    ) -> Result<StyleMap, StageError> {
        self.inner.pseudo_styles(selector, pseudo, properties).await
    }

    async fn close(&self) -> Result<(), StageError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Renders the stub page and keeps every handed-out [`TrackedPage`].
#[derive(Default)]
pub struct TrackedRenderer {
    pub pages: Mutex<Vec<Arc<TrackedPage>>>,
}

impl TrackedRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `close` count per rendered page, in render order.
    pub fn closes(&self) -> Vec<u32> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.closes.load(Ordering::SeqCst))
            .collect()
    }
}

#[async_trait]
impl PageRenderer for TrackedRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, StageError> {
        let page = StubPageRenderer.render(url).await?;
        let tracked = Arc::new(TrackedPage {
            inner: page.dom,
            closes: AtomicU32::new(0),
        });
        self.pages.lock().unwrap().push(tracked.clone());
        Ok(RenderedPage {
            screenshot: page.screenshot,
            dom: tracked,
        })
    }
}

/// Similarity that always reports the same score.
pub struct FixedSimilarity(pub f64);

impl ImageSimilarity for FixedSimilarity {
    fn ssim(&self, _a: &image::RgbaImage, _b: &image::RgbaImage) -> f64 {
        self.0
    }
}
