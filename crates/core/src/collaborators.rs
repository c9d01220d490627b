//! Interfaces of the external services the extraction pipeline drives.
//!
//! Implementations live outside this crate: HTTP clients in
//! `tokenlift-renderer`, deterministic stubs for dry runs in
//! `tokenlift-pipeline`. Every method reports failures as [`StageError`]
//! so the retry layer can classify them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{ExtractedTokens, IdentifiedComponent};
use crate::error::StageError;

/// Interaction states whose styles are captured in addition to the
/// computed (resting) styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PseudoClass {
    Hover,
    Focus,
    Active,
    Disabled,
}

impl PseudoClass {
    pub const ALL: [PseudoClass; 4] = [
        PseudoClass::Hover,
        PseudoClass::Focus,
        PseudoClass::Active,
        PseudoClass::Disabled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PseudoClass::Hover => "hover",
            PseudoClass::Focus => "focus",
            PseudoClass::Active => "active",
            PseudoClass::Disabled => "disabled",
        }
    }
}

impl fmt::Display for PseudoClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CSS property name -> resolved value.
pub type StyleMap = BTreeMap<String, String>;

/// Live handle onto a rendered page's DOM.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Computed values of `properties` on the first element matching
    /// `selector`, or `Ok(None)` when nothing matches.
    async fn computed_styles(
        &self,
        selector: &str,
        properties: &[String],
    ) -> Result<Option<StyleMap>, StageError>;

    /// Values of `properties` while the element is forced into `pseudo`.
    async fn pseudo_styles(
        &self,
        selector: &str,
        pseudo: PseudoClass,
        properties: &[String],
    ) -> Result<StyleMap, StageError>;

    /// Release the page on the rendering side. Called once, after the
    /// last stage that reads the DOM. Handles with nothing to release
    /// keep the default.
    async fn close(&self) -> Result<(), StageError> {
        Ok(())
    }
}

/// Output of [`PageRenderer::render`].
pub struct RenderedPage {
    /// Encoded full-page screenshot (PNG, JPEG or WebP).
    pub screenshot: Vec<u8>,
    pub dom: Arc<dyn PageHandle>,
}

impl fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedPage")
            .field("screenshot_bytes", &self.screenshot.len())
            .finish_non_exhaustive()
    }
}

/// Headless-browser renderer.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, StageError>;
}

/// Vision/labeling service locating UI components on a screenshot.
#[async_trait]
pub trait ComponentIdentifier: Send + Sync {
    async fn identify(&self, screenshot: &[u8]) -> Result<Vec<IdentifiedComponent>, StageError>;
}

/// Renders the generated counterpart of a component from the extracted
/// tokens, for side-by-side comparison with the original.
#[async_trait]
pub trait ComponentRenderer: Send + Sync {
    async fn render_component(
        &self,
        component: &IdentifiedComponent,
        tokens: &ExtractedTokens,
    ) -> Result<Vec<u8>, StageError>;
}

/// Structural similarity between two decoded images, in `[0, 1]`.
pub trait ImageSimilarity: Send + Sync {
    fn ssim(&self, a: &image::RgbaImage, b: &image::RgbaImage) -> f64;
}
