//! Visual-fidelity scoring of a generated component against its original.
//!
//! Two metrics feed the verdict:
//! - a color score from per-channel histogram intersection, computed here;
//! - a structural score from an [`ImageSimilarity`] collaborator
//!   ([`GrayscaleSsim`] by default).
//!
//! The caller supplies the [`ScoreBlend`] that combines them; this module
//! only applies the configured pass thresholds.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

use crate::checkpoint::{BoundingBox, ComparisonResult, ComparisonSummary};
use crate::collaborators::ImageSimilarity;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Histogram buckets per channel.
pub const DEFAULT_BUCKET_COUNT: usize = 256;

/// Pixels with alpha below this value are excluded from histograms.
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 128;

/// Minimum combined score for a component to pass.
pub const DEFAULT_COMPONENT_THRESHOLD: f64 = 0.85;

/// Minimum average combined score for the run as a whole to pass.
pub const DEFAULT_OVERALL_THRESHOLD: f64 = 0.85;

/// Default share of SSIM in the combined score.
pub const DEFAULT_SSIM_WEIGHT: f64 = 0.6;

const SSIM_BLOCK: u32 = 8;
const SSIM_C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const SSIM_C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VisualError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Pass/fail thresholds, both on the combined score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonThresholds {
    /// Per-component badge threshold.
    pub component: f64,
    /// Aggregate threshold over the average of all components.
    pub overall: f64,
}

impl Default for ComparisonThresholds {
    fn default() -> Self {
        Self {
            component: DEFAULT_COMPONENT_THRESHOLD,
            overall: DEFAULT_OVERALL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparatorConfig {
    pub bucket_count: usize,
    pub alpha_threshold: u8,
    pub thresholds: ComparisonThresholds,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            thresholds: ComparisonThresholds::default(),
        }
    }
}

impl ComparatorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=256).contains(&self.bucket_count) {
            return Err(CoreError::Validation(format!(
                "bucket_count must be between 1 and 256, got {}",
                self.bucket_count
            )));
        }
        for (name, value) in [
            ("component threshold", self.thresholds.component),
            ("overall threshold", self.thresholds.overall),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::Validation(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Weighting of SSIM versus color in the combined score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBlend {
    /// Share of SSIM; color gets `1 - ssim_weight`.
    pub ssim_weight: f64,
}

impl Default for ScoreBlend {
    fn default() -> Self {
        Self {
            ssim_weight: DEFAULT_SSIM_WEIGHT,
        }
    }
}

impl ScoreBlend {
    pub fn new(ssim_weight: f64) -> Result<Self, CoreError> {
        if !(0.0..=1.0).contains(&ssim_weight) {
            return Err(CoreError::Validation(format!(
                "ssim_weight must be between 0.0 and 1.0, got {ssim_weight}"
            )));
        }
        Ok(Self { ssim_weight })
    }

    pub fn combine(&self, ssim_score: f64, color_score: f64) -> f64 {
        self.ssim_weight * ssim_score + (1.0 - self.ssim_weight) * color_score
    }
}

// ---------------------------------------------------------------------------
// Histograms
// ---------------------------------------------------------------------------

/// Per-channel color distribution of the opaque-enough pixels of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorHistogram {
    pub red: Vec<f64>,
    pub green: Vec<f64>,
    pub blue: Vec<f64>,
    /// Pixels that passed the alpha filter.
    pub pixel_count: u64,
}

impl ColorHistogram {
    /// Build a normalized histogram; each channel sums to 1 unless no
    /// pixel passed the alpha filter.
    ///
    /// # Panics
    ///
    /// If `bucket_count` is outside `1..=256`.
    pub fn from_image(image: &RgbaImage, bucket_count: usize, alpha_threshold: u8) -> Self {
        assert!(
            (1..=256).contains(&bucket_count),
            "bucket_count must be in 1..=256, got {bucket_count}"
        );

        let mut red = vec![0.0; bucket_count];
        let mut green = vec![0.0; bucket_count];
        let mut blue = vec![0.0; bucket_count];
        let mut pixel_count = 0u64;

        let bucket = |channel: u8| usize::from(channel) * bucket_count / 256;

        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            if a < alpha_threshold {
                continue;
            }
            red[bucket(r)] += 1.0;
            green[bucket(g)] += 1.0;
            blue[bucket(b)] += 1.0;
            pixel_count += 1;
        }

        if pixel_count > 0 {
            let total = pixel_count as f64;
            for channel in [&mut red, &mut green, &mut blue] {
                channel.iter_mut().for_each(|v| *v /= total);
            }
        }

        Self {
            red,
            green,
            blue,
            pixel_count,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.red.len()
    }

    /// Mean histogram intersection over the three channels, in `[0, 1]`.
    ///
    /// Two histograms with no included pixels are considered identical.
    ///
    /// # Panics
    ///
    /// If the bucket counts differ; that is a programming error.
    pub fn similarity(&self, other: &ColorHistogram) -> f64 {
        match (self.pixel_count, other.pixel_count) {
            (0, 0) => return 1.0,
            (0, _) | (_, 0) => return 0.0,
            _ => {}
        }
        let r = histogram_intersection(&self.red, &other.red);
        let g = histogram_intersection(&self.green, &other.green);
        let b = histogram_intersection(&self.blue, &other.blue);
        ((r + g + b) / 3.0).clamp(0.0, 1.0)
    }
}

/// `Σ min(a[i], b[i])` over two normalized distributions.
///
/// # Panics
///
/// If the slices have different lengths.
pub fn histogram_intersection(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(
        a.len(),
        b.len(),
        "histogram bucket counts differ ({} vs {})",
        a.len(),
        b.len()
    );
    a.iter().zip(b).map(|(x, y)| x.min(*y)).sum()
}

// ---------------------------------------------------------------------------
// Image helpers
// ---------------------------------------------------------------------------

/// Decode PNG/JPEG/WebP bytes into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, VisualError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Crop `image` to `region`, clamped to the image bounds.
pub fn crop_region(image: &RgbaImage, region: &BoundingBox) -> Result<RgbaImage, VisualError> {
    let (width, height) = image.dimensions();
    let x0 = region.x.max(0.0).floor() as u32;
    let y0 = region.y.max(0.0).floor() as u32;
    let x1 = ((region.x + region.width).max(0.0).ceil() as u32).min(width);
    let y1 = ((region.y + region.height).max(0.0).ceil() as u32).min(height);

    if x0 >= x1 || y0 >= y1 {
        return Err(VisualError::InvalidRegion(format!(
            "{}x{} at ({}, {}) lies outside the {width}x{height} screenshot",
            region.width, region.height, region.x, region.y
        )));
    }

    Ok(imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image())
}

// ---------------------------------------------------------------------------
// SSIM
// ---------------------------------------------------------------------------

/// Block-wise SSIM on luma.
///
/// The second image is resized to the first one's dimensions, the luma
/// planes are split into 8x8 blocks, and the per-block SSIM values are
/// averaged and clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleSsim;

impl ImageSimilarity for GrayscaleSsim {
    fn ssim(&self, a: &RgbaImage, b: &RgbaImage) -> f64 {
        let (width, height) = a.dimensions();
        if width == 0 || height == 0 || b.width() == 0 || b.height() == 0 {
            return if a.dimensions() == b.dimensions() { 1.0 } else { 0.0 };
        }

        let luma_a = imageops::grayscale(a);
        let luma_b = if b.dimensions() == (width, height) {
            imageops::grayscale(b)
        } else {
            imageops::grayscale(&imageops::resize(b, width, height, FilterType::Triangle))
        };

        let mut total = 0.0;
        let mut blocks = 0u32;
        for by in (0..height).step_by(SSIM_BLOCK as usize) {
            for bx in (0..width).step_by(SSIM_BLOCK as usize) {
                let bw = SSIM_BLOCK.min(width - bx);
                let bh = SSIM_BLOCK.min(height - by);
                total += block_ssim(&luma_a, &luma_b, bx, by, bw, bh);
                blocks += 1;
            }
        }

        (total / f64::from(blocks)).clamp(0.0, 1.0)
    }
}

fn block_ssim(a: &GrayImage, b: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let n = f64::from(w * h);
    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    for dy in 0..h {
        for dx in 0..w {
            sum_a += f64::from(a.get_pixel(x + dx, y + dy).0[0]);
            sum_b += f64::from(b.get_pixel(x + dx, y + dy).0[0]);
        }
    }
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut cov = 0.0;
    for dy in 0..h {
        for dx in 0..w {
            let da = f64::from(a.get_pixel(x + dx, y + dy).0[0]) - mean_a;
            let db = f64::from(b.get_pixel(x + dx, y + dy).0[0]) - mean_b;
            var_a += da * da;
            var_b += db * db;
            cov += da * db;
        }
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    ((2.0 * mean_a * mean_b + SSIM_C1) * (2.0 * cov + SSIM_C2))
        / ((mean_a * mean_a + mean_b * mean_b + SSIM_C1) * (var_a + var_b + SSIM_C2))
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

/// Scores generated renderings against their originals.
#[derive(Clone)]
pub struct VisualComparator {
    config: ComparatorConfig,
    similarity: Arc<dyn ImageSimilarity>,
}

impl std::fmt::Debug for VisualComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualComparator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for VisualComparator {
    fn default() -> Self {
        Self::new(ComparatorConfig::default(), Arc::new(GrayscaleSsim))
    }
}

impl VisualComparator {
    pub fn new(config: ComparatorConfig, similarity: Arc<dyn ImageSimilarity>) -> Self {
        Self { config, similarity }
    }

    pub fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    pub fn histogram(&self, image: &RgbaImage) -> ColorHistogram {
        ColorHistogram::from_image(image, self.config.bucket_count, self.config.alpha_threshold)
    }

    /// Histogram-intersection color score in `[0, 1]`.
    pub fn color_score(&self, original: &RgbaImage, generated: &RgbaImage) -> f64 {
        self.histogram(original).similarity(&self.histogram(generated))
    }

    /// Score two decoded images.
    pub fn compare_images(
        &self,
        component_id: &str,
        original: &RgbaImage,
        generated: &RgbaImage,
        blend: ScoreBlend,
    ) -> ComparisonResult {
        let ssim_score = self.similarity.ssim(original, generated).clamp(0.0, 1.0);
        let color_score = self.color_score(original, generated);
        let combined_score = blend.combine(ssim_score, color_score);

        ComparisonResult {
            component_id: component_id.to_string(),
            ssim_score,
            color_score,
            combined_score,
            passed: combined_score >= self.config.thresholds.component,
        }
    }

    /// Decode and score two encoded images.
    pub fn compare(
        &self,
        component_id: &str,
        original: &[u8],
        generated: &[u8],
        blend: ScoreBlend,
    ) -> Result<ComparisonResult, VisualError> {
        let original = decode_image(original)?;
        let generated = decode_image(generated)?;
        Ok(self.compare_images(component_id, &original, &generated, blend))
    }

    /// Aggregate results against the overall threshold.
    ///
    /// An empty result set does not pass.
    pub fn summarize(&self, results: &[ComparisonResult]) -> ComparisonSummary {
        let total = results.len();
        let passed_count = results.iter().filter(|r| r.passed).count();
        let average_score = if total == 0 {
            0.0
        } else {
            results.iter().map(|r| r.combined_score).sum::<f64>() / total as f64
        };

        ComparisonSummary {
            average_score,
            passed_count,
            total,
            passed: total > 0 && average_score >= self.config.thresholds.overall,
        }
    }
}
