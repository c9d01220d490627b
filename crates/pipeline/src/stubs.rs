//! Deterministic collaborators for dry runs.
//!
//! The stub "page" is a 320x200 mock-up with a header, a primary button
//! and a card. Its DOM answers a fixed style table, the identifier reports
//! the button and the card at their true positions, and the component
//! renderer paints each component with a token color, so a dry run walks
//! every stage and ends `complete` with passing comparisons.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};

use tokenlift_core::checkpoint::{BoundingBox, ExtractedTokens, IdentifiedComponent};
use tokenlift_core::collaborators::{
    ComponentIdentifier, ComponentRenderer, PageHandle, PageRenderer, PseudoClass, RenderedPage,
    StyleMap,
};
use tokenlift_core::error::StageError;

use crate::pipeline::Collaborators;

const PAGE_WIDTH: u32 = 320;
const PAGE_HEIGHT: u32 = 200;

const BACKGROUND: [u8; 4] = [248, 250, 252, 255];
const HEADER: (BoundingBox, [u8; 4]) = (rect(0.0, 0.0, 320.0, 40.0), [30, 41, 59, 255]);
const BUTTON: (BoundingBox, [u8; 4]) = (rect(20.0, 80.0, 120.0, 40.0), [59, 130, 246, 255]);
const CARD: (BoundingBox, [u8; 4]) = (rect(180.0, 60.0, 120.0, 100.0), [255, 255, 255, 255]);

const NEUTRAL: [u8; 4] = [128, 128, 128, 255];

const fn rect(x: f64, y: f64, width: f64, height: f64) -> BoundingBox {
    BoundingBox {
        x,
        y,
        width,
        height,
    }
}

/// Stub collaborators wired for a dry run.
pub fn dry_run_collaborators() -> Collaborators {
    Collaborators {
        renderer: Arc::new(StubPageRenderer),
        identifier: Arc::new(StubComponentIdentifier),
        component_renderer: Some(Arc::new(StubComponentRenderer)),
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, StageError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| StageError::permanent(format!("failed to encode stub image: {e}")))?;
    Ok(buf)
}

fn fill(image: &mut RgbaImage, area: &BoundingBox, color: [u8; 4]) {
    let x0 = area.x as u32;
    let y0 = area.y as u32;
    let x1 = ((area.x + area.width) as u32).min(image.width());
    let y1 = ((area.y + area.height) as u32).min(image.height());
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, Rgba(color));
        }
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct StubPageRenderer;

#[async_trait]
impl PageRenderer for StubPageRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, StageError> {
        tracing::debug!(url, "Rendering stub page");
        let mut page = RgbaImage::from_pixel(PAGE_WIDTH, PAGE_HEIGHT, Rgba(BACKGROUND));
        for (area, color) in [HEADER, BUTTON, CARD] {
            fill(&mut page, &area, color);
        }
        Ok(RenderedPage {
            screenshot: encode_png(&page)?,
            dom: Arc::new(StubPage::new()),
        })
    }
}

/// Fixed style table standing in for a live DOM.
#[derive(Debug, Clone)]
pub struct StubPage {
    computed: BTreeMap<&'static str, Vec<(&'static str, &'static str)>>,
    pseudo: BTreeMap<(&'static str, PseudoClass), Vec<(&'static str, &'static str)>>,
}

impl StubPage {
    pub fn new() -> Self {
        let typography = |size: &'static str, weight: &'static str, line_height: &'static str| {
            [
                ("font-family", "Inter"),
                ("font-size", size),
                ("font-weight", weight),
                ("line-height", line_height),
            ]
        };

        let mut computed = BTreeMap::new();
        let mut body = vec![
            ("color", "rgb(15, 23, 42)"),
            ("background-color", "rgb(248, 250, 252)"),
            ("margin", "0px"),
        ];
        body.extend(typography("16px", "400", "24px"));
        computed.insert("body", body);
        computed.insert(
            "header",
            vec![("background-color", "rgb(30, 41, 59)"), ("padding", "16px 24px")],
        );
        let mut h1 = vec![("color", "rgb(15, 23, 42)"), ("margin", "0px 0px 16px")];
        h1.extend(typography("32px", "700", "40px"));
        computed.insert("h1", h1);
        let mut p = vec![("color", "rgb(71, 85, 105)")];
        p.extend(typography("16px", "400", "24px"));
        computed.insert("p", p);
        computed.insert("a", vec![("color", "rgb(37, 99, 235)")]);
        let mut button = vec![
            ("color", "rgb(255, 255, 255)"),
            ("background-color", "rgb(59, 130, 246)"),
            ("padding", "8px 16px"),
            ("border-radius", "6px"),
        ];
        button.extend(typography("14px", "600", "20px"));
        computed.insert("button", button.clone());
        computed.insert(".btn", button);
        computed.insert(
            ".card",
            vec![
                ("background-color", "#FFFFFF"),
                ("padding", "24px"),
                ("border-radius", "8px"),
            ],
        );

        let mut pseudo = BTreeMap::new();
        for selector in ["button", ".btn"] {
            pseudo.insert(
                (selector, PseudoClass::Hover),
                vec![("background-color", "rgb(37, 99, 235)")],
            );
            pseudo.insert(
                (selector, PseudoClass::Focus),
                vec![("outline-color", "rgb(147, 197, 253)")],
            );
            pseudo.insert((selector, PseudoClass::Disabled), vec![("opacity", "0.5")]);
        }

        Self { computed, pseudo }
    }
}

impl Default for StubPage {
    fn default() -> Self {
        Self::new()
    }
}

fn select(entries: &[(&str, &str)], properties: &[String]) -> StyleMap {
    entries
        .iter()
        .filter(|(name, _)| properties.iter().any(|p| p == name))
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}

#[async_trait]
impl PageHandle for StubPage {
    async fn computed_styles(
        &self,
        selector: &str,
        properties: &[String],
    ) -> Result<Option<StyleMap>, StageError> {
        Ok(self
            .computed
            .get(selector)
            .map(|entries| select(entries, properties)))
    }

    async fn pseudo_styles(
        &self,
        selector: &str,
        pseudo: PseudoClass,
        properties: &[String],
    ) -> Result<StyleMap, StageError> {
        Ok(self
            .pseudo
            .iter()
            .find(|((s, p), _)| *s == selector && *p == pseudo)
            .map(|(_, entries)| select(entries, properties))
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct StubComponentIdentifier;

#[async_trait]
impl ComponentIdentifier for StubComponentIdentifier {
    async fn identify(&self, _screenshot: &[u8]) -> Result<Vec<IdentifiedComponent>, StageError> {
        Ok(vec![
            IdentifiedComponent {
                component_type: "button".into(),
                name: "primary".into(),
                bounding_box: BUTTON.0,
                confidence: 0.97,
            },
            IdentifiedComponent {
                component_type: "card".into(),
                name: "feature".into(),
                bounding_box: CARD.0,
                confidence: 0.91,
            },
        ])
    }
}

// ---------------------------------------------------------------------------
// Component renderer
// ---------------------------------------------------------------------------

/// Paints the component's box with the lowest-sorting color token used by
/// the selector matching its type (`button`, `.card`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct StubComponentRenderer;

fn token_color(tokens: &ExtractedTokens, component_type: &str) -> Option<[u8; 4]> {
    let class = format!(".{component_type}");
    let (hex, _) = tokens
        .colors
        .iter()
        .find(|(_, selectors)| selectors.iter().any(|s| s == component_type || *s == class))?;
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?, 255])
}

#[async_trait]
impl ComponentRenderer for StubComponentRenderer {
    async fn render_component(
        &self,
        component: &IdentifiedComponent,
        tokens: &ExtractedTokens,
    ) -> Result<Vec<u8>, StageError> {
        let width = component.bounding_box.width.max(1.0) as u32;
        let height = component.bounding_box.height.max(1.0) as u32;
        let color = token_color(tokens, &component.component_type).unwrap_or(NEUTRAL);
        encode_png(&RgbaImage::from_pixel(width, height, Rgba(color)))
    }
}
