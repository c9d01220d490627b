//! Per-element style capture from a rendered page.
//!
//! Extraction is advisory: a selector that matches nothing, or a page
//! handle that errors, yields `None` and is skipped. Nothing here can
//! abort the pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collaborators::{PageHandle, PseudoClass, StyleMap};

/// Properties captured when the caller does not override them. Spans
/// color, typography, spacing, border, layout and effect properties.
pub const DEFAULT_STYLE_PROPERTIES: &[&str] = &[
    // color
    "color",
    "background-color",
    "border-color",
    "outline-color",
    // typography
    "font-family",
    "font-size",
    "font-weight",
    "line-height",
    "letter-spacing",
    "text-transform",
    // spacing
    "margin",
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "padding",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "gap",
    // border
    "border-width",
    "border-style",
    "border-radius",
    // layout
    "display",
    "width",
    "height",
    // effects
    "box-shadow",
    "opacity",
];

/// One DOM element's style snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedStyleRecord {
    pub selector: String,
    pub computed_styles: StyleMap,
    /// Only pseudo-classes that resolved at least one property appear.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudo_styles: Option<BTreeMap<PseudoClass, StyleMap>>,
}

impl ExtractedStyleRecord {
    /// A record with computed styles only; handy for building token input.
    pub fn computed<I, K, V>(selector: impl Into<String>, styles: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            selector: selector.into(),
            computed_styles: styles
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            pseudo_styles: None,
        }
    }
}

/// What to capture per element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub include_computed_styles: bool,
    pub include_pseudo_styles: bool,
    pub style_properties: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            include_computed_styles: true,
            include_pseudo_styles: true,
            style_properties: DEFAULT_STYLE_PROPERTIES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

/// Captures [`ExtractedStyleRecord`]s through a [`PageHandle`].
#[derive(Debug, Clone, Default)]
pub struct StyleExtractor {
    config: ExtractionConfig,
}

impl StyleExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Capture the styles of the first element matching `selector`.
    ///
    /// Returns `None` when nothing matches or the page handle fails.
    pub async fn extract(
        &self,
        page: &dyn PageHandle,
        selector: &str,
    ) -> Option<ExtractedStyleRecord> {
        let properties: &[String] = if self.config.include_computed_styles {
            &self.config.style_properties
        } else {
            &[]
        };

        let computed = match page.computed_styles(selector, properties).await {
            Ok(Some(styles)) => resolvable(styles),
            Ok(None) => {
                tracing::debug!(selector, "Selector matched no element");
                return None;
            }
            Err(e) => {
                tracing::warn!(selector, error = %e, "Style capture failed");
                return None;
            }
        };

        let pseudo_styles = if self.config.include_pseudo_styles {
            let mut captured = BTreeMap::new();
            for pseudo in PseudoClass::ALL {
                let styles = match page
                    .pseudo_styles(selector, pseudo, &self.config.style_properties)
                    .await
                {
                    Ok(styles) => resolvable(styles),
                    Err(e) => {
                        tracing::warn!(selector, %pseudo, error = %e, "Pseudo style capture failed");
                        return None;
                    }
                };
                if !styles.is_empty() {
                    captured.insert(pseudo, styles);
                }
            }
            (!captured.is_empty()).then_some(captured)
        } else {
            None
        };

        Some(ExtractedStyleRecord {
            selector: selector.to_string(),
            computed_styles: computed,
            pseudo_styles,
        })
    }

    /// Capture every selector in order, silently skipping misses.
    pub async fn extract_many<S: AsRef<str>>(
        &self,
        page: &dyn PageHandle,
        selectors: &[S],
    ) -> Vec<ExtractedStyleRecord> {
        let mut records = Vec::with_capacity(selectors.len());
        for selector in selectors {
            if let Some(record) = self.extract(page, selector.as_ref()).await {
                records.push(record);
            }
        }
        records
    }
}

/// Drop properties that did not resolve to a value.
fn resolvable(styles: StyleMap) -> StyleMap {
    styles
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
}
