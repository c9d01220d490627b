//! Reduction of raw style records into deduplicated design tokens.

use std::collections::BTreeMap;

use crate::checkpoint::{ExtractedTokens, TypographyToken};
use crate::styles::ExtractedStyleRecord;

/// Properties inspected for color tokens.
pub const COLOR_PROPERTIES: &[&str] = &["color", "background-color", "border-color", "outline-color"];

/// Properties inspected for spacing tokens. Shorthands are split on
/// whitespace so `8px 16px` contributes both values.
pub const SPACING_PROPERTIES: &[&str] = &[
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
    "row-gap",
    "column-gap",
];

const IGNORED_SPACING_VALUES: &[&str] = &["0", "0px", "auto", "normal", "initial", "inherit"];

const DEFAULT_LINE_HEIGHT: &str = "normal";

/// Normalize a CSS color to lowercase `#rrggbb`.
///
/// `rgb()`/`rgba()` are folded into hex with the alpha channel dropped;
/// hex input is lowercased as-is. Fully transparent values and anything
/// unparseable return `None`.
pub fn normalize_color(value: &str) -> Option<String> {
    let value = value.trim().to_lowercase();

    if value.is_empty() || value == "transparent" {
        return None;
    }
    if value.starts_with('#') {
        return Some(value);
    }

    let inner = value
        .strip_prefix("rgba(")
        .or_else(|| value.strip_prefix("rgb("))?
        .strip_suffix(')')?;

    let parts: Vec<&str> = inner
        .split([',', ' ', '/'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 3 {
        return None;
    }

    if let Some(alpha) = parts.get(3) {
        if parse_alpha(alpha) == Some(0.0) {
            return None;
        }
    }

    let r = parse_channel(parts[0])?;
    let g = parse_channel(parts[1])?;
    let b = parse_channel(parts[2])?;
    Some(format!("#{r:02x}{g:02x}{b:02x}"))
}

fn parse_channel(raw: &str) -> Option<u8> {
    let value: f64 = raw.parse().ok()?;
    Some(value.round().clamp(0.0, 255.0) as u8)
}

fn parse_alpha(raw: &str) -> Option<f64> {
    match raw.strip_suffix('%') {
        Some(percent) => percent.parse::<f64>().ok().map(|p| p / 100.0),
        None => raw.parse().ok(),
    }
}

/// Append `selector` to the entry for `key` unless already present.
fn record_usage(map: &mut BTreeMap<String, Vec<String>>, key: String, selector: &str) {
    let selectors = map.entry(key).or_default();
    if !selectors.iter().any(|s| s == selector) {
        selectors.push(selector.to_string());
    }
}

/// Map each normalized hex color to the selectors that use it.
pub fn derive_colors(records: &[ExtractedStyleRecord]) -> BTreeMap<String, Vec<String>> {
    let mut colors = BTreeMap::new();
    for record in records {
        for property in COLOR_PROPERTIES {
            let Some(raw) = record.computed_styles.get(*property) else {
                continue;
            };
            if let Some(hex) = normalize_color(raw) {
                record_usage(&mut colors, hex, &record.selector);
            }
        }
    }
    colors
}

/// Typography tokens keyed by `fontFamily_fontSize_fontWeight`.
///
/// The first record seen for a key wins; later records with the same key
/// are dropped even if their line height differs. Records missing any of
/// the three key attributes are skipped.
pub fn derive_typography(records: &[ExtractedStyleRecord]) -> BTreeMap<String, TypographyToken> {
    let mut typography = BTreeMap::new();
    for record in records {
        let styles = &record.computed_styles;
        let (Some(family), Some(size), Some(weight)) = (
            styles.get("font-family"),
            styles.get("font-size"),
            styles.get("font-weight"),
        ) else {
            continue;
        };

        let key = format!("{family}_{size}_{weight}");
        typography.entry(key).or_insert_with(|| TypographyToken {
            font_family: family.clone(),
            font_size: size.clone(),
            font_weight: weight.clone(),
            line_height: styles
                .get("line-height")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LINE_HEIGHT.to_string()),
        });
    }
    typography
}

/// Map each distinct spacing value to the selectors that use it.
pub fn derive_spacing(records: &[ExtractedStyleRecord]) -> BTreeMap<String, Vec<String>> {
    let mut spacing = BTreeMap::new();
    for record in records {
        for property in SPACING_PROPERTIES {
            let Some(raw) = record.computed_styles.get(*property) else {
                continue;
            };
            for value in raw.split_whitespace() {
                let value = value.to_lowercase();
                if IGNORED_SPACING_VALUES.contains(&value.as_str()) {
                    continue;
                }
                record_usage(&mut spacing, value, &record.selector);
            }
        }
    }
    spacing
}

/// Build the full token bundle.
pub fn derive_tokens(records: &[ExtractedStyleRecord]) -> ExtractedTokens {
    ExtractedTokens {
        colors: derive_colors(records),
        typography: derive_typography(records),
        spacing: derive_spacing(records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_and_hex_normalize_to_same_key() {
        assert_eq!(normalize_color("rgb(59,130,246)").as_deref(), Some("#3b82f6"));
        assert_eq!(normalize_color("#3B82F6").as_deref(), Some("#3b82f6"));
        assert_eq!(
            normalize_color("rgb(59, 130, 246)"),
            normalize_color("#3b82f6")
        );
    }

    #[test]
    fn rgba_drops_alpha() {
        assert_eq!(
            normalize_color("rgba(0, 0, 0, 0.5)").as_deref(),
            Some("#000000")
        );
        assert_eq!(normalize_color("rgb(255 0 0 / 50%)").as_deref(), Some("#ff0000"));
    }

    #[test]
    fn transparent_values_are_skipped() {
        assert_eq!(normalize_color("rgba(0, 0, 0, 0)"), None);
        assert_eq!(normalize_color("transparent"), None);
        assert_eq!(normalize_color("TRANSPARENT"), None);
    }

    #[test]
    fn garbage_is_skipped() {
        assert_eq!(normalize_color("currentcolor"), None);
        assert_eq!(normalize_color("rgb(1,2)"), None);
        assert_eq!(normalize_color(""), None);
    }

    #[test]
    fn colors_accumulate_selectors_across_syntaxes() {
        let records = vec![
            ExtractedStyleRecord::computed(".btn", [("background-color", "rgb(59,130,246)")]),
            ExtractedStyleRecord::computed(".link", [("color", "#3b82f6")]),
        ];
        let colors = derive_colors(&records);

        assert_eq!(colors.len(), 1);
        assert_eq!(colors["#3b82f6"], vec![".btn", ".link"]);
    }

    #[test]
    fn selector_listed_once_per_color() {
        let records = vec![ExtractedStyleRecord::computed(
            ".badge",
            [("color", "#fff"), ("border-color", "#FFF")],
        )];
        assert_eq!(derive_colors(&records)["#fff"], vec![".badge"]);
    }

    #[test]
    fn non_color_properties_are_ignored() {
        let records = vec![ExtractedStyleRecord::computed(
            ".x",
            [("box-shadow", "rgb(0, 0, 0) 0px 1px 2px")],
        )];
        assert!(derive_colors(&records).is_empty());
    }

    #[test]
    fn typography_first_seen_wins() {
        let records = vec![
            ExtractedStyleRecord::computed(
                "h1",
                [
                    ("font-family", "Inter"),
                    ("font-size", "32px"),
                    ("font-weight", "700"),
                    ("line-height", "40px"),
                ],
            ),
            ExtractedStyleRecord::computed(
                ".hero-title",
                [
                    ("font-family", "Inter"),
                    ("font-size", "32px"),
                    ("font-weight", "700"),
                    ("line-height", "36px"),
                ],
            ),
        ];
        let typography = derive_typography(&records);

        assert_eq!(typography.len(), 1);
        assert_eq!(typography["Inter_32px_700"].line_height, "40px");
    }

    #[test]
    fn typography_defaults_line_height_and_skips_incomplete() {
        let records = vec![
            ExtractedStyleRecord::computed(
                "p",
                [("font-family", "Inter"), ("font-size", "16px"), ("font-weight", "400")],
            ),
            ExtractedStyleRecord::computed("span", [("font-size", "12px")]),
        ];
        let typography = derive_typography(&records);

        assert_eq!(typography.len(), 1);
        assert_eq!(typography["Inter_16px_400"].line_height, "normal");
    }

    #[test]
    fn spacing_splits_shorthands_and_skips_zero() {
        let records = vec![
            ExtractedStyleRecord::computed(".card", [("padding", "16px 24px"), ("margin", "0px")]),
            ExtractedStyleRecord::computed(".stack", [("gap", "16px")]),
        ];
        let spacing = derive_spacing(&records);

        assert_eq!(spacing["16px"], vec![".card", ".stack"]);
        assert_eq!(spacing["24px"], vec![".card"]);
        assert!(!spacing.contains_key("0px"));
    }
}
