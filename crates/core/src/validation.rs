//! Input validation for extraction requests.

use url::Url;

use crate::error::CoreError;

/// Maximum accepted length of a source URL.
pub const MAX_URL_LENGTH: usize = 2048;

/// Parse and validate the page URL an extraction is started for.
///
/// Only absolute `http`/`https` URLs with a host are accepted. Returns the
/// normalized serialization produced by the URL parser.
pub fn validate_source_url(raw: &str) -> Result<String, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::Validation("url must not be empty".into()));
    }
    if raw.len() > MAX_URL_LENGTH {
        return Err(CoreError::Validation(format!(
            "url exceeds {MAX_URL_LENGTH} characters"
        )));
    }

    let parsed = Url::parse(raw)
        .map_err(|e| CoreError::Validation(format!("Invalid url '{raw}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CoreError::Validation(format!(
                "Unsupported url scheme '{other}'. Expected http or https"
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Validation(format!("url '{raw}' has no host")));
    }

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert_eq!(
            validate_source_url("https://example.com").unwrap(),
            "https://example.com/"
        );
        assert!(validate_source_url("  http://localhost:3000/pricing ").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        assert_matches!(
            validate_source_url("file:///etc/passwd"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            validate_source_url("javascript:alert(1)"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn rejects_garbage_and_empty() {
        assert_matches!(validate_source_url(""), Err(CoreError::Validation(_)));
        assert_matches!(validate_source_url("not a url"), Err(CoreError::Validation(_)));
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert_matches!(validate_source_url(&long), Err(CoreError::Validation(_)));
    }
}
