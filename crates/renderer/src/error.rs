use tokenlift_core::error::{ErrorKind, StageError};

/// Errors from the renderer and vision HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The service answered 2xx but the payload was unusable.
    #[error("{service} sent an invalid payload: {message}")]
    InvalidPayload {
        service: &'static str,
        message: String,
    },
}

/// Retry classification of an HTTP status code.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        408 | 425 | 429 | 502 | 503 | 504 => ErrorKind::Retryable,
        400..=499 => ErrorKind::NonRetryable,
        _ => ErrorKind::Unclassified,
    }
}

impl RendererError {
    /// Transport failures (connect, send, reset mid-body, timeout) are
    /// transient. A response that could not be decoded or a request that
    /// could not be built never succeeds on retry.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RendererError::Request(e) if e.is_decode() || e.is_builder() => ErrorKind::NonRetryable,
            RendererError::Request(e)
                if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() =>
            {
                ErrorKind::Retryable
            }
            RendererError::Request(_) => ErrorKind::Unclassified,
            RendererError::Api { status, .. } => classify_status(*status),
            RendererError::InvalidPayload { .. } => ErrorKind::NonRetryable,
        }
    }

    /// Display text followed by every underlying cause, e.g.
    /// `HTTP request failed: error sending request ...: connection reset by peer`.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }
}

impl From<RendererError> for StageError {
    fn from(err: RendererError) -> Self {
        StageError::new(err.kind(), err.detailed_message())
    }
}
