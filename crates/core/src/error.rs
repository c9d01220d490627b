//! Error taxonomy shared by every crate in the workspace.
//!
//! - [`CoreError`] covers domain-contract violations (bad input, missing
//!   records, conflicts).
//! - [`StageError`] is the error type on the collaborator boundary. It
//!   carries an explicit [`ErrorKind`] so the retry layer can decide
//!   without guessing; collaborators that cannot classify their failures
//!   report [`ErrorKind::Unclassified`] and the message heuristic in
//!   [`crate::retry::is_transient_message`] decides instead.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a collaborator failure should be treated by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient: network, timeout, connection reset, temporary unavailability.
    Retryable,
    /// Permanent: invalid input, not found, auth failure.
    NonRetryable,
    /// The collaborator did not say; fall back to message inspection.
    Unclassified,
}

/// A failure raised by an external collaborator or by a pipeline stage.
///
/// The message is surfaced verbatim in the checkpoint's `error` field when
/// the job fails, so it should read well to an operator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A transient failure worth retrying.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    /// A permanent failure; retrying cannot help.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NonRetryable, message)
    }

    /// A failure from a collaborator that exposes no structured kind.
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    /// Whether the retry layer should attempt the call again.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::Retryable => true,
            ErrorKind::NonRetryable => false,
            ErrorKind::Unclassified => crate::retry::is_transient_message(&self.message),
        }
    }
}

impl From<CoreError> for StageError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Internal(_) => StageError::unclassified(err.to_string()),
            _ => StageError::permanent(err.to_string()),
        }
    }
}
