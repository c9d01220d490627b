//! Bounded retry with exponential backoff for calls to external
//! collaborators.
//!
//! A [`RetryPolicy`] is stateless and cheap to clone; one instance can
//! wrap any number of calls. Each failure is passed to the policy's
//! classifier: retryable failures are retried after
//! `min(initial_delay * backoff_multiplier^n, max_delay)` until
//! `max_retries` is exhausted, anything else is returned immediately.
//! The last error is always handed back unchanged.
//!
//! The wrapped operation may run more than once. Making it idempotent is
//! the caller's job.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StageError;

/// Lowercase substrings that mark an error message as transient.
pub const TRANSIENT_MESSAGE_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "etimedout",
    "econnreset",
    "connection reset",
    "temporarily unavailable",
];

/// Default classifier heuristic: does the message look transient?
///
/// Case-insensitive substring match against [`TRANSIENT_MESSAGE_MARKERS`].
pub fn is_transient_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_MESSAGE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Delay before retry number `retry_index` (zero-based).
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn backoff_delay(retry_index: u32, config: &RetryConfig) -> Duration {
    let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
    let uncapped_ms =
        config.initial_delay.as_millis() as f64 * config.backoff_multiplier.powi(exponent);
    let capped_ms = uncapped_ms.min(config.max_delay.as_millis() as f64);
    Duration::from_millis(capped_ms as u64)
}

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry executor; see the module docs.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    classifier: Classifier<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: fmt::Display> RetryPolicy<E> {
    /// A policy using the message-substring classifier.
    ///
    /// Suitable for third-party errors that expose nothing but a message.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_classifier(config, |err: &E| is_transient_message(&err.to_string()))
    }
}

impl RetryPolicy<StageError> {
    /// A policy that honours the structured [`ErrorKind`](crate::error::ErrorKind)
    /// carried by [`StageError`], falling back to the message heuristic only
    /// for unclassified failures.
    pub fn for_stages(config: RetryConfig) -> Self {
        Self::with_classifier(config, StageError::is_retryable)
    }
}

impl<E> RetryPolicy<E> {
    /// A policy with an explicit classifier predicate.
    pub fn with_classifier<C>(config: RetryConfig, classifier: C) -> Self
    where
        C: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            classifier: Arc::new(classifier),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether the classifier considers `err` worth retrying.
    pub fn is_retryable(&self, err: &E) -> bool {
        (self.classifier)(err)
    }

    /// Delay before retry number `retry_index` (zero-based).
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        backoff_delay(retry_index, &self.config)
    }

    /// Run `operation` until it succeeds, fails permanently, or retries
    /// run out.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_observed(operation, |_, _, _| {}).await
    }

    /// Like [`execute`](Self::execute), invoking `on_retry` with
    /// `(failed_attempt_number, error, delay)` before each backoff sleep.
    ///
    /// Attempt numbers are 1-based: the first call is attempt 1.
    pub async fn execute_observed<T, F, Fut, O>(
        &self,
        mut operation: F,
        mut on_retry: O,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        O: FnMut(u32, &E, Duration),
    {
        let mut retries_used = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if retries_used >= self.config.max_retries || !self.is_retryable(&err) {
                return Err(err);
            }

            let delay = self.delay_for(retries_used);
            retries_used += 1;
            on_retry(retries_used, &err, delay);
            tokio::time::sleep(delay).await;
        }
    }
}
