//! Configuration loaded from environment variables.
//!
//! Only the binary reads the environment. Everything is parsed into typed
//! structs here and injected into the libraries, whose `Default` impls
//! match the defaults below.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use tokenlift_core::retry::RetryConfig;
use tokenlift_core::visual::{ComparatorConfig, ComparisonThresholds, ScoreBlend};
use tokenlift_pipeline::{ComparisonConfig, PipelineConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },

    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running extractions (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Which collaborator implementations the pipeline is wired with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorMode {
    /// Deterministic in-process stubs.
    DryRun,
    /// Remote renderer and vision services.
    Http {
        renderer_url: String,
        vision_url: String,
        vision_api_key: String,
    },
}

/// Everything the binary needs to assemble the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Postgres document store when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub collaborators: CollaboratorMode,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `HOST`                          | `0.0.0.0`               |
    /// | `PORT`                          | `3000`                  |
    /// | `CORS_ORIGINS`                  | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`         | `30`                    |
    /// | `DATABASE_URL`                  | unset (in-memory store) |
    /// | `EXTRACTION_DRY_RUN`            | `false`                 |
    /// | `RENDERER_URL`                  | required unless dry run |
    /// | `VISION_API_URL`                | required unless dry run |
    /// | `VISION_API_KEY`                | required unless dry run |
    /// | `RETRY_MAX_RETRIES`             | `2`                     |
    /// | `RETRY_INITIAL_DELAY_MS`        | `2000`                  |
    /// | `RETRY_MAX_DELAY_MS`            | `30000`                 |
    /// | `RETRY_BACKOFF_MULTIPLIER`      | `2.0`                   |
    /// | `STAGE_TIMEOUT_SECS`            | `120`                   |
    /// | `COMPARISON_ENABLED`            | `true`                  |
    /// | `COMPARISON_THRESHOLD`          | `0.85`                  |
    /// | `COMPARISON_OVERALL_THRESHOLD`  | `0.85`                  |
    /// | `COMPARISON_SSIM_WEIGHT`        | `0.6`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`AppConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let server = ServerConfig {
            host: env.string("HOST", "0.0.0.0"),
            port: env.parse("PORT", 3000)?,
            cors_origins: env.cors_origins()?,
            request_timeout_secs: env.parse("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: env.parse("SHUTDOWN_TIMEOUT_SECS", 30)?,
        };

        let database_url = env.optional("DATABASE_URL");

        let collaborators = if env.flag("EXTRACTION_DRY_RUN", false)? {
            CollaboratorMode::DryRun
        } else {
            CollaboratorMode::Http {
                renderer_url: env.required("RENDERER_URL")?,
                vision_url: env.required("VISION_API_URL")?,
                vision_api_key: env.required("VISION_API_KEY")?,
            }
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: env.parse("RETRY_MAX_RETRIES", retry_defaults.max_retries)?,
            initial_delay: Duration::from_millis(
                env.parse("RETRY_INITIAL_DELAY_MS", retry_defaults.initial_delay.as_millis() as u64)?,
            ),
            max_delay: Duration::from_millis(
                env.parse("RETRY_MAX_DELAY_MS", retry_defaults.max_delay.as_millis() as u64)?,
            ),
            backoff_multiplier: env
                .parse("RETRY_BACKOFF_MULTIPLIER", retry_defaults.backoff_multiplier)?,
        };

        let defaults = PipelineConfig::default();
        let ssim_weight = env.parse("COMPARISON_SSIM_WEIGHT", defaults.comparison.blend.ssim_weight)?;
        let blend = ScoreBlend::new(ssim_weight).map_err(|e| ConfigError::Invalid {
            var: "COMPARISON_SSIM_WEIGHT",
            value: ssim_weight.to_string(),
            reason: e.to_string(),
        })?;

        let thresholds = ComparisonThresholds {
            component: env.parse(
                "COMPARISON_THRESHOLD",
                defaults.comparison.comparator.thresholds.component,
            )?,
            overall: env.parse(
                "COMPARISON_OVERALL_THRESHOLD",
                defaults.comparison.comparator.thresholds.overall,
            )?,
        };

        let pipeline = PipelineConfig {
            retry,
            stage_timeout: Duration::from_secs(
                env.parse("STAGE_TIMEOUT_SECS", defaults.stage_timeout.as_secs())?,
            ),
            comparison: ComparisonConfig {
                enabled: env.flag("COMPARISON_ENABLED", true)?,
                comparator: ComparatorConfig {
                    thresholds,
                    ..defaults.comparison.comparator.clone()
                },
                blend,
            },
            ..defaults
        };
        pipeline.validate().map_err(|e| ConfigError::Invalid {
            var: "pipeline settings",
            value: String::new(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            server,
            database_url,
            collaborators,
            pipeline,
        })
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value of `var`.
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing { var })
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.optional(var) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value,
                reason: "expected true or false".into(),
            }),
        }
    }

    fn cors_origins(&self) -> Result<Vec<String>, ConfigError> {
        let origins: Vec<String> = self
            .string("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        for origin in &origins {
            HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                var: "CORS_ORIGINS",
                value: origin.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(origins)
    }
}
