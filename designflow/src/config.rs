//! Configuration for text stages, image synthesis and call policies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::GenerationError;
use crate::html::DEFAULT_PLACEHOLDER_PATTERN;
use crate::pipeline::DEFAULT_SYSTEM_PROMPT;
use crate::policy::RetryConfig;

/// Top-level configuration shared by every session of a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Text model settings.
    #[serde(default)]
    pub text: TextConfig,
    /// Number of refinement passes after the wireframe.
    #[serde(default = "default_refine_passes")]
    pub refine_passes: usize,
    /// System instruction sent as the first turn of every call.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Image synthesis settings.
    #[serde(default)]
    pub image: ImageConfig,
    /// Retry policy for provider calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_refine_passes() -> usize {
    1
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            text: TextConfig::default(),
            refine_passes: default_refine_passes(),
            system_prompt: default_system_prompt(),
            image: ImageConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, GenerationError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would make every run fail.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.text.model.trim().is_empty() {
            return Err(GenerationError::Config("text.model must not be empty".to_string()));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(GenerationError::Config("system_prompt must not be empty".to_string()));
        }
        for (field, seconds) in [
            ("text.timeout_seconds", self.text.timeout_seconds),
            ("image.timeout_seconds", self.image.timeout_seconds),
        ] {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(GenerationError::Config(format!(
                    "{field} must be a positive number of seconds, got {seconds}"
                )));
            }
        }
        if let Err(e) = regex::Regex::new(&self.image.placeholder_pattern) {
            return Err(GenerationError::Config(format!(
                "image.placeholder_pattern is not a valid regex: {e}"
            )));
        }
        Ok(())
    }

    /// Sets the number of refinement passes.
    #[must_use]
    pub fn with_refine_passes(mut self, passes: usize) -> Self {
        self.refine_passes = passes;
        self
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the text model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.text.model = model.into();
        self
    }

    /// Sets the image configuration.
    #[must_use]
    pub fn with_image(mut self, image: ImageConfig) -> Self {
        self.image = image;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API base URL.
    #[serde(default = "default_text_base_url")]
    pub base_url: String,
    /// Output token cap for the outline stage.
    #[serde(default = "default_outline_max_tokens")]
    pub outline_max_tokens: Option<u32>,
    /// Output token cap for every later stage.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
}

fn default_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

fn default_text_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_outline_max_tokens() -> Option<u32> {
    Some(4095)
}

fn default_timeout() -> f64 {
    300.0
}

/// Out-of-range values fall back to the default; `validate` reports them.
fn timeout_from_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|timeout| !timeout.is_zero())
        .unwrap_or_else(|| Duration::from_secs_f64(default_timeout()))
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_text_base_url(),
            outline_max_tokens: default_outline_max_tokens(),
            max_tokens: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl TextConfig {
    /// Gets the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        timeout_from_secs(self.timeout_seconds)
    }
}

/// Which image backend a pool is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageBackendKind {
    /// Stability text-to-image.
    #[default]
    Stability,
    /// OpenAI image generations.
    OpenAi,
    /// Keep the placeholder URL; no synthesis.
    Passthrough,
}

/// What the tree walker does when one image fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFailurePolicy {
    /// Leave the failed element's original source and keep going.
    #[default]
    KeepPlaceholder,
    /// Fail the whole document once every in-flight call has settled.
    FailDocument,
}

/// Image synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: ImageBackendKind,
    /// Backend model or engine identifier; `None` picks the backend default.
    #[serde(default)]
    pub model: Option<String>,
    /// API base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Requested output size, `WIDTHxHEIGHT`.
    #[serde(default = "default_size")]
    pub size: String,
    /// Minimum spacing between call starts; `None` uses the backend's own.
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    /// Regex recognizing placeholder URLs; group 1 is the width, group 2 the optional height.
    #[serde(default = "default_placeholder_pattern")]
    pub placeholder_pattern: String,
    /// Partial failure policy.
    #[serde(default)]
    pub failure_policy: ImageFailurePolicy,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
}

fn default_size() -> String {
    "1024x1024".to_string()
}

fn default_placeholder_pattern() -> String {
    DEFAULT_PLACEHOLDER_PATTERN.to_string()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            backend: ImageBackendKind::default(),
            model: None,
            base_url: None,
            size: default_size(),
            min_interval_ms: None,
            placeholder_pattern: default_placeholder_pattern(),
            failure_policy: ImageFailurePolicy::default(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ImageConfig {
    /// Creates an image configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: ImageBackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: ImageFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the minimum call spacing.
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval_ms.map(Duration::from_millis)
    }

    /// Gets the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        timeout_from_secs(self.timeout_seconds)
    }
}
