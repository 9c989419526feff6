//! Error types for the designflow pipeline.
//!
//! Provider and transport failures are fatal to the current run. A missing
//! fenced block is never an error, and partial image failures are governed by
//! [`ImageFailurePolicy`](crate::config::ImageFailurePolicy).

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for designflow operations.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// A generation backend answered with a failure.
    #[error("Generation failed ({provider}{}): {detail}", status_suffix(.status))]
    Provider {
        /// The provider name (e.g. "openai").
        provider: String,
        /// HTTP status, when the failure came with one.
        status: Option<u16>,
        /// Provider-supplied detail, usually the raw error body.
        detail: String,
    },

    /// The request never produced a provider answer (connect, TLS, stream cut).
    #[error("Transport error ({provider}): {message}")]
    Transport {
        /// The provider name.
        provider: String,
        /// The error message.
        message: String,
    },

    /// Image synthesis failed under the fail-document policy.
    #[error("{0}")]
    Image(#[from] ImageSynthesisError),

    /// `generate` was invoked while a run was still in flight.
    #[error("Session {session} is already running")]
    AlreadyRunning {
        /// Index of the session in its pool, or 0 for standalone sessions.
        session: usize,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GenerationError {
    /// Creates a provider error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status,
            detail: detail.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry policy may attempt the call again.
    ///
    /// Transport failures, rate limits and server errors are retryable;
    /// authentication and malformed requests are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Provider { status, .. } => is_retryable_status(*status),
            Self::Image(err) => err.is_retryable(),
            Self::AlreadyRunning { .. } | Self::Config(_) | Self::Serialization(_) => false,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::Provider { provider, status, detail } => {
                map.insert("type".to_string(), serde_json::json!("ProviderError"));
                map.insert("provider".to_string(), serde_json::json!(provider));
                map.insert("status".to_string(), serde_json::json!(status));
                map.insert("detail".to_string(), serde_json::json!(detail));
            }
            Self::Transport { provider, message } => {
                map.insert("type".to_string(), serde_json::json!("TransportError"));
                map.insert("provider".to_string(), serde_json::json!(provider));
                map.insert("reason".to_string(), serde_json::json!(message));
            }
            Self::Image(err) => {
                map.extend(err.to_dict());
            }
            Self::AlreadyRunning { session } => {
                map.insert("type".to_string(), serde_json::json!("AlreadyRunning"));
                map.insert("session".to_string(), serde_json::json!(session));
            }
            Self::Config(reason) => {
                map.insert("type".to_string(), serde_json::json!("ConfigError"));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Serialization(reason) => {
                map.insert("type".to_string(), serde_json::json!("SerializationError"));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by image backends.
#[derive(Debug, Clone, Error)]
pub enum ImageSynthesisError {
    /// The backend answered with a non-success status.
    #[error("Non-200 response from {backend} ({status}): {body}")]
    Status {
        /// The backend name.
        backend: String,
        /// The HTTP status code.
        status: u16,
        /// The raw response body, kept for diagnostics.
        body: String,
    },

    /// The backend succeeded but returned no image.
    #[error("No image returned by {backend}")]
    NoImage {
        /// The backend name.
        backend: String,
    },

    /// The request could not be completed.
    #[error("Transport error ({backend}): {message}")]
    Transport {
        /// The backend name.
        backend: String,
        /// The error message.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Decode error ({backend}): {message}")]
    Decode {
        /// The backend name.
        backend: String,
        /// The error message.
        message: String,
    },
}

impl ImageSynthesisError {
    /// Creates a status error.
    #[must_use]
    pub fn status(backend: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            backend: backend.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates a no-image error.
    #[must_use]
    pub fn no_image(backend: impl Into<String>) -> Self {
        Self::NoImage { backend: backend.into() }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend(&self) -> &str {
        match self {
            Self::Status { backend, .. }
            | Self::NoImage { backend }
            | Self::Transport { backend, .. }
            | Self::Decode { backend, .. } => backend,
        }
    }

    /// Whether a retry policy may attempt the call again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => is_retryable_status(Some(*status)),
            Self::NoImage { .. } | Self::Decode { .. } => false,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::Status { backend, status, body } => {
                map.insert("type".to_string(), serde_json::json!("ImageStatusError"));
                map.insert("backend".to_string(), serde_json::json!(backend));
                map.insert("status".to_string(), serde_json::json!(status));
                map.insert("body".to_string(), serde_json::json!(body));
            }
            Self::NoImage { backend } => {
                map.insert("type".to_string(), serde_json::json!("ImageMissing"));
                map.insert("backend".to_string(), serde_json::json!(backend));
            }
            Self::Transport { backend, message } => {
                map.insert("type".to_string(), serde_json::json!("ImageTransportError"));
                map.insert("backend".to_string(), serde_json::json!(backend));
                map.insert("reason".to_string(), serde_json::json!(message));
            }
            Self::Decode { backend, message } => {
                map.insert("type".to_string(), serde_json::json!("ImageDecodeError"));
                map.insert("backend".to_string(), serde_json::json!(backend));
                map.insert("reason".to_string(), serde_json::json!(message));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(", status {s}")).unwrap_or_default()
}

fn is_retryable_status(status: Option<u16>) -> bool {
    matches!(status, Some(429 | 500..=599))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = GenerationError::provider("openai", Some(401), "invalid api key");
        assert_eq!(
            err.to_string(),
            "Generation failed (openai, status 401): invalid api key"
        );

        let err = GenerationError::provider("openai", None, "stream error");
        assert_eq!(err.to_string(), "Generation failed (openai): stream error");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::provider("openai", Some(429), "slow down").is_retryable());
        assert!(GenerationError::provider("openai", Some(503), "busy").is_retryable());
        assert!(!GenerationError::provider("openai", Some(401), "auth").is_retryable());
        assert!(GenerationError::transport("openai", "connection reset").is_retryable());
        assert!(!GenerationError::AlreadyRunning { session: 0 }.is_retryable());
        assert!(!ImageSynthesisError::no_image("stability").is_retryable());
    }

    #[test]
    fn test_image_status_error_keeps_body() {
        let err = ImageSynthesisError::status("stability", 400, "{\"message\":\"bad prompt\"}");
        assert!(err.to_string().contains("bad prompt"));
        assert_eq!(err.backend(), "stability");

        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "ImageStatusError");
        assert_eq!(dict.get("status"), Some(&serde_json::json!(400)));
    }

    #[test]
    fn test_image_error_wraps_into_generation_error() {
        let err: GenerationError = ImageSynthesisError::no_image("openai-images").into();
        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "ImageMissing");
        assert_eq!(dict.get("backend").unwrap(), "openai-images");
    }
}
