//! Image synthesis: backends and the paced synthesizer in front of them.

#[cfg(feature = "http")]
mod openai;
mod passthrough;
#[cfg(feature = "http")]
mod stability;
mod synthesizer;

#[cfg(feature = "http")]
pub use openai::OpenAiImageBackend;
pub use passthrough::PassthroughBackend;
#[cfg(feature = "http")]
pub use stability::StabilityBackend;
pub use synthesizer::ImageSynthesizer;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::Duration;

use crate::errors::ImageSynthesisError;

/// One image to synthesize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Text description of the image.
    pub prompt: String,
    /// Requested size, `WIDTHxHEIGHT`.
    pub size: String,
    /// The element's source before synthesis, if any.
    pub current_src: Option<String>,
}

impl ImageRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(prompt: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: size.into(),
            current_src: None,
        }
    }

    /// Sets the current source.
    #[must_use]
    pub fn with_current_src(mut self, src: Option<String>) -> Self {
        self.current_src = src;
        self
    }

    /// Parses `size` into width and height, falling back to 1024x1024.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.size
            .split_once('x')
            .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)))
            .unwrap_or((1024, 1024))
    }
}

/// What a backend produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Raw image bytes returned inline by the provider.
    Inline {
        /// Decoded image bytes.
        bytes: Vec<u8>,
        /// MIME type of the image.
        mime_type: String,
    },
    /// A ready-made URL; nothing to embed.
    Url(String),
}

impl ImagePayload {
    /// Decodes a base64 payload returned by a provider.
    pub fn from_base64(
        backend: &str,
        data: &str,
        mime_type: impl Into<String>,
    ) -> Result<Self, ImageSynthesisError> {
        let bytes = STANDARD
            .decode(data.trim().as_bytes())
            .map_err(|e| ImageSynthesisError::decode(backend, format!("base64 decode failed: {e}")))?;
        Ok(Self::Inline {
            bytes,
            mime_type: mime_type.into(),
        })
    }

    /// Returns a value usable as an `src`: a data URI or the URL itself.
    #[must_use]
    pub fn to_reference(&self) -> String {
        match self {
            Self::Inline { bytes, mime_type } => {
                format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
            }
            Self::Url(url) => url.clone(),
        }
    }
}

/// A provider that turns a description into an image.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Minimum spacing between call starts the provider tolerates.
    fn min_interval(&self) -> Option<Duration>;

    /// Generates one image.
    async fn generate(&self, request: &ImageRequest) -> Result<ImagePayload, ImageSynthesisError>;
}

/// Keeps at most `max` characters of a diagnostic body.
#[cfg(feature = "http")]
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    if body.chars().count() <= max {
        body.to_string()
    } else {
        let mut out: String = body.chars().take(max).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_payload_becomes_data_uri() {
        let payload = ImagePayload::from_base64("test", "aGVsbG8=", "image/png").unwrap();
        assert_eq!(payload.to_reference(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_url_payload_passes_through() {
        let payload = ImagePayload::Url("https://picsum.photos/320/240".to_string());
        assert_eq!(payload.to_reference(), "https://picsum.photos/320/240");
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let err = ImagePayload::from_base64("stability", "***", "image/png").unwrap_err();
        assert!(matches!(err, ImageSynthesisError::Decode { .. }));
    }

    #[test]
    fn test_request_dimensions() {
        assert_eq!(ImageRequest::new("p", "512x768").dimensions(), (512, 768));
        assert_eq!(ImageRequest::new("p", "garbage").dimensions(), (1024, 1024));
    }
}
