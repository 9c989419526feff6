//! A backend that keeps the element's existing source.

use async_trait::async_trait;
use std::time::Duration;

use super::{ImageBackend, ImagePayload, ImageRequest};
use crate::errors::ImageSynthesisError;

/// Returns the element's current source unchanged.
///
/// Useful when placeholder images are good enough or no image provider is
/// available. Elements without a source report [`ImageSynthesisError::NoImage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughBackend;

#[async_trait]
impl ImageBackend for PassthroughBackend {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn min_interval(&self) -> Option<Duration> {
        None
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImagePayload, ImageSynthesisError> {
        request
            .current_src
            .clone()
            .filter(|src| !src.is_empty())
            .map(ImagePayload::Url)
            .ok_or_else(|| ImageSynthesisError::no_image(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_current_src() {
        let request = ImageRequest::new("a cat", "1024x1024")
            .with_current_src(Some("https://picsum.photos/200".to_string()));
        let payload = PassthroughBackend.generate(&request).await.unwrap();
        assert_eq!(payload, ImagePayload::Url("https://picsum.photos/200".to_string()));
    }

    #[tokio::test]
    async fn test_missing_src_is_no_image() {
        let request = ImageRequest::new("a cat", "1024x1024");
        let err = PassthroughBackend.generate(&request).await.unwrap_err();
        assert!(matches!(err, ImageSynthesisError::NoImage { .. }));
    }
}
