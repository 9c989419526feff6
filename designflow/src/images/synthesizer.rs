//! Paced, retry-aware front for an image backend.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ImageBackend, ImageRequest};
use crate::config::ImageConfig;
use crate::errors::ImageSynthesisError;
use crate::policy::{with_retry, MinIntervalPacer, NoPacing, Pacer, RetryConfig};

/// Turns a description into an `src` value.
///
/// Every call, retries included, waits on the pacer first, so a shared
/// synthesizer rations the provider's throughput across all concurrent
/// callers.
#[derive(Clone)]
pub struct ImageSynthesizer {
    backend: Arc<dyn ImageBackend>,
    pacer: Arc<dyn Pacer>,
    retry: RetryConfig,
    size: String,
}

impl ImageSynthesizer {
    /// Creates a synthesizer paced by the backend's own minimum interval.
    #[must_use]
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        let pacer = pacer_for(backend.min_interval());
        Self {
            backend,
            pacer,
            retry: RetryConfig::default(),
            size: "1024x1024".to_string(),
        }
    }

    /// Creates a synthesizer from configuration; a configured interval
    /// overrides the backend's.
    #[must_use]
    pub fn from_config(backend: Arc<dyn ImageBackend>, config: &ImageConfig, retry: RetryConfig) -> Self {
        let interval = config.min_interval().or_else(|| backend.min_interval());
        Self {
            pacer: pacer_for(interval),
            backend,
            retry,
            size: config.size.clone(),
        }
    }

    /// Replaces the pacing policy.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the requested output size.
    #[must_use]
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Synthesizes an image for `prompt` and returns an embeddable reference.
    pub async fn synthesize(
        &self,
        prompt: &str,
        current_src: Option<&str>,
    ) -> Result<String, ImageSynthesisError> {
        let request = ImageRequest::new(prompt, self.size.clone())
            .with_current_src(current_src.map(str::to_string));

        let (backend, pacer, request) = (&self.backend, &self.pacer, &request);
        let payload = with_retry(&self.retry, backend.name(), || async move {
            pacer.acquire().await;
            backend.generate(request).await
        })
        .await
        .map_err(|e| {
            warn!(backend = self.backend.name(), error = %e, "Image synthesis failed");
            e
        })?;

        debug!(backend = self.backend.name(), prompt_len = prompt.len(), "Image synthesized");
        Ok(payload.to_reference())
    }
}

impl fmt::Debug for ImageSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSynthesizer")
            .field("backend", &self.backend.name())
            .field("pacer", &self.pacer)
            .field("retry", &self.retry)
            .field("size", &self.size)
            .finish()
    }
}

fn pacer_for(interval: Option<std::time::Duration>) -> Arc<dyn Pacer> {
    match interval {
        Some(interval) if !interval.is_zero() => Arc::new(MinIntervalPacer::new(interval)),
        _ => Arc::new(NoPacing),
    }
}
