//! OpenAI image generations backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{truncate_body, ImageBackend, ImagePayload, ImageRequest};
use crate::config::ImageConfig;
use crate::credentials::Credentials;
use crate::errors::ImageSynthesisError;

const BACKEND: &str = "openai-images";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "dall-e-3";

/// Five images per minute on the default tier.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(12);

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    prompt: &'a str,
    model: &'a str,
    n: u32,
    response_format: &'static str,
    size: &'a str,
    style: &'static str,
    quality: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
    url: Option<String>,
}

/// Generates images with the OpenAI images API.
#[derive(Debug, Clone)]
pub struct OpenAiImageBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    credentials: Credentials,
}

impl OpenAiImageBackend {
    /// Creates a backend from the image configuration.
    pub fn new(credentials: Credentials, config: &ImageConfig) -> Result<Self, ImageSynthesisError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ImageSynthesisError::transport(BACKEND, e.to_string()))?;

        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            credentials,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }
}

#[async_trait]
impl ImageBackend for OpenAiImageBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn min_interval(&self) -> Option<Duration> {
        Some(DEFAULT_MIN_INTERVAL)
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImagePayload, ImageSynthesisError> {
        let body = GenerationBody {
            prompt: &request.prompt,
            model: &self.model,
            n: 1,
            response_format: "b64_json",
            size: &request.size,
            style: "vivid",
            quality: "hd",
        };

        debug!(model = %self.model, size = %request.size, "Requesting OpenAI image");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.credentials.get())
            .json(&body)
            .send()
            .await
            .map_err(|e| ImageSynthesisError::transport(BACKEND, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageSynthesisError::status(
                BACKEND,
                status.as_u16(),
                truncate_body(&body, 2048),
            ));
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ImageSynthesisError::decode(BACKEND, e.to_string()))?;
        decode_images(parsed)
    }
}

fn decode_images(response: GenerationResponse) -> Result<ImagePayload, ImageSynthesisError> {
    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ImageSynthesisError::no_image(BACKEND))?;

    match (first.b64_json, first.url) {
        (Some(b64), _) if !b64.is_empty() => ImagePayload::from_base64(BACKEND, &b64, "image/png"),
        (_, Some(url)) if !url.is_empty() => Ok(ImagePayload::Url(url)),
        _ => Err(ImageSynthesisError::no_image(BACKEND)),
    }
}
