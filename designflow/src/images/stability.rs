//! Stability text-to-image backend (v1 generation API).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{truncate_body, ImageBackend, ImagePayload, ImageRequest};
use crate::config::ImageConfig;
use crate::credentials::Credentials;
use crate::errors::ImageSynthesisError;

const BACKEND: &str = "stability";
const DEFAULT_API_HOST: &str = "https://api.stability.ai";
const DEFAULT_ENGINE: &str = "stable-diffusion-v1-6";

#[derive(Debug, Serialize)]
struct TextPrompt<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    text_prompts: Vec<TextPrompt<'a>>,
    cfg_scale: u32,
    height: u32,
    width: u32,
    steps: u32,
    samples: u32,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    base64: Option<String>,
}

/// Generates images with a Stability engine.
#[derive(Debug, Clone)]
pub struct StabilityBackend {
    http: reqwest::Client,
    api_host: String,
    engine: String,
    credentials: Credentials,
}

impl StabilityBackend {
    /// Creates a backend from the image configuration.
    pub fn new(credentials: Credentials, config: &ImageConfig) -> Result<Self, ImageSynthesisError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ImageSynthesisError::transport(BACKEND, e.to_string()))?;

        Ok(Self {
            http,
            api_host: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_HOST.to_string())
                .trim_end_matches('/')
                .to_string(),
            engine: config.model.clone().unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
            credentials,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/generation/{}/text-to-image", self.api_host, self.engine)
    }
}

#[async_trait]
impl ImageBackend for StabilityBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn min_interval(&self) -> Option<Duration> {
        None
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImagePayload, ImageSynthesisError> {
        let (width, height) = request.dimensions();
        let body = GenerationBody {
            text_prompts: vec![TextPrompt { text: &request.prompt }],
            cfg_scale: 7,
            height,
            width,
            steps: 30,
            samples: 1,
        };

        debug!(engine = %self.engine, width, height, "Requesting Stability image");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.credentials.get())
            .header(reqwest::header::ACCEPT, "application/json")
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
        decode_artifacts(parsed)
    }
}

fn decode_artifacts(response: GenerationResponse) -> Result<ImagePayload, ImageSynthesisError> {
    let data = response
        .artifacts
        .into_iter()
        .find_map(|artifact| artifact.base64.filter(|b| !b.is_empty()))
        .ok_or_else(|| ImageSynthesisError::no_image(BACKEND))?;
    ImagePayload::from_base64(BACKEND, &data, "image/png")
}
