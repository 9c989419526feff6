//! OpenAI chat completions over server-sent events.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, trace};

use super::{ChatRequest, TextGenerator};
use crate::config::TextConfig;
use crate::credentials::Credentials;
use crate::errors::GenerationError;
use crate::helpers::FragmentStream;

const PROVIDER: &str = "openai";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Streams chat completions from an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl OpenAiChatClient {
    /// Creates a client for the configured base URL.
    pub fn new(credentials: Credentials, config: &TextConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatClient {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream, GenerationError> {
        debug!(
            model = %request.model,
            turns = request.messages.len(),
            max_tokens = ?request.max_tokens,
            "Opening chat completion stream"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.credentials.get())
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::transport(PROVIDER, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Chat completion request rejected");
            return Err(GenerationError::provider(PROVIDER, Some(status.as_u16()), body));
        }

        let fragments = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| future::ready(!matches!(event, Ok(e) if e.data == DONE_MARKER)))
            .filter_map(|event| {
                let item = match event {
                    Ok(event) => parse_chunk(&event.data).transpose(),
                    Err(e) => Some(Err(GenerationError::transport(
                        PROVIDER,
                        format!("SSE stream error: {e}"),
                    ))),
                };
                future::ready(item)
            });

        Ok(fragments.boxed())
    }
}

/// Parses one SSE data payload into its content delta.
///
/// Keepalive and role-only chunks carry no content and yield `None`. An
/// `error` object inside the stream becomes a provider error.
fn parse_chunk(data: &str) -> Result<Option<String>, GenerationError> {
    trace!("OpenAI SSE: {:?}", data);

    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        GenerationError::provider(PROVIDER, None, format!("SSE parsing error: {e}, data: {data}"))
    })?;

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(serde_json::Value::as_str)
            .or_else(|| err.as_str())
            .unwrap_or("An error occurred during streaming");
        return Err(GenerationError::provider(PROVIDER, None, message));
    }

    let chunk: ChatChunk = serde_json::from_value(value)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let data = r#"{"object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"<div>"}}]}"#;
        assert_eq!(parse_chunk(data).unwrap(), Some("<div>".to_string()));
    }

    #[test]
    fn test_parse_role_only_delta_is_none() {
        let data = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(data).unwrap(), None);
    }

    #[test]
    fn test_parse_empty_choices_is_none() {
        assert_eq!(parse_chunk(r#"{"choices":[]}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_error_object() {
        let err = parse_chunk(r#"{"error":{"message":"Rate limit reached"}}"#).unwrap_err();
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[test]
    fn test_parse_error_string() {
        let err = parse_chunk(r#"{"error":"overloaded"}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Provider { .. }));
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_chunk("not json").is_err());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = TextConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..TextConfig::default()
        };
        let client = OpenAiChatClient::new(Credentials::new("sk"), &config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
