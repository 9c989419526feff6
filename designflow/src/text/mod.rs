//! Text generation seam.
//!
//! The pipeline only needs "send these turns, get a stream of fragments
//! back". Transport details live in the implementations.

#[cfg(feature = "http")]
mod openai;

#[cfg(feature = "http")]
pub use openai::OpenAiChatClient;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::ConversationTurn;
use crate::errors::GenerationError;
use crate::helpers::FragmentStream;

/// A streamed chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Every turn of the conversation so far, in order.
    pub messages: Vec<ConversationTurn>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Always true; the pipeline consumes fragments incrementally.
    pub stream: bool,
}

impl ChatRequest {
    /// Creates a streaming request.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ConversationTurn>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            stream: true,
        }
    }

    /// Sets the output token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A backend that streams chat completions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Opens a streamed completion for `request`.
    ///
    /// Authentication, rate-limit and request errors are reported either
    /// here or as an `Err` item of the returned stream.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_openai_shape() {
        let request = ChatRequest::new(
            "gpt-4-turbo-preview",
            vec![ConversationTurn::system("sys"), ConversationTurn::user("bakery")],
        )
        .with_max_tokens(Some(4095));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4-turbo-preview",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "bakery"}
                ],
                "max_tokens": 4095,
                "stream": true
            })
        );
    }

    #[test]
    fn test_request_omits_unset_max_tokens() {
        let request = ChatRequest::new("m", vec![]);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("max_tokens").is_none());
    }
}
