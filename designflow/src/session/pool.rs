//! A fixed set of sessions sharing one set of credentials.

use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

use super::session::GenerationSession;
use super::state::SessionState;
use crate::config::GeneratorConfig;
use crate::credentials::Credentials;
use crate::errors::GenerationError;
use crate::events::EventSink;
use crate::html::ImageRewriter;
use crate::images::ImageSynthesizer;
use crate::pipeline::StageSequencer;
use crate::text::TextGenerator;

/// Environment variable read for the Stability key when the pool is built
/// from configuration.
pub const STABILITY_KEY_VAR: &str = "STABILITY_API_KEY";

/// Runs the same prompt through several independent sessions.
///
/// Sessions share the text client, the image synthesizer (and with it the
/// image pacing budget) and the credentials handle. Nothing else is shared:
/// a failing session never touches another session's state.
#[derive(Debug)]
pub struct GenerationPool {
    sessions: Vec<GenerationSession>,
    credentials: Credentials,
}

impl GenerationPool {
    /// Creates a pool from ready-made sessions.
    #[must_use]
    pub fn new(sessions: Vec<GenerationSession>, credentials: Credentials) -> Self {
        Self {
            sessions,
            credentials,
        }
    }

    /// Builds `size` sessions over a shared text generator and synthesizer.
    pub fn from_parts(
        size: usize,
        text: Arc<dyn TextGenerator>,
        synthesizer: ImageSynthesizer,
        config: &GeneratorConfig,
        credentials: Credentials,
    ) -> Result<Self, GenerationError> {
        config.validate()?;
        let rewriter = ImageRewriter::from_config(synthesizer, &config.image)?;
        let sequencer = StageSequencer::new(text, config);

        let sessions = (0..size)
            .map(|index| GenerationSession::new(index, sequencer.clone(), rewriter.clone()))
            .collect();
        Ok(Self::new(sessions, credentials))
    }

    /// Builds `size` sessions talking to OpenAI for text and to the image
    /// backend named in `config`.
    ///
    /// The OpenAI image backend shares `credentials`; the Stability backend
    /// reads its own key from `STABILITY_API_KEY`.
    #[cfg(feature = "http")]
    pub fn openai(
        size: usize,
        config: &GeneratorConfig,
        credentials: Credentials,
    ) -> Result<Self, GenerationError> {
        use crate::config::ImageBackendKind;
        use crate::images::{ImageBackend, OpenAiImageBackend, PassthroughBackend, StabilityBackend};
        use crate::text::OpenAiChatClient;

        config.validate()?;
        let text = Arc::new(OpenAiChatClient::new(credentials.clone(), &config.text)?);
        let backend: Arc<dyn ImageBackend> = match config.image.backend {
            ImageBackendKind::Stability => Arc::new(StabilityBackend::new(
                Credentials::from_env(STABILITY_KEY_VAR),
                &config.image,
            )?),
            ImageBackendKind::OpenAi => {
                Arc::new(OpenAiImageBackend::new(credentials.clone(), &config.image)?)
            }
            ImageBackendKind::Passthrough => Arc::new(PassthroughBackend),
        };
        let synthesizer = ImageSynthesizer::from_config(backend, &config.image, config.retry.clone());

        info!(
            sessions = size,
            model = %config.text.model,
            image_backend = synthesizer.backend_name(),
            "Generation pool ready"
        );
        Self::from_parts(size, text, synthesizer, config, credentials)
    }

    /// Routes every session's events to `sink`.
    #[must_use]
    pub fn with_event_sink(self, sink: Arc<dyn EventSink>) -> Self {
        Self {
            sessions: self
                .sessions
                .into_iter()
                .map(|session| session.with_event_sink(sink.clone()))
                .collect(),
            credentials: self.credentials,
        }
    }

    /// Returns the sessions in order.
    #[must_use]
    pub fn sessions(&self) -> &[GenerationSession] {
        &self.sessions
    }

    /// Returns one session.
    #[must_use]
    pub fn session(&self, index: usize) -> Option<&GenerationSession> {
        self.sessions.get(index)
    }

    /// Number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if the pool has no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the shared credentials handle.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the current API key.
    #[must_use]
    pub fn api_key(&self) -> String {
        self.credentials.get()
    }

    /// Replaces the API key; the next provider call of every session uses it.
    pub fn set_api_key(&self, api_key: impl Into<String>) {
        self.credentials.set(api_key);
    }

    /// Snapshots every session's state, in session order.
    #[must_use]
    pub fn states(&self) -> Vec<SessionState> {
        self.sessions.iter().map(GenerationSession::state).collect()
    }

    /// Sends `prompt` to every session concurrently.
    ///
    /// Returns one result per session, in session order.
    pub async fn generate_all(&self, prompt: &str) -> Vec<Result<String, GenerationError>> {
        info!(sessions = self.sessions.len(), "Fanning out prompt");
        join_all(self.sessions.iter().map(|session| session.generate(prompt))).await
    }
}
