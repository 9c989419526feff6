//! Scripted providers for tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::errors::{GenerationError, ImageSynthesisError};
use crate::helpers::FragmentStream;
use crate::images::{ImageBackend, ImagePayload, ImageRequest};
use crate::text::{ChatRequest, TextGenerator};

#[derive(Debug)]
enum Script {
    Fragments(Vec<String>),
    Fail(GenerationError),
    FailMidStream(Vec<String>, GenerationError),
}

/// A text generator that replays queued responses, one per call, and
/// records every request it receives.
///
/// Calls past the end of the script fail with a provider error.
#[derive(Debug, Default)]
pub struct ScriptedTextGenerator {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
    latency: Option<Duration>,
}

impl ScriptedTextGenerator {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response streamed word by word.
    #[must_use]
    pub fn with_response(self, text: &str) -> Self {
        let fragments = text.split_inclusive(' ').map(str::to_string).collect();
        self.push(Script::Fragments(fragments))
    }

    /// Queues a response streamed as the given fragments.
    #[must_use]
    pub fn with_fragments(self, fragments: Vec<&str>) -> Self {
        self.push(Script::Fragments(fragments.into_iter().map(str::to_string).collect()))
    }

    /// Queues a call that fails before streaming.
    #[must_use]
    pub fn with_error(self, error: GenerationError) -> Self {
        self.push(Script::Fail(error))
    }

    /// Queues a call that streams `fragments` and then fails.
    #[must_use]
    pub fn with_stream_error(self, fragments: Vec<&str>, error: GenerationError) -> Self {
        let fragments = fragments.into_iter().map(str::to_string).collect();
        self.push(Script::FailMidStream(fragments, error))
    }

    /// Delays every call before it answers.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the number of queued responses not yet used.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn push(self, script: Script) -> Self {
        self.script.lock().push_back(script);
        self
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream, GenerationError> {
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match next {
            Some(Script::Fragments(fragments)) => {
                Ok(stream::iter(fragments.into_iter().map(Ok)).boxed())
            }
            Some(Script::Fail(error)) => Err(error),
            Some(Script::FailMidStream(fragments, error)) => Ok(stream::iter(
                fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error))),
            )
            .boxed()),
            None => Err(GenerationError::provider("scripted", None, "script exhausted")),
        }
    }
}

/// An image backend that always answers with the same reference.
#[derive(Debug)]
pub struct StaticImageBackend {
    reference: String,
    prompts: Mutex<Vec<String>>,
}

impl StaticImageBackend {
    /// Creates a backend answering with `reference`.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Returns the prompts received, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ImageBackend for StaticImageBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    fn min_interval(&self) -> Option<Duration> {
        None
    }

    async fn generate(&self, request: &ImageRequest) -> Result<ImagePayload, ImageSynthesisError> {
        self.prompts.lock().push(request.prompt.clone());
        Ok(ImagePayload::Url(self.reference.clone()))
    }
}

/// An image backend whose every call fails with a status error.
#[derive(Debug)]
pub struct FailingImageBackend {
    status: u16,
    calls: Mutex<usize>,
}

impl FailingImageBackend {
    /// Creates a backend failing with `status`.
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            calls: Mutex::new(0),
        }
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ImageBackend for FailingImageBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn min_interval(&self) -> Option<Duration> {
        None
    }

    async fn generate(&self, _request: &ImageRequest) -> Result<ImagePayload, ImageSynthesisError> {
        *self.calls.lock() += 1;
        Err(ImageSynthesisError::status(self.name(), self.status, "Non-200 response"))
    }
}
