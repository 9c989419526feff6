//! Runs the stages of one generation in order.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::GeneratorConfig;
use crate::core::{Conversation, StageKind, StagePlan};
use crate::errors::GenerationError;
use crate::helpers::{collect_stream_with, extract_html_block};
use crate::observability::StageTimer;
use crate::policy::{with_retry, RetryConfig};
use crate::text::{ChatRequest, TextGenerator};

/// What one stage produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    /// Which stage ran.
    pub stage: StageKind,
    /// Position in the plan, starting at 0.
    pub index: usize,
    /// Full collected output.
    pub output: String,
    /// HTML extracted from the output; `None` for the outline or when the
    /// model emitted no `html` block.
    pub html: Option<String>,
    /// Number of stream fragments received.
    pub fragments: usize,
    /// Wall time of the call, in milliseconds.
    pub duration_ms: f64,
}

/// Result of a completed sequence.
#[derive(Debug, Clone)]
pub struct SequencerOutcome {
    /// Every turn sent or received, in order.
    pub transcript: Conversation,
    /// One record per stage.
    pub outputs: Vec<StageRecord>,
    /// HTML of the last stage, or `""` if it had none.
    pub final_html: String,
}

/// Notified after each stage has fully drained.
#[async_trait]
pub trait StageObserver: Send + Sync {
    /// Called once per stage, before the next stage starts.
    ///
    /// `checkpoint` is the progress value reached, if this stage has one.
    async fn on_stage_complete(&self, record: &StageRecord, checkpoint: Option<u8>);
}

/// Ignores stage notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStageObserver;

#[async_trait]
impl StageObserver for NoOpStageObserver {
    async fn on_stage_complete(&self, _record: &StageRecord, _checkpoint: Option<u8>) {}
}

/// Sends the outline, wireframe and refinement stages one after another.
///
/// Each call replays the whole conversation: the system instruction, the
/// user prompt, then every earlier assistant output.
#[derive(Clone)]
pub struct StageSequencer {
    text: Arc<dyn TextGenerator>,
    model: String,
    system_prompt: String,
    outline_max_tokens: Option<u32>,
    max_tokens: Option<u32>,
    plan: StagePlan,
    retry: RetryConfig,
}

impl std::fmt::Debug for StageSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSequencer")
            .field("model", &self.model)
            .field("plan", &self.plan)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl StageSequencer {
    /// Creates a sequencer from the shared configuration.
    #[must_use]
    pub fn new(text: Arc<dyn TextGenerator>, config: &GeneratorConfig) -> Self {
        Self {
            text,
            model: config.text.model.clone(),
            system_prompt: config.system_prompt.clone(),
            outline_max_tokens: config.text.outline_max_tokens,
            max_tokens: config.text.max_tokens,
            plan: StagePlan::new(config.refine_passes),
            retry: config.retry.clone(),
        }
    }

    /// Returns the stage plan.
    #[must_use]
    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    fn request_for(&self, stage: StageKind, conversation: &Conversation) -> ChatRequest {
        let max_tokens = match stage {
            StageKind::Outline => self.outline_max_tokens,
            _ => self.max_tokens,
        };
        ChatRequest::new(self.model.clone(), conversation.turns().to_vec()).with_max_tokens(max_tokens)
    }

    /// Runs every stage for `prompt`.
    ///
    /// The first provider error aborts the remaining stages and is returned;
    /// the observer has then seen only the stages that completed.
    pub async fn run(
        &self,
        prompt: &str,
        observer: &dyn StageObserver,
    ) -> Result<SequencerOutcome, GenerationError> {
        let mut conversation = Conversation::new(self.system_prompt.clone(), prompt);
        let mut outputs = Vec::with_capacity(self.plan.len());

        for (index, stage) in self.plan.stages().iter().copied().enumerate() {
            let request = self.request_for(stage, &conversation);
            let timer = StageTimer::start(stage.to_string());
            debug!(stage = %stage, turns = request.messages.len(), "Starting stage");

            let (output, fragments) = match self.call(stage, &request).await {
                Ok(collected) => collected,
                Err(e) => {
                    error!(stage = %stage, error = %e, "Stage failed");
                    return Err(e);
                }
            };

            let html = if stage.produces_html() {
                extract_html_block(&output).map(str::to_string)
            } else {
                None
            };
            let duration_ms = timer.finish();
            info!(
                stage = %stage,
                fragments,
                chars = output.len(),
                has_html = html.is_some(),
                duration_ms,
                "Stage completed"
            );

            conversation.push_assistant(output.clone());
            let record = StageRecord {
                stage,
                index,
                output,
                html,
                fragments,
                duration_ms,
            };
            observer
                .on_stage_complete(&record, self.plan.checkpoint(index + 1))
                .await;
            outputs.push(record);
        }

        let final_html = outputs
            .last()
            .and_then(|record| record.html.clone())
            .unwrap_or_default();

        Ok(SequencerOutcome {
            transcript: conversation,
            outputs,
            final_html,
        })
    }

    /// One streamed call, drained completely. A retry restarts the call.
    async fn call(&self, stage: StageKind, request: &ChatRequest) -> Result<(String, usize), GenerationError> {
        let key = stage.to_string();
        let text = &self.text;
        with_retry(&self.retry, &key, || async move {
            let stream = text.stream_chat(request).await?;
            let mut fragments = 0usize;
            let output = collect_stream_with(stream, |_| fragments += 1).await?;
            Ok((output, fragments))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Role;
    use crate::testing::{fixtures, ScriptedTextGenerator};
    use crate::text::MockTextGenerator;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingObserver {
        seen: Mutex<Vec<(StageKind, Option<u8>, Option<String>)>>,
    }

    #[async_trait]
    impl StageObserver for RecordingObserver {
        async fn on_stage_complete(&self, record: &StageRecord, checkpoint: Option<u8>) {
            self.seen
                .lock()
                .push((record.stage, checkpoint, record.html.clone()));
        }
    }

    fn sequencer(text: Arc<ScriptedTextGenerator>, refine_passes: usize) -> StageSequencer {
        let config = GeneratorConfig::new()
            .with_refine_passes(refine_passes)
            .with_system_prompt("SYS");
        StageSequencer::new(text, &config)
    }

    #[tokio::test]
    async fn test_three_stage_run_replays_conversation() {
        let text = Arc::new(
            ScriptedTextGenerator::new()
                .with_response("O")
                .with_response("```html\n<p>W</p>\n```")
                .with_response("```html\n<p>F</p>\n```"),
        );
        let outcome = sequencer(text.clone(), 1)
            .run("bakery", &NoOpStageObserver)
            .await
            .unwrap();

        let requests = text.requests();
        assert_eq!(requests.len(), 3);
        for (i, request) in requests.iter().enumerate() {
            assert_eq!(request.messages.len(), i + 2);
            assert_eq!(request.messages[0].role, Role::System);
            assert_eq!(request.messages[0].content, "SYS");
            assert_eq!(request.messages[1].role, Role::User);
            assert_eq!(request.messages[1].content, "bakery");
            assert!(request.stream);
        }
        assert_eq!(requests[2].messages[2].content, "O");
        assert_eq!(requests[2].messages[3].content, "```html\n<p>W</p>\n```");
        assert!(requests[2].messages[2..].iter().all(|t| t.role == Role::Assistant));

        assert_eq!(outcome.final_html, "<p>F</p>");
        assert_eq!(outcome.transcript.len(), 5);
        assert_eq!(outcome.outputs.len(), 3);
    }

    #[tokio::test]
    async fn test_outline_uses_its_own_token_cap() {
        let text = Arc::new(
            ScriptedTextGenerator::new()
                .with_response("O")
                .with_response("W"),
        );
        sequencer(text.clone(), 0).run("p", &NoOpStageObserver).await.unwrap();

        let requests = text.requests();
        assert_eq!(requests[0].max_tokens, Some(4095));
        assert_eq!(requests[1].max_tokens, None);
    }

    #[tokio::test]
    async fn test_observer_sees_checkpoints_and_html() {
        let text = Arc::new(
            ScriptedTextGenerator::new()
                .with_response("O")
                .with_response("```html\n<p>W</p>\n```")
                .with_response("no code here"),
        );
        let observer = RecordingObserver::default();
        let outcome = sequencer(text, 1).run("p", &observer).await.unwrap();

        assert_eq!(
            *observer.seen.lock(),
            vec![
                (StageKind::Outline, Some(33), None),
                (StageKind::Wireframe, Some(66), Some("<p>W</p>".to_string())),
                (StageKind::Refine(0), None, None),
            ]
        );
        assert_eq!(outcome.final_html, "");
    }

    #[tokio::test]
    async fn test_two_stage_checkpoint_is_fifty() {
        let text = Arc::new(ScriptedTextGenerator::new().with_response("O").with_response("W"));
        let observer = RecordingObserver::default();
        sequencer(text, 0).run("p", &observer).await.unwrap();

        let seen = observer.seen.lock();
        assert_eq!(seen[0].1, Some(50));
        assert_eq!(seen[1].1, None);
    }

    #[tokio::test]
    async fn test_first_error_aborts_remaining_stages() {
        let text = Arc::new(
            ScriptedTextGenerator::new()
                .with_response("O")
                .with_error(GenerationError::provider("openai", Some(401), "bad key"))
                .with_response("never"),
        );
        let observer = RecordingObserver::default();
        let err = sequencer(text.clone(), 1).run("p", &observer).await.unwrap_err();

        assert!(matches!(err, GenerationError::Provider { status: Some(401), .. }));
        assert_eq!(text.requests().len(), 2);
        assert_eq!(observer.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_error_fails_stage() {
        let text = Arc::new(
            ScriptedTextGenerator::new()
                .with_stream_error(vec!["partial"], GenerationError::transport("openai", "reset")),
        );
        let err = sequencer(text, 1).run("p", &NoOpStageObserver).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_restarts_failed_stage() {
        let text = Arc::new(
            ScriptedTextGenerator::new()
                .with_error(GenerationError::provider("openai", Some(503), "busy"))
                .with_response("O")
                .with_response("```html\n<p>W</p>\n```"),
        );
        let config = GeneratorConfig::new()
            .with_refine_passes(0)
            .with_retry(RetryConfig::new().with_max_attempts(2).with_base_delay_ms(10));
        let outcome = StageSequencer::new(text.clone(), &config)
            .run("p", &NoOpStageObserver)
            .await
            .unwrap();

        assert_eq!(text.requests().len(), 3);
        assert_eq!(outcome.final_html, "<p>W</p>");
    }

    #[tokio::test]
    async fn test_fragment_counts_are_recorded() {
        let text = Arc::new(
            ScriptedTextGenerator::new()
                .with_fragments(vec!["a", "b", "c"])
                .with_fragments(vec!["```html\n", "<i>x</i>", "\n```"]),
        );
        let outcome = sequencer(text, 0).run("p", &NoOpStageObserver).await.unwrap();

        assert_eq!(outcome.outputs[0].output, "abc");
        assert_eq!(outcome.outputs[0].fragments, 3);
        assert_eq!(outcome.final_html, "<i>x</i>");
    }

    #[tokio::test]
    async fn test_bakery_fixture_outputs() {
        let text = Arc::new(fixtures::bakery_generator());
        let outcome = sequencer(text, 1).run(fixtures::BAKERY_PROMPT, &NoOpStageObserver).await.unwrap();
        assert!(outcome.final_html.contains("<img"));
        assert!(!outcome.final_html.contains("```"));
    }

    fn fragments(parts: &[&str]) -> crate::helpers::FragmentStream {
        let items: Vec<Result<String, GenerationError>> = parts.iter().map(|p| Ok((*p).to_string())).collect();
        futures::stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_requests_follow_stage_caps_and_conversation() {
        let mut text = MockTextGenerator::new();
        let mut seq = mockall::Sequence::new();
        text.expect_stream_chat()
            .withf(|req| req.model == "m" && req.max_tokens == Some(4095) && req.messages.len() == 2)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(fragments(&["out", "line"])));
        text.expect_stream_chat()
            .withf(|req| {
                req.model == "m"
                    && req.max_tokens.is_none()
                    && req.messages.len() == 3
                    && req.messages[2].role == Role::Assistant
                    && req.messages[2].content == "outline"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(fragments(&["```html\n<p>W</p>\n```"])));

        let config = GeneratorConfig::new().with_model("m").with_refine_passes(0);
        let outcome = StageSequencer::new(Arc::new(text), &config)
            .run("bakery", &NoOpStageObserver)
            .await
            .unwrap();
        assert_eq!(outcome.final_html, "<p>W</p>");
    }

    #[tokio::test]
    async fn test_open_failure_skips_later_calls() {
        let mut text = MockTextGenerator::new();
        text.expect_stream_chat()
            .times(1)
            .returning(|_| Err(GenerationError::provider("openai", Some(400), "bad request")));

        let config = GeneratorConfig::new().with_refine_passes(1);
        let err = StageSequencer::new(Arc::new(text), &config)
            .run("p", &NoOpStageObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider { status: Some(400), .. }));
    }
}
