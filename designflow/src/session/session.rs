//! One generation slot: runs the pipeline and publishes its state.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::state::SessionState;
use crate::errors::GenerationError;
use crate::events::{self, EventContext, EventSink, NoOpEventSink};
use crate::html::ImageRewriter;
use crate::observability::StageTimer;
use crate::pipeline::{StageObserver, StageRecord, StageSequencer};

/// Runs prompts through the stage pipeline and the image rewriter.
///
/// A session is long-lived and may generate many times, one run at a time.
/// Only the session writes its [`SessionState`]; callers read snapshots with
/// [`state`](Self::state) or follow changes with [`subscribe`](Self::subscribe).
pub struct GenerationSession {
    index: usize,
    sequencer: StageSequencer,
    rewriter: ImageRewriter,
    events: Arc<dyn EventSink>,
    state: watch::Sender<SessionState>,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for GenerationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSession")
            .field("index", &self.index)
            .field("sequencer", &self.sequencer)
            .field("rewriter", &self.rewriter)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl GenerationSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new(index: usize, sequencer: StageSequencer, rewriter: ImageRewriter) -> Self {
        Self {
            index,
            sequencer,
            rewriter,
            events: Arc::new(NoOpEventSink),
            state: watch::Sender::new(SessionState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Sets the sink lifecycle events go to.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Position of this session in its pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Follows state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running
    }

    /// Generates a page for `prompt` and returns the final HTML.
    ///
    /// Fails with [`GenerationError::AlreadyRunning`] while another run of
    /// this session is in flight. The running flag is cleared however the
    /// run ends, including when the returned future is dropped.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(session = self.index, "Generation already in flight");
            return Err(GenerationError::AlreadyRunning { session: self.index });
        }
        let _guard = RunGuard { session: self };

        let ctx = EventContext::new(Uuid::now_v7(), self.index);
        self.state.send_modify(|state| {
            state.progress = 0;
            state.is_running = true;
            state.run_id = Some(ctx.run_id);
            state.stage = None;
            state.started_at = Some(Utc::now());
            state.finished_at = None;
            state.last_error = None;
        });

        info!(session = self.index, run_id = %ctx.run_id, stages = self.sequencer.plan().len(), "Generation started");
        self.events
            .emit(
                events::GENERATION_STARTED,
                Some(ctx.payload(json!({
                    "prompt_chars": prompt.chars().count(),
                    "stages": self.sequencer.plan().len(),
                }))),
            )
            .await;

        let timer = StageTimer::start("generation");
        let result = self.run(prompt, ctx).await;
        let duration_ms = timer.finish();

        match &result {
            Ok(html) => {
                info!(session = self.index, run_id = %ctx.run_id, chars = html.len(), duration_ms, "Generation completed");
                self.events
                    .emit(
                        events::GENERATION_COMPLETED,
                        Some(ctx.payload(json!({ "chars": html.len(), "duration_ms": duration_ms }))),
                    )
                    .await;
            }
            Err(e) => {
                error!(session = self.index, run_id = %ctx.run_id, error = %e, "Generation failed");
                self.state.send_modify(|state| state.last_error = Some(e.to_string()));
                self.events
                    .emit(
                        events::GENERATION_FAILED,
                        Some(ctx.payload(json!({ "error": e.to_dict(), "duration_ms": duration_ms }))),
                    )
                    .await;
            }
        }

        result
    }

    async fn run(&self, prompt: &str, ctx: EventContext) -> Result<String, GenerationError> {
        let observer = SessionObserver { session: self, ctx };
        let outcome = self.sequencer.run(prompt, &observer).await?;

        let rewrite = self.rewriter.rewrite(&outcome.final_html).await?;
        if rewrite.synthesized > 0 {
            self.events
                .emit(
                    events::IMAGE_SYNTHESIZED,
                    Some(ctx.payload(json!({ "count": rewrite.synthesized }))),
                )
                .await;
        }
        for failure in &rewrite.failures {
            self.events
                .emit(
                    events::IMAGE_FAILED,
                    Some(ctx.payload(json!({
                        "element": failure.element,
                        "prompt": failure.prompt,
                        "error": failure.error.to_dict(),
                    }))),
                )
                .await;
        }

        self.state.send_modify(|state| {
            state.result.clone_from(&rewrite.html);
            state.progress = 100;
            state.finished_at = Some(Utc::now());
        });
        self.events
            .emit(events::PROGRESS, Some(ctx.payload(json!({ "progress": 100 }))))
            .await;

        Ok(rewrite.html)
    }
}

/// Commits intermediate results and progress as stages complete.
struct SessionObserver<'a> {
    session: &'a GenerationSession,
    ctx: EventContext,
}

#[async_trait]
impl StageObserver for SessionObserver<'_> {
    async fn on_stage_complete(&self, record: &StageRecord, checkpoint: Option<u8>) {
        let session = self.session;
        session.state.send_modify(|state| {
            state.stage = Some(record.stage);
            if record.stage.produces_html() {
                state.result = record.html.clone().unwrap_or_default();
            }
            if let Some(progress) = checkpoint {
                state.progress = state.progress.max(progress);
            }
        });

        session
            .events
            .emit(
                events::STAGE_COMPLETED,
                Some(self.ctx.payload(json!({
                    "stage": record.stage.to_string(),
                    "index": record.index,
                    "fragments": record.fragments,
                    "has_html": record.html.is_some(),
                    "duration_ms": record.duration_ms,
                }))),
            )
            .await;
        if let Some(progress) = checkpoint {
            session
                .events
                .emit(events::PROGRESS, Some(self.ctx.payload(json!({ "progress": progress }))))
                .await;
        }
    }
}

/// Clears the running flags when a run ends, however it ends.
struct RunGuard<'a> {
    session: &'a GenerationSession,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.session.state.send_modify(|state| {
            state.is_running = false;
            if state.finished_at.is_none() {
                state.finished_at = Some(Utc::now());
            }
        });
        self.session.in_flight.store(false, Ordering::Release);
    }
}
