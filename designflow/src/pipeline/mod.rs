//! The multi-stage prompt pipeline.

mod prompts;
mod sequencer;

pub use prompts::DEFAULT_SYSTEM_PROMPT;
pub use sequencer::{NoOpStageObserver, SequencerOutcome, StageObserver, StageRecord, StageSequencer};
