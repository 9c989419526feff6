//! Lifecycle events emitted by generation sessions.
//!
//! Every payload carries the run id, the session index and an RFC 3339
//! timestamp, so events from concurrent sessions of a pool can be told apart.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A run started.
pub const GENERATION_STARTED: &str = "generation.started";
/// A stage finished draining its stream.
pub const STAGE_COMPLETED: &str = "generation.stage_completed";
/// Progress moved.
pub const PROGRESS: &str = "generation.progress";
/// A run stored its final result.
pub const GENERATION_COMPLETED: &str = "generation.completed";
/// A run failed.
pub const GENERATION_FAILED: &str = "generation.failed";
/// One image was replaced.
pub const IMAGE_SYNTHESIZED: &str = "image.synthesized";
/// One image kept its original source.
pub const IMAGE_FAILED: &str = "image.failed";

/// Identifies the run an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContext {
    /// Run id.
    pub run_id: Uuid,
    /// Index of the session within its pool.
    pub session: usize,
}

impl EventContext {
    /// Creates a context.
    #[must_use]
    pub fn new(run_id: Uuid, session: usize) -> Self {
        Self { run_id, session }
    }

    /// Builds a payload from `data` plus run id, session and timestamp.
    ///
    /// Non-object `data` is stored under `"data"`.
    #[must_use]
    pub fn payload(&self, data: Value) -> Value {
        let mut object = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        object.insert("run_id".to_string(), Value::String(self.run_id.to_string()));
        object.insert("session".to_string(), Value::from(self.session));
        object.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
        Value::Object(object)
    }
}
