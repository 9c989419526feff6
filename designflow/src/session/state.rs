//! Observable state of a generation session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::StageKind;

/// Snapshot of a session, published through a `watch` channel.
///
/// `is_running` is true for the whole of a run and false otherwise.
/// Within a run `progress` never decreases; it is reset to 0 when the next
/// run starts. A run that ends with `is_running == false` and
/// `progress < 100` failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Latest committed HTML. Survives failed runs.
    pub result: String,
    /// 0..=100.
    pub progress: u8,
    /// Whether a run is in flight.
    pub is_running: bool,
    /// Id of the current or last run.
    pub run_id: Option<Uuid>,
    /// Last completed stage of the current run.
    pub stage: Option<StageKind>,
    /// When the current or last run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last run ended.
    pub finished_at: Option<DateTime<Utc>>,
    /// Rendered error of the last run, if it failed.
    pub last_error: Option<String>,
}

impl SessionState {
    /// Whether the last run finished with a final result.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.is_running && self.progress == 100 && self.last_error.is_none()
    }

    /// Whether the last run ended without reaching 100.
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.is_running && self.run_id.is_some() && self.progress < 100
    }
}
