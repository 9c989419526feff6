//! Stage kinds and the ordered plan of a run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One model round-trip within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Outline of the page content.
    Outline,
    /// First HTML take.
    Wireframe,
    /// Additional HTML take conditioned on all earlier outputs.
    Refine(usize),
}

impl StageKind {
    /// Whether this stage is expected to emit an HTML block.
    #[must_use]
    pub fn produces_html(&self) -> bool {
        !matches!(self, Self::Outline)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outline => write!(f, "outline"),
            Self::Wireframe => write!(f, "wireframe"),
            Self::Refine(n) => write!(f, "refine_{n}"),
        }
    }
}

/// The fixed stage order for a run: outline, wireframe, then `k` refinements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<StageKind>,
}

impl StagePlan {
    /// Creates a plan with the given number of refinement passes.
    #[must_use]
    pub fn new(refine_passes: usize) -> Self {
        let mut stages = Vec::with_capacity(refine_passes + 2);
        stages.push(StageKind::Outline);
        stages.push(StageKind::Wireframe);
        stages.extend((0..refine_passes).map(StageKind::Refine));
        Self { stages }
    }

    /// Returns the stages in order.
    #[must_use]
    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Plans always hold at least the outline and wireframe stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Progress checkpoint reached once `completed` stages have drained.
    ///
    /// Checkpoints split 0..100 evenly across the stages; the last stage
    /// has no checkpoint of its own because 100 is reserved for the end of
    /// the whole run.
    #[must_use]
    pub fn checkpoint(&self, completed: usize) -> Option<u8> {
        let total = self.stages.len();
        if completed == 0 || completed >= total {
            return None;
        }
        u8::try_from(completed * 100 / total).ok()
    }
}

impl Default for StagePlan {
    fn default() -> Self {
        Self::new(1)
    }
}
