//! Generation sessions and the pool that fans prompts out to them.

mod pool;
#[allow(clippy::module_inception)]
mod session;
mod state;

pub use pool::{GenerationPool, STABILITY_KEY_VAR};
pub use session::GenerationSession;
pub use state::SessionState;
