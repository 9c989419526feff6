//! Core types: conversation turns and stage kinds.

mod conversation;
mod stage;

pub use conversation::{Conversation, ConversationTurn, Role};
pub use stage::{StageKind, StagePlan};
