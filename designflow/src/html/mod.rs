//! HTML fragment parsing, serialization and image rewriting.

mod tree;
mod walker;

pub use tree::{Element, Fragment, Node};
pub use walker::{
    ImageFailure, ImageRewriter, ImageSlot, PlaceholderPattern, RewriteOutcome,
    DEFAULT_PLACEHOLDER_PATTERN,
};
