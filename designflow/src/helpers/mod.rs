//! Helpers for collecting model streams and extracting their HTML payload.

pub mod code_block;
pub mod streaming;

pub use code_block::{extract_html_block, html_or_empty};
pub use streaming::{collect_stream, collect_stream_with, FragmentStream};
