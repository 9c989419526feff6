//! # Designflow
//!
//! Turns a short natural-language prompt into a self-contained HTML page.
//!
//! A run goes through a fixed sequence of model calls:
//!
//! - **Outline**: what the page should contain
//! - **Wireframe**: a first HTML take, conditioned on the outline
//! - **Refine**: zero or more further takes, conditioned on everything before
//!
//! The HTML of the last take is then walked, every described image is
//! synthesized, and the result is published on the session's state channel.
//! A [`GenerationPool`](session::GenerationPool) fans the same prompt out to
//! several independent sessions so alternatives can be compared.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use designflow::prelude::*;
//!
//! let config = GeneratorConfig::new();
//! let pool = GenerationPool::openai(3, &config, Credentials::from_env("OPENAI_API_KEY"))?;
//!
//! let mut progress = pool.sessions()[0].subscribe();
//! let results = pool.generate_all("A landing page for a neighborhood bakery").await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod helpers;
pub mod html;
pub mod images;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod testing;
pub mod text;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        GeneratorConfig, ImageBackendKind, ImageConfig, ImageFailurePolicy, TextConfig,
    };
    pub use crate::core::{Conversation, ConversationTurn, Role, StageKind, StagePlan};
    pub use crate::credentials::Credentials;
    pub use crate::errors::{GenerationError, ImageSynthesisError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::helpers::{collect_stream, extract_html_block, html_or_empty, FragmentStream};
    pub use crate::html::{Fragment, ImageRewriter, RewriteOutcome};
    pub use crate::images::{ImageBackend, ImagePayload, ImageRequest, ImageSynthesizer, PassthroughBackend};
    #[cfg(feature = "http")]
    pub use crate::images::{OpenAiImageBackend, StabilityBackend};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{StageObserver, StageRecord, StageSequencer};
    pub use crate::policy::{MinIntervalPacer, Pacer, RetryConfig};
    pub use crate::session::{GenerationPool, GenerationSession, SessionState};
    #[cfg(feature = "http")]
    pub use crate::text::OpenAiChatClient;
    pub use crate::text::{ChatRequest, TextGenerator};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let config = GeneratorConfig::default();
        assert_eq!(StagePlan::new(config.refine_passes).len(), 3);
        assert!(Credentials::default().is_empty());
    }
}
