//! Call policies shared by the provider adapters: pacing and retry.

mod pacing;
mod retry;

pub use pacing::{MinIntervalPacer, NoPacing, Pacer};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig, Retryable};
