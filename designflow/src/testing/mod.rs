//! Test doubles and fixtures.
//!
//! This module provides:
//! - A scripted text generator that records requests
//! - Static and failing image backends
//! - Canned bakery outputs for end-to-end runs

pub mod fixtures;
mod mocks;

pub use mocks::{FailingImageBackend, ScriptedTextGenerator, StaticImageBackend};
