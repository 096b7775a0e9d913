//! Shared test utilities for studyhub integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a real `ExtractionService` to an in-memory database
//! - fixture builders for PDFs and fake OCR engines

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::{TestHarness, RAG_EXCERPT_CHARS};
