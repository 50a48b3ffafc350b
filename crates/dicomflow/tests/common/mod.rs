//! Shared test utilities for dicomflow integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with temp directories
//! - In-memory fakes for the remote store and the converter
//! - Builder patterns for creating test configurations programmatically

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::{FakeConverter, FakeStore};
pub use harness::{dicom_bytes, TestHarness};
