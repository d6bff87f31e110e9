//! # Export Module
//!
//! Owns the lifecycle of one export job: build, asynchronous run with
//! progress polling, cancellation, result caching and the single-frame
//! preview of the finished file.

pub mod orchestrator;
pub mod thumbnail;

pub use orchestrator::{ExportOrchestrator, ExportOutput, JobState};
