//! # Compositor Engine Module
//!
//! The seam to the external multimedia stack. The orchestrator only needs
//! three capabilities from it: probing a container, running an asynchronous
//! export with pollable status/progress and a cancel handle, and decoding a
//! single frame at a timestamp. Any stack offering those primitives is a
//! valid substitute.

pub mod ffmpeg;

#[cfg(test)]
pub mod mock;

use std::path::Path;

use image::RgbImage;

use crate::composition::types::{AssetInfo, ExportRequest};
use crate::error::Result;

pub use ffmpeg::FfmpegEngine;

/// Terminal and transient states of one export task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Queued, not yet producing output
    Waiting,

    /// Actively encoding
    Exporting,

    Completed,
    Failed(String),
    Cancelled,

    /// The engine lost track of the task. Treated as success only when the
    /// output file exists on disk.
    Unknown,
}

impl TaskStatus {
    /// Whether the task is still running
    pub fn is_transient(&self) -> bool {
        matches!(self, TaskStatus::Waiting | TaskStatus::Exporting)
    }
}

/// Handle to one in-flight export
pub trait ExportTask: Send + Sync + 'static {
    fn status(&self) -> TaskStatus;

    /// Completed fraction in [0, 1]; non-decreasing in practice but not
    /// guaranteed strictly increasing
    fn progress(&self) -> f32;

    /// Best-effort cancellation; the underlying work may take a moment to
    /// actually stop
    fn cancel(&self);
}

/// The external compositor/encoder
pub trait CompositorEngine: Send + Sync + 'static {
    type Task: ExportTask;

    /// Read container metadata: duration, video stream geometry, audio presence
    fn probe(&self, path: &Path) -> impl std::future::Future<Output = Result<AssetInfo>> + Send;

    /// Configure and launch an export; the returned task is already running
    fn submit(&self, request: ExportRequest) -> impl std::future::Future<Output = Result<Self::Task>> + Send;

    /// Decode exactly one frame at the given timestamp, orientation applied
    fn extract_frame(
        &self,
        path: &Path,
        at_seconds: f64,
    ) -> impl std::future::Future<Output = Result<RgbImage>> + Send;
}
