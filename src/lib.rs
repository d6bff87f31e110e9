//! # Video-Merge
//!
//! Merge source video clips into one scaled output with scrolling timed
//! comment overlays, a corner watermark and a JPEG preview of the result.
//!
//! The heavy lifting runs in an external compositor (ffmpeg); this library
//! owns everything around it: probing sources, assembling the composition
//! and its timed overlay layout, driving the asynchronous export with
//! progress and cancellation, caching the finished result and capturing the
//! preview frame.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use video_merge::{
//!     config::Config,
//!     engine::FfmpegEngine,
//!     export::ExportOrchestrator,
//!     overlay::OverlayFragment,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let fragments = vec![
//!     OverlayFragment::from_message("nice shot!", &[], 2.0, 40.0),
//! ];
//!
//! let orchestrator = ExportOrchestrator::single(
//!     FfmpegEngine::new(),
//!     "clip.mp4",
//!     fragments,
//!     Config::default(),
//! );
//!
//! orchestrator.start(
//!     |fraction| println!("{:.0}%", fraction * 100.0),
//!     |result| match result {
//!         Ok(output) => println!("{} video bytes", output.video.len()),
//!         Err(e) => eprintln!("export failed: {}", e),
//!     },
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`composition`] - Source probing and composition assembly
//! - [`overlay`] - Comment parsing and timed overlay layout
//! - [`engine`] - The compositor seam and its ffmpeg implementation
//! - [`export`] - Job orchestration, caching and the preview frame
//! - [`config`] - Configuration management

pub mod composition;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod overlay;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    engine::{CompositorEngine, FfmpegEngine},
    error::{MergeError, Result},
    export::{ExportOrchestrator, ExportOutput, JobState},
    overlay::OverlayFragment,
};
