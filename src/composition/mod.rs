//! # Composition Module
//!
//! Builds the input composition graph (tracks, time ranges, transforms) and
//! the timed instruction set handed to the external compositor.

pub mod builder;
pub mod types;

pub use builder::build;
pub use types::{
    AssetInfo, Composition, CompositionInstruction, CompositionSegment, ExportRequest,
    LayerInstruction, RenderSize, SourceClip, VideoStreamInfo,
};
