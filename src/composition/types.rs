use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A reference to one source video container
#[derive(Debug, Clone)]
pub struct SourceClip {
    pub path: PathBuf,
}

impl SourceClip {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

/// Probed metadata for one source container
#[derive(Debug, Clone)]
pub struct AssetInfo {
    /// Total duration in seconds
    pub duration: f64,

    /// Primary video stream, if any
    pub video: Option<VideoStreamInfo>,

    /// Whether the container carries at least one audio stream
    pub has_audio: bool,
}

/// Metadata of a video stream
#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    /// Stored (pre-rotation) dimensions
    pub width: u32,
    pub height: u32,

    /// Display rotation in degrees (0, 90, 180, 270)
    pub rotation: i32,
}

impl VideoStreamInfo {
    /// Dimensions after the display rotation is applied, the size a player
    /// would present the stream at.
    pub fn display_size(&self) -> (u32, u32) {
        match self.rotation.rem_euclid(360) {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

/// Output render dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// One clip's contribution to the output timeline
#[derive(Debug, Clone)]
pub struct CompositionSegment {
    pub source: PathBuf,

    /// Source range inserted, in seconds
    pub source_start: f64,
    pub source_duration: f64,

    /// Insertion offset in the output timeline, in seconds
    pub offset: f64,

    /// Whether this segment also contributes an audio track
    pub has_audio: bool,
}

impl CompositionSegment {
    /// End of this segment in the output timeline
    pub fn end(&self) -> f64 {
        self.offset + self.source_duration
    }
}

/// The editable output timeline assembled from sequential clip insertions
#[derive(Debug, Clone, Default)]
pub struct Composition {
    pub segments: Vec<CompositionSegment>,

    /// Total output duration: the sum of segment durations
    pub duration: f64,
}

impl Composition {
    /// Append a clip's range at the current end of the timeline
    pub fn append(&mut self, source: PathBuf, source_duration: f64, has_audio: bool) {
        self.segments.push(CompositionSegment {
            source,
            source_start: 0.0,
            source_duration,
            offset: self.duration,
            has_audio,
        });
        self.duration += source_duration;
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether every segment carries audio; the output is video-only otherwise
    pub fn all_audio(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(|s| s.has_audio)
    }
}

/// A time-scoped transform/opacity description for one track
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInstruction {
    /// Index of the segment this layer drives
    pub segment_index: usize,

    /// Uniform scale applied on top of the display transform
    pub scale: f64,

    /// (time, opacity): the clip goes invisible at its own end so sequential
    /// clips hard-cut instead of bleeding into each other's window
    pub opacity_ramp: (f64, f32),
}

/// The composition-wide instruction: one layer per clip, in clip order
#[derive(Debug, Clone, Default)]
pub struct CompositionInstruction {
    /// Covered output range, in seconds
    pub time_range: (f64, f64),

    pub layers: Vec<LayerInstruction>,
}

/// Everything the external compositor needs to run one export
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub composition: Composition,
    pub instruction: CompositionInstruction,
    pub render_size: RenderSize,
    pub overlays: Vec<crate::overlay::layout::OverlayElement>,
    pub watermark: crate::overlay::layout::Watermark,

    /// Fresh, collision-free output location
    pub output: PathBuf,

    pub fps: f64,
    pub quality: u8,
}
