//! Pure layout helper for timed overlay fragments.
//!
//! Computes horizontal sizes and ordering for a fragment's runs, the
//! clamped vertical position of the fragment, and the on-screen travel
//! duration handed to the compositor's animation primitives. Stateless and
//! deterministic given the fragment content and the font/size table in
//! [`OverlayConfig`].

use crate::composition::types::RenderSize;
use crate::config::{OverlayConfig, WatermarkConfig};
use crate::overlay::types::{CommentPart, OverlayFragment};

/// Renderable content of one run inside a scrolling fragment
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    Text(String),
    Image { path: String, width: f32, height: f32 },
}

/// One run of a fragment with its horizontal offset inside the fragment
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRun {
    pub content: OverlayContent,
    pub x_offset: f32,
    pub width: f32,
}

/// A timed, scrolling visual element handed to the external compositor.
///
/// The element enters at the right frame edge at `begin`, travels the full
/// frame width plus its own width over `duration` seconds, and is removed
/// afterwards.
#[derive(Debug, Clone)]
pub struct OverlayElement {
    pub runs: Vec<OverlayRun>,

    /// Appearance time, seconds from output start
    pub begin: f64,

    /// Travel time across the frame
    pub duration: f64,

    /// Top edge in render pixels
    pub y: f32,

    /// Total horizontal extent of the fragment
    pub width: f32,

    /// Font size text runs were measured at
    pub font_size: f32,
}

/// The static corner watermark, present for the whole output duration
#[derive(Debug, Clone)]
pub struct Watermark {
    pub text: String,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    pub background_alpha: f32,
}

impl From<&WatermarkConfig> for Watermark {
    fn from(config: &WatermarkConfig) -> Self {
        Self {
            text: config.text.clone(),
            width: config.width,
            height: config.height,
            font_size: config.font_size,
            background_alpha: config.background_alpha,
        }
    }
}

/// Width of a single run at the configured font/size table
pub fn part_width(part: &CommentPart, config: &OverlayConfig) -> f32 {
    match part {
        CommentPart::Emoji(_) => config.emoji_size,
        CommentPart::Text(text) => {
            text.chars().count() as f32 * config.font_size * config.glyph_advance
        }
    }
}

/// Total horizontal extent of a fragment: the running sum of its run widths
pub fn fragment_width(parts: &[CommentPart], config: &OverlayConfig) -> f32 {
    parts.iter().map(|part| part_width(part, config)).sum()
}

/// On-screen travel duration for a fragment of the given rendered width.
///
/// Wider fragments travel proportionally longer so the apparent horizontal
/// speed stays constant: `default + (width / travel_width) * default`.
pub fn travel_duration(width: f32, travel_width: f32, default_duration: f64) -> f64 {
    default_duration + (width / travel_width) as f64 * default_duration
}

/// Vertical position of a fragment from its `place` slot.
///
/// `place` is measured in a display coordinate space `display_width` wide;
/// the usable height in that space is `frame_h * display_width / frame_w`.
/// The raw formula can push fragments above or below the frame for large
/// `place` values, so the result is clamped to keep the fragment fully
/// on-screen.
pub fn vertical_position(
    place: f64,
    frame_width: f32,
    frame_height: f32,
    item_height: f32,
    display_width: f32,
) -> f32 {
    let compose_height = frame_height * display_width / frame_width;
    let y = frame_height - frame_height * place as f32 / compose_height - item_height;
    y.clamp(0.0, (frame_height - item_height).max(0.0))
}

/// Layout helper bound to one configuration
#[derive(Debug, Clone)]
pub struct OverlayLayout {
    config: OverlayConfig,
    default_duration: f64,
}

impl OverlayLayout {
    pub fn new(config: OverlayConfig, default_duration: f64) -> Self {
        Self { config, default_duration }
    }

    /// Lay out one fragment inside the render frame
    pub fn element(&self, fragment: &OverlayFragment, render: RenderSize) -> OverlayElement {
        let mut runs = Vec::with_capacity(fragment.parts.len());
        let mut x_offset = 0.0f32;

        for part in &fragment.parts {
            let width = part_width(part, &self.config);
            let content = match part {
                CommentPart::Text(text) => OverlayContent::Text(text.clone()),
                CommentPart::Emoji(emoji) => {
                    if emoji.path.is_empty() {
                        // No image asset, fall back to the textual token
                        OverlayContent::Text(format!(":{}:", emoji.key))
                    } else {
                        OverlayContent::Image {
                            path: emoji.path.clone(),
                            width: self.config.emoji_size,
                            height: self.config.emoji_size,
                        }
                    }
                }
            };
            runs.push(OverlayRun { content, x_offset, width });
            x_offset += width;
        }

        let width = x_offset;
        let frame_width = render.width as f32;
        let frame_height = render.height as f32;

        OverlayElement {
            runs,
            begin: fragment.time,
            duration: travel_duration(width, frame_width, self.default_duration),
            y: vertical_position(
                fragment.place,
                frame_width,
                frame_height,
                self.config.item_height,
                self.config.display_width,
            ),
            width,
            font_size: self.config.font_size,
        }
    }

    /// Lay out all fragments, in input order
    pub fn elements(&self, fragments: &[OverlayFragment], render: RenderSize) -> Vec<OverlayElement> {
        fragments.iter().map(|fragment| self.element(fragment, render)).collect()
    }

    /// The static watermark for this configuration
    pub fn watermark(&self) -> Watermark {
        Watermark::from(&self.config.watermark)
    }
}
