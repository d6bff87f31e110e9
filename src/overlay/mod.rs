//! # Timed Overlay Module
//!
//! Comment/emoji fragment types and the pure layout helper that sizes them
//! and derives their on-screen travel timing.

pub mod layout;
pub mod types;

pub use layout::{fragment_width, travel_duration, vertical_position, OverlayLayout};
pub use types::{Comment, CommentPart, Emoji, OverlayFragment};
