use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment with its author metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub content: String,
    pub avatar_path: String,
    pub importance: f64,
    pub send_time: DateTime<Utc>,

    is_following: bool,
}

impl Comment {
    pub fn new<S: Into<String>>(id: S, channel_id: S, user_id: S, content: S) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            avatar_path: String::new(),
            importance: 0.0,
            send_time: Utc::now(),
            is_following: false,
        }
    }

    pub fn is_following(&self) -> bool {
        self.is_following
    }

    /// Flip the following flag. The presence service sets this at most once;
    /// later calls report whether the flag actually changed.
    pub fn mark_following(&mut self) -> bool {
        if self.is_following {
            return false;
        }
        self.is_following = true;
        true
    }
}

/// A short inline image keyed by its `:key:` token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    pub key: String,
    pub width: f32,
    pub height: f32,
    pub path: String,
}

/// One run of a comment: either an inline emoji or a text span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommentPart {
    Emoji(Emoji),
    Text(String),
}

impl CommentPart {
    /// Split a message into text and emoji runs against an emoji table.
    ///
    /// Emoji appear in messages as `:key:` tokens. Tokens without a table
    /// entry stay as literal text.
    pub fn parse(message: &str, emojis: &[Emoji]) -> Vec<CommentPart> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut rest = message;

        while let Some(open) = rest.find(':') {
            let after = &rest[open + 1..];
            match after.find(':') {
                Some(close) if close > 0 => {
                    let key = &after[..close];
                    if let Some(emoji) = emojis.iter().find(|e| e.key == key) {
                        text.push_str(&rest[..open]);
                        if !text.is_empty() {
                            parts.push(CommentPart::Text(std::mem::take(&mut text)));
                        }
                        parts.push(CommentPart::Emoji(emoji.clone()));
                        rest = &after[close + 1..];
                    } else {
                        // Unknown token, keep the leading colon as text
                        text.push_str(&rest[..=open]);
                        rest = after;
                    }
                }
                _ => {
                    text.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }

        text.push_str(rest);
        if !text.is_empty() {
            parts.push(CommentPart::Text(text));
        }
        parts
    }
}

/// One timed overlay unit: a parsed comment, its appearance time and its
/// vertical slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayFragment {
    pub parts: Vec<CommentPart>,

    /// Seconds from output start
    pub time: f64,

    /// Vertical slot offset in display coordinates
    pub place: f64,
}

impl OverlayFragment {
    pub fn new(parts: Vec<CommentPart>, time: f64, place: f64) -> Self {
        Self { parts, time, place }
    }

    /// Build a fragment from a raw message, resolving emoji tokens
    pub fn from_message(message: &str, emojis: &[Emoji], time: f64, place: f64) -> Self {
        Self::new(CommentPart::parse(message, emojis), time, place)
    }

    /// Plain-text form with emoji rendered back as `:key:` tokens
    pub fn caption(&self) -> String {
        let mut caption = String::new();
        for part in &self.parts {
            match part {
                CommentPart::Text(text) => caption.push_str(text),
                CommentPart::Emoji(emoji) => {
                    caption.push(':');
                    caption.push_str(&emoji.key);
                    caption.push(':');
                }
            }
        }
        caption
    }
}
