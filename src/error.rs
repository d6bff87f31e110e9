use thiserror::Error;

/// Main error type for the video-merge library
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Export job errors
///
/// Every variant is terminal for the job it occurred in. Nothing here is
/// retried automatically; the caller may call `start` again after a failure.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid source asset: {path} ({reason})")]
    InvalidAsset { path: String, reason: String },

    #[error("No usable video track in composition: {path}")]
    EmptyVideo { path: String },

    #[error("Compositor session could not be constructed: {reason}")]
    SessionCreationFailed { reason: String },

    #[error("Compositor reported failure: {reason}")]
    CompositorFailed { reason: String },

    #[error("Compositor cancelled the export")]
    CompositorCancelled,

    #[error("Thumbnail extraction failed: {reason}")]
    ThumbnailExtractionFailed { reason: String },

    #[error("Failed to read finished output file: {path} ({reason})")]
    OutputReadFailed { path: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using MergeError
pub type Result<T> = std::result::Result<T, MergeError>;

impl MergeError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Export(ExportError::InvalidAsset { path, .. }) => {
                format!("Could not read video '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Export(ExportError::EmptyVideo { path }) => {
                format!("'{}' has no video track. Only files with at least one video track can be merged.", path)
            }
            Self::Export(ExportError::SessionCreationFailed { .. }) => {
                "The video encoder could not be started. Please check that ffmpeg is installed.".to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
