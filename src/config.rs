use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for video-merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Export session settings
    pub export: ExportConfig,

    /// Overlay layout settings (font/size table)
    pub overlay: OverlayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export: ExportConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.export.validate()?;
        self.overlay.validate()?;
        Ok(())
    }
}

/// Export session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Target horizontal output resolution; height follows the source aspect
    pub export_width: u32,

    /// Base travel time for overlay fragments (seconds)
    pub default_fragment_duration: f64,

    /// Output frame rate
    pub fps: f64,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,

    /// Output container extension ("mov" or "mp4")
    pub container: String,

    /// Directory for finished output files; system temp dir when unset
    pub output_dir: Option<std::path::PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_width: 667,
            default_fragment_duration: 5.0,
            fps: 30.0,
            quality: 95,
            container: "mov".to_string(),
            output_dir: None,
        }
    }
}

impl ExportConfig {
    fn validate(&self) -> Result<()> {
        if self.export_width == 0 {
            return Err(ConfigError::InvalidValue {
                key: "export.export_width".to_string(),
                value: self.export_width.to_string()
            }.into());
        }

        if self.default_fragment_duration <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "export.default_fragment_duration".to_string(),
                value: self.default_fragment_duration.to_string()
            }.into());
        }

        if self.fps <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "export.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "export.quality".to_string(),
                value: self.quality.to_string()
            }.into());
        }

        if !matches!(self.container.as_str(), "mov" | "mp4") {
            return Err(ConfigError::InvalidValue {
                key: "export.container".to_string(),
                value: self.container.clone()
            }.into());
        }

        Ok(())
    }
}

/// Overlay layout configuration
///
/// The font/size table the layout helper measures against. These are
/// configuration, not logic: the helper itself never touches a rasterizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Point size of the (bold) comment font
    pub font_size: f32,

    /// Average glyph advance as a fraction of the font size
    pub glyph_advance: f32,

    /// Fixed square size for emoji fragments
    pub emoji_size: f32,

    /// Rendered height of one fragment row
    pub item_height: f32,

    /// Width of the coordinate space fragment `place` values were captured in
    pub display_width: f32,

    /// Watermark settings
    pub watermark: WatermarkConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_size: 28.0,
            glyph_advance: 0.6,
            emoji_size: 80.0,
            item_height: 64.0,
            display_width: 375.0,
            watermark: WatermarkConfig::default(),
        }
    }
}

impl OverlayConfig {
    fn validate(&self) -> Result<()> {
        if self.font_size <= 0.0 || self.glyph_advance <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "overlay.font".to_string(),
                value: format!("{}x{}", self.font_size, self.glyph_advance)
            }.into());
        }

        if self.display_width <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "overlay.display_width".to_string(),
                value: self.display_width.to_string()
            }.into());
        }

        if self.item_height <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "overlay.item_height".to_string(),
                value: self.item_height.to_string()
            }.into());
        }

        self.watermark.validate()
    }
}

/// Watermark overlay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Watermark caption
    pub text: String,

    /// Badge size in render pixels
    pub width: f32,
    pub height: f32,

    /// Caption font size
    pub font_size: f32,

    /// Background opacity (0.0-1.0)
    pub background_alpha: f32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: "video-merge".to_string(),
            width: 150.0,
            height: 56.0,
            font_size: 23.0,
            background_alpha: 0.25,
        }
    }
}

impl WatermarkConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.background_alpha) {
            return Err(ConfigError::InvalidValue {
                key: "overlay.watermark.background_alpha".to_string(),
                value: self.background_alpha.to_string()
            }.into());
        }

        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "overlay.watermark.size".to_string(),
                value: format!("{}x{}", self.width, self.height)
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let original_config = Config::default();

        // Save and load
        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config.export.export_width, loaded_config.export.export_width);
        assert_eq!(original_config.overlay.font_size, loaded_config.overlay.font_size);
        assert_eq!(original_config.overlay.watermark.text, loaded_config.overlay.watermark.text);
    }

    #[test]
    fn test_invalid_export_width() {
        let mut config = Config::default();
        config.export.export_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_fragment_duration() {
        let mut config = Config::default();
        config.export.default_fragment_duration = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_container() {
        let mut config = Config::default();
        config.export.container = "avi".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_watermark_alpha() {
        let mut config = Config::default();
        config.overlay.watermark.background_alpha = 1.5;
        assert!(config.validate().is_err());
    }
}
