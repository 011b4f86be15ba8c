//! Configuration for the terminal engine

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{AmbiguousWidth, ColorScheme, CursorShape, Theme, WidthMode, WidthPolicy};
use crate::terminal::Terminal;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial width in columns
    pub cols: usize,
    /// Initial height in rows
    pub rows: usize,
    /// Maximum scrollback lines
    pub scrollback_lines: usize,
    pub theme: Theme,
    /// Colors used for default and indexed cell colors
    pub scheme: ColorScheme,
    /// Render ticks per second
    pub frame_rate: u32,
    pub width_mode: WidthMode,
    pub ambiguous_width: AmbiguousWidth,
    pub cursor_shape: CursorShape,
    pub cursor_blink: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            scrollback_lines: 10000,
            theme: Theme::Dark,
            scheme: ColorScheme::default(),
            frame_rate: 60,
            width_mode: WidthMode::Fixed,
            ambiguous_width: AmbiguousWidth::Narrow,
            cursor_shape: CursorShape::Block,
            cursor_blink: true,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from the default location or return the default
    /// config. A present but unreadable file is logged and ignored.
    pub fn load_or_default() -> Self {
        if let Some(path) = default_path() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => warn!(path = %path.display(), "ignoring config: {}", e),
                }
            }
        }
        Self::default()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::Invalid(format!(
                "terminal size must be non-zero, got {}x{}",
                self.cols, self.rows
            )));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("frame_rate must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn width_policy(&self) -> WidthPolicy {
        WidthPolicy::new(self.width_mode, self.ambiguous_width)
    }

    /// A terminal set up with this configuration
    pub fn build_terminal(&self) -> Terminal {
        let mut terminal = Terminal::new(self.cols, self.rows, self.scrollback_lines);
        let buffer = terminal.buffer_mut();
        buffer.set_scheme(self.scheme.clone());
        buffer.set_theme(self.theme);
        buffer.set_width_policy(self.width_policy());
        buffer.set_default_cursor_style(self.cursor_shape, self.cursor_blink);
        buffer.take_dirty();
        terminal
    }
}

/// `$HOME/.config/mochi-vt/config.json`
pub fn default_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("mochi-vt")
            .join("config.json")
    })
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!((config.cols, config.rows), (80, 24));
        assert_eq!(config.scrollback_lines, 10000);
        assert_eq!(config.theme, Theme::Dark);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            cols: 100,
            theme: Theme::Light,
            ambiguous_width: AmbiguousWidth::Auto,
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "rows": 40, "width_mode": "flexible" }"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.rows, 40);
        assert_eq!(config.cols, 80);
        assert_eq!(config.width_mode, WidthMode::Flexible);
    }

    #[test]
    fn test_config_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, r#"{ "cols": 0 }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, r#"{ "frame_rate": 0 }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Json(_))));

        assert!(matches!(
            Config::load(&dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_build_terminal() {
        let config = Config {
            cols: 20,
            rows: 5,
            theme: Theme::Light,
            cursor_shape: CursorShape::Bar,
            ..Config::default()
        };
        let terminal = config.build_terminal();
        let buffer = terminal.buffer();
        assert_eq!((buffer.cols(), buffer.rows()), (20, 5));
        assert_eq!(buffer.theme(), Theme::Light);
        assert_eq!(buffer.cursor().shape, CursorShape::Bar);
        assert!(!buffer.is_dirty());
    }
}
