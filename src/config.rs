//! Application configuration
//!
//! Stored as JSON in the user's config directory:
//! - Linux: ~/.config/status-shot/config.json
//! - macOS: ~/Library/Application Support/status-shot/config.json
//! - Windows: %APPDATA%\status-shot\config.json
//!
//! Every section falls back to its defaults when missing, so a partial file
//! (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const APP_DIR: &str = "status-shot";

/// Largest accepted `export.scale`
pub const MAX_EXPORT_SCALE: u32 = 8;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub library: LibraryConfig,
    pub compression: CompressionConfig,
    pub export: ExportConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}

/// Where and how the photo library is persisted
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LibraryConfig {
    /// Keys are `<prefix>_0`, `<prefix>_1`, ...
    pub key_prefix: String,
    /// Total bytes (keys + values) the store may hold
    pub quota_bytes: u64,
    /// Database file; `None` uses the platform data directory
    pub db_path: Option<PathBuf>,
}

/// Profile photo compression parameters. Qualities are in hundredths (92 = 0.92).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    /// Longest edge after resizing, in pixels
    pub max_dimension: u32,
    /// Binary size budget; the encoded budget is this times 1.33
    pub target_bytes: usize,
    pub initial_quality: u8,
    pub quality_step: u8,
    pub min_quality: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Pause between mutating the render state and capturing it
    pub settle_delay_ms: u64,
    /// Raster scale relative to the logical card size
    pub scale: u32,
    /// Files are named `<stem>-screenshot.png` or `<stem>-screenshot-<n>.png`
    pub filename_stem: String,
    pub output_dir: PathBuf,
    /// Extra directories searched for caption fonts, before the system ones
    pub font_dirs: Vec<PathBuf>,
}

/// External decoders used for video frame extraction
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MediaConfig {
    pub ffprobe: String,
    pub ffmpeg: String,
    /// Upper bound for each decode stage (metadata, seek)
    pub decode_timeout_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "status_shot=debug,warn"
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            key_prefix: "dpsaver".to_string(),
            // Browsers cap local storage at roughly 5 MiB per origin
            quota_bytes: 5 * 1024 * 1024,
            db_path: None,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_dimension: 400,
            target_bytes: 200 * 1024,
            initial_quality: 92,
            quality_step: 7,
            min_quality: 50,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            scale: 2,
            filename_stem: "whatsapp-status".to_string(),
            output_dir: PathBuf::from("."),
            font_dirs: Vec::new(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            decode_timeout_ms: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LibraryConfig {
    /// Resolve the database path, falling back to the user's data directory
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }

        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| Error::Config("could not determine user data directory".into()))?;
        path.push(APP_DIR);
        path.push("library.db");
        Ok(path)
    }
}

impl ExportConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl MediaConfig {
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
    }

    /// Load from `path`, or defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load from the default location, or defaults if there is none
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let c = &self.compression;
        if c.max_dimension == 0 {
            return Err(Error::Config("compression.max_dimension must be positive".into()));
        }
        if c.quality_step == 0 {
            return Err(Error::Config("compression.quality_step must be positive".into()));
        }
        if c.min_quality == 0 || c.min_quality > c.initial_quality || c.initial_quality > 100 {
            return Err(Error::Config(
                "compression qualities must satisfy 0 < min_quality <= initial_quality <= 100".into(),
            ));
        }
        if self.export.scale == 0 || self.export.scale > MAX_EXPORT_SCALE {
            return Err(Error::Config(format!(
                "export.scale must be between 1 and {}",
                MAX_EXPORT_SCALE
            )));
        }
        if self.library.key_prefix.is_empty() {
            return Err(Error::Config("library.key_prefix must not be empty".into()));
        }
        Ok(())
    }
}
