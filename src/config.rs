//! Engine configuration module.
//!
//! Handles loading and validating `enlarger.toml`. Configuration is sparse:
//! stock defaults apply for every key the file omits, and unknown keys are
//! rejected to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source_root = "."         # Where relative source paths resolve
//! cache_dir = "cache"       # Where rendered variants are written
//! url_prefix = ""           # Prepended to cache file names in output URLs
//!
//! default_quality = 90      # Lossy encode quality (1-100)
//! default_ttl_secs = 0      # Cache lifetime in seconds (0 = keep forever)
//! default_aspect = [4, 3]   # Aspect ratio when only one dimension is given
//! background = "#ffffff"    # Flatten/fill color (hex or "r,g,b")
//! allow_scale_larger = false # Permit upscaling past the source size
//! demo_mode = false         # Marks cache identities so demo output never
//!                           # collides with production renders
//!
//! # font_path = "fonts/DejaVuSans.ttf"  # Required for text overlays
//! dominant_samples = 16     # Grid samples for dominant-color placeholders
//!
//! [processing]
//! max_processes = 4         # Max parallel batch workers (omit for auto)
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::color::Color;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `enlarger.toml`.
///
/// All fields have sensible defaults. Config files need only specify the
/// values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory that relative source paths resolve against.
    pub source_root: String,
    /// Directory rendered variants are written to.
    pub cache_dir: String,
    /// Prefix joined onto cache file names when building public URLs.
    pub url_prefix: String,
    /// Lossy encode quality used when a request does not specify one (1-100).
    pub default_quality: u32,
    /// Cache lifetime in seconds when a request does not specify one.
    /// Zero keeps entries forever.
    pub default_ttl_secs: u64,
    /// Aspect ratio as `[width, height]` applied when a request fixes only
    /// one dimension.
    pub default_aspect: [u32; 2],
    /// Background color for alpha flattening and solid-fill fallbacks.
    pub background: String,
    /// Permit scaling output past the source dimensions.
    pub allow_scale_larger: bool,
    /// Mark cache identities as demo renders so they never collide with
    /// production files.
    pub demo_mode: bool,
    /// TrueType/OpenType font for text overlays. Text steps are skipped
    /// (with a warning) when unset.
    pub font_path: Option<String>,
    /// Number of grid samples the dominant-color extractor averages.
    pub dominant_samples: u32,
    /// Parallel batch settings.
    pub processing: ProcessingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_root: ".".to_string(),
            cache_dir: "cache".to_string(),
            url_prefix: String::new(),
            default_quality: 90,
            default_ttl_secs: 0,
            default_aspect: [4, 3],
            background: "#ffffff".to_string(),
            allow_scale_larger: false,
            demo_mode: false,
            font_path: None,
            dominant_samples: 16,
            processing: ProcessingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_quality == 0 || self.default_quality > 100 {
            return Err(ConfigError::Validation(
                "default_quality must be 1-100".into(),
            ));
        }
        if self.default_aspect[0] == 0 || self.default_aspect[1] == 0 {
            return Err(ConfigError::Validation(
                "default_aspect values must be non-zero".into(),
            ));
        }
        if self.cache_dir.trim().is_empty() {
            return Err(ConfigError::Validation("cache_dir must not be empty".into()));
        }
        if self.dominant_samples == 0 {
            return Err(ConfigError::Validation(
                "dominant_samples must be at least 1".into(),
            ));
        }
        if let Err(err) = Color::parse(&self.background) {
            return Err(ConfigError::Validation(format!("background: {err}")));
        }
        Ok(())
    }

    /// Default aspect ratio as a `(width, height)` pair.
    pub fn aspect(&self) -> (u32, u32) {
        (self.default_aspect[0], self.default_aspect[1])
    }

    /// Parsed background color. `validate()` guarantees the string parses;
    /// white covers the unvalidated path.
    pub fn background_color(&self) -> Color {
        Color::parse(&self.background).unwrap_or(Color::WHITE)
    }
}

/// Parallel batch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel batch render workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Load config from a TOML file.
///
/// Returns stock defaults when the file does not exist. Unknown keys are
/// rejected and the result is validated.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `enlarger.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Enlarger Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Directory that relative source paths resolve against.
source_root = "."

# Directory rendered variants are written to.
cache_dir = "cache"

# Prefix joined onto cache file names when building public URLs,
# e.g. "/media" or "https://cdn.example.com/images".
url_prefix = ""

# ---------------------------------------------------------------------------
# Request defaults
# ---------------------------------------------------------------------------

# Lossy encode quality when a request gives none (1 = worst, 100 = best).
default_quality = 90

# Cache lifetime in seconds when a request gives none. 0 keeps forever.
default_ttl_secs = 0

# Aspect ratio as [width, height], used when a request fixes only one
# dimension. Common choices: [1, 1] square, [4, 3] landscape, [16, 9] wide.
default_aspect = [4, 3]

# Background color for alpha flattening (JPEG) and solid-fill fallbacks.
# Hex ("#ffffff", "#fff") or decimal channels ("255,255,255").
background = "#ffffff"

# Permit scaling output past the source dimensions.
allow_scale_larger = false

# Mark cache identities as demo renders so demo output never collides
# with production files.
demo_mode = false

# TrueType/OpenType font for text overlays. Text steps are skipped with a
# warning when unset.
# font_path = "fonts/DejaVuSans.ttf"

# Number of grid samples averaged for dominant-color placeholders.
dominant_samples = 16

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel batch render workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
