//! Service configuration module.
//!
//! Handles loading, validating, and merging the service's `config.toml`.
//! Stock defaults are the base layer; a user config file (passed with
//! `--config`) overrides any subset of keys.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! bind = "0.0.0.0:8080"         # Listen address
//! max_upload_bytes = 10485760   # Largest accepted request body (10 MiB)
//! request_timeout_secs = 30     # Wall-time bound per resize
//!
//! [storage]
//! root = "media"                # Directory holding resized images
//! url_prefix = "media"          # Prefix of paths returned to clients
//!
//! [images]
//! default_width = 100           # Used when the form omits `width`
//! default_height = 0            # Used when the form omits `height` (0 = auto)
//! jpeg_quality = 75             # JPEG encoding quality (1-100)
//! max_dimension = 4096          # Largest requested or derived output width/height
//! max_source_pixels = 40000000  # Largest decoded source area
//! max_source_dimension = 16384  # Largest decoded source width/height
//! max_frames = 500              # Largest accepted GIF frame count
//! max_animation_pixels = 200000000  # Per-GIF pixel budget over all frames
//!
//! [processing]
//! max_threads = 4               # Frame-resize workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Quality, ResourceLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Where resized images are stored.
    pub storage: StorageConfig,
    /// Resize defaults and input limits.
    pub images: ImagesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind must not be empty".into(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_upload_bytes must be non-zero".into(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.request_timeout_secs must be non-zero".into(),
            ));
        }
        if self.storage.root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.root must not be empty".into(),
            ));
        }
        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(ConfigError::Validation(
                "images.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.images.max_dimension == 0 || self.images.max_dimension > u32::from(u16::MAX) {
            return Err(ConfigError::Validation(format!(
                "images.max_dimension must be 1-{}",
                u16::MAX
            )));
        }
        if self.images.default_width == 0 && self.images.default_height == 0 {
            return Err(ConfigError::Validation(
                "images.default_width and images.default_height cannot both be 0".into(),
            ));
        }
        if self.images.default_width > self.images.max_dimension
            || self.images.default_height > self.images.max_dimension
        {
            return Err(ConfigError::Validation(
                "images default size must not exceed images.max_dimension".into(),
            ));
        }
        if self.images.max_source_pixels == 0
            || self.images.max_source_dimension == 0
            || self.images.max_frames == 0
            || self.images.max_animation_pixels == 0
        {
            return Err(ConfigError::Validation(
                "images source limits must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
    /// Wall-time bound for one resize, in seconds.
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            max_upload_bytes: 10 << 20,
            request_timeout_secs: 30,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding resized images.
    pub root: String,
    /// Prefix of the storage-relative paths returned to clients.
    pub url_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "media".to_string(),
            url_prefix: "media".to_string(),
        }
    }
}

/// Resize defaults and input limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Width used when a request omits it.
    pub default_width: u32,
    /// Height used when a request omits it (0 = derive from aspect ratio).
    pub default_height: u32,
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub jpeg_quality: u32,
    /// Largest accepted requested width or height.
    pub max_dimension: u32,
    /// Largest decoded source area, in pixels.
    pub max_source_pixels: u64,
    /// Largest decoded source width or height.
    pub max_source_dimension: u32,
    /// Largest accepted animation frame count.
    pub max_frames: usize,
    /// Pixel budget for one animation, counted separately over the source
    /// frames and over the resized frames.
    pub max_animation_pixels: u64,
}

impl ImagesConfig {
    pub fn quality(&self) -> Quality {
        Quality::new(self.jpeg_quality)
    }

    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_source_pixels: self.max_source_pixels,
            max_source_dimension: self.max_source_dimension,
            max_frames: self.max_frames,
            max_animation_pixels: self.max_animation_pixels,
            max_output_dimension: self.max_dimension,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        let limits = ResourceLimits::default();
        Self {
            default_width: 100,
            default_height: 0,
            jpeg_quality: u32::from(Quality::default().value()),
            max_dimension: limits.max_output_dimension,
            max_source_pixels: limits.max_source_pixels,
            max_source_dimension: limits.max_source_dimension,
            max_frames: limits.max_frames,
            max_animation_pixels: limits.max_animation_pixels,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of threads resizing animation frames.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_threads
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ServiceConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ServiceConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the service config.
///
/// With `None`, returns the validated stock defaults. With a path, the file
/// must exist; its values are merged on top of the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let overlay = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# media-resizer configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Pass this file with `media-resizer --config config.toml serve`.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
# Socket address to listen on.
bind = "0.0.0.0:8080"

# Largest accepted upload (request body) in bytes. Default: 10 MiB.
max_upload_bytes = 10485760

# Wall-time bound for a single resize, in seconds.
request_timeout_secs = 30

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Directory holding resized images. Files are named <fingerprint><ext>.
# Entries are never evicted.
root = "media"

# Prefix of the paths returned to clients: {"path": "media/<file>"}.
url_prefix = "media"

# ---------------------------------------------------------------------------
# Images
# ---------------------------------------------------------------------------
[images]
# Size used when an upload omits the width/height form fields.
# 0 on one axis means "derive from the aspect ratio".
default_width = 100
default_height = 0

# JPEG encoding quality (1 = worst, 100 = best). PNG is always lossless.
jpeg_quality = 75

# Largest output width or height (at most 65535). Applies to the requested
# axes and to an axis derived from the aspect ratio.
max_dimension = 4096

# Decode limits for untrusted uploads.
max_source_pixels = 40000000
max_source_dimension = 16384
max_frames = 500

# Pixel budget for one GIF. The summed area of the decoded frames and the
# summed area of the resized frames must each stay within it.
max_animation_pixels = 200000000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum threads used to resize animation frames in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4
"##
}
