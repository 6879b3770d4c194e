//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILPRESS_CONFIG` (environment variable)
//! 2. `~/.config/mailpress/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailpress\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::render::{Orientation, PageSize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Conversion defaults.
    pub conversion: ConversionConfig,
    /// Character-encoding resolution tuning.
    pub encoding: EncodingConfig,
    /// Rendering backend limits.
    pub render: RenderConfig,
    /// Batch processing tuning.
    pub batch: BatchConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Conversion defaults, overridable per invocation from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Default page size: "a4", "letter", "a3". Unknown values fall back to A4.
    pub page_size: String,
    /// Default orientation: "portrait" or "landscape". Unknown values fall
    /// back to portrait.
    pub orientation: String,
    /// Whether attachments are written out next to the document. On by
    /// default; the CLI opts out with `--no-attachments`.
    pub extract_attachments: bool,
    /// Maximum body length in characters before the composer truncates with
    /// a visible marker.
    pub max_body_chars: usize,
}

/// Character-encoding resolution tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Minimum confidence required to accept the statistical detector's
    /// guess before the fixed fallback chain runs. `0.0` accepts any guess;
    /// values above `1.0` disable the detector entirely.
    pub detector_confidence_threshold: f64,
}

/// Rendering backend limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Wall-clock budget for one rendering call, in seconds.
    pub timeout_secs: u64,
    /// Ceiling on the rendered document size, in bytes.
    pub max_output_bytes: u64,
}

/// Batch processing tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of parallel workers for batch conversion.
    pub workers: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            page_size: "a4".to_string(),
            orientation: "portrait".to_string(),
            extract_attachments: true,
            max_body_chars: 50_000,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            detector_confidence_threshold: 0.7,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_output_bytes: 50 * 1024 * 1024, // 50 MB
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl ConversionConfig {
    /// Resolve the configured page size, falling back to A4 on unknown values.
    pub fn page_size(&self) -> PageSize {
        PageSize::from_name(&self.page_size).unwrap_or_else(|| {
            tracing::warn!(value = %self.page_size, "Unknown page size, using A4");
            PageSize::A4
        })
    }

    /// Resolve the configured orientation, falling back to portrait.
    pub fn orientation(&self) -> Orientation {
        Orientation::from_name(&self.orientation).unwrap_or_else(|| {
            tracing::warn!(value = %self.orientation, "Unknown orientation, using portrait");
            Orientation::Portrait
        })
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILPRESS_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailpress").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailpress")
}
