//! Viewer configuration module.
//!
//! Handles loading, validating, and merging a `gallery-state.toml` file. Stock
//! defaults match what published galleries expect, so most deployments need
//! no config file at all.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! manifest_file = ".metadata.json"  # Per-folder manifest, relative to the page
//! tag_delimiter = "|"               # Tag hierarchy separator
//!
//! [sync]
//! debounce_ms = 150                 # Quiescence window for filter/recursive toggles
//!
//! [http]
//! timeout_secs = 30                 # Per-request timeout
//! user_agent = "gallery-state/<version>"  # User-Agent header
//!
//! [prefetch]
//! enabled = true                    # Warm full-size images on hover
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [sync]
//! debounce_ms = 300
//! ```
//!
//! Unknown keys are rejected to catch typos early.

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

/// Viewer configuration.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Manifest file name, resolved against each page URL.
    pub manifest_file: String,
    /// Separator between hierarchy levels inside a tag.
    pub tag_delimiter: String,
    /// URL-state synchronization settings.
    pub sync: SyncConfig,
    /// HTTP transport settings.
    pub http: HttpConfig,
    /// Hover prefetch settings.
    pub prefetch: PrefetchConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            manifest_file: ".metadata.json".to_string(),
            tag_delimiter: "|".to_string(),
            sync: SyncConfig::default(),
            http: HttpConfig::default(),
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manifest_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "manifest_file must not be empty".into(),
            ));
        }
        if self.tag_delimiter.is_empty() {
            return Err(ConfigError::Validation(
                "tag_delimiter must not be empty".into(),
            ));
        }
        // Selected tags travel comma-joined in the URL fragment.
        if self.tag_delimiter.contains(',') {
            return Err(ConfigError::Validation(
                "tag_delimiter must not contain ','".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "http.timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// URL-state synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Toggles arriving within this many milliseconds of each other are
    /// coalesced into one recompute.
    pub debounce_ms: u64,
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { debounce_ms: 150 }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("gallery-state/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Hover prefetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrefetchConfig {
    pub enabled: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(ViewerConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults do not serialize: {e}")))
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

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ViewerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ViewerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file.
///
/// `None` yields the validated stock defaults. A path that does not exist
/// is an error: the user asked for that file explicitly.
pub fn load_config(path: Option<&Path>) -> Result<ViewerConfig, ConfigError> {
    let overlay = match path {
        Some(p) => {
            let content = fs::read_to_string(p)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock config file.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# gallery-state configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Manifest file published in every gallery folder, resolved against the
# page URL.
manifest_file = ".metadata.json"

# Separator between hierarchy levels inside a tag ("animals|birds").
# Must not contain ','.
tag_delimiter = "|"

# ---------------------------------------------------------------------------
# URL state synchronization
# ---------------------------------------------------------------------------
[sync]
# Filter and recursive toggles arriving within this window (milliseconds)
# are coalesced into a single recompute.
debounce_ms = 150

# ---------------------------------------------------------------------------
# HTTP transport
# ---------------------------------------------------------------------------
[http]
# Per-request timeout in seconds.
timeout_secs = 30

# User-Agent header sent with manifest and prefetch requests. The default
# carries this build's version.
# user_agent = "gallery-state/<version>"

# ---------------------------------------------------------------------------
# Hover prefetch
# ---------------------------------------------------------------------------
[prefetch]
# Warm the full-size image while the pointer rests on its thumbnail.
enabled = true
"##
}
