//! Optimizer configuration.
//!
//! Handles loading, validating, and merging `optim.toml`. The file lives in
//! the image root and is entirely optional: stock defaults reproduce the
//! classic behaviour (GIF/JPEG/PNG, mtime fingerprints, `pngout` and `svgo`
//! disabled, quiet tools).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [scan]
//! extensions = ["gif", "jpeg", "jpg", "png"]
//!
//! [cache]
//! file = "image_optim_cache.json"   # relative to the image root
//! fingerprint = "mtime"             # "mtime" or "sha256"
//! checkpoint_every = 0              # save after every N optimized files (0 = end only)
//!
//! [optimizer]
//! backend = "rust"                  # "rust" or "tools"
//! allow_lossy = false               # rust backend: re-encode JPEGs
//! jpeg_quality = 90
//! disabled = ["pngout", "svgo"]     # tools backend: workers never run
//! verbose = false                   # tools backend: show tool output
//! on_error = "continue"             # "continue" or "abort"
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [optimizer]
//! backend = "tools"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::DEFAULT_CACHE_FILENAME;
use crate::fingerprint::FingerprintStrategy;
use crate::optimizer::tools::worker_names;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file inside the image root.
pub const CONFIG_FILENAME: &str = "optim.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `optim.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimConfig {
    /// Candidate discovery settings.
    pub scan: ScanConfig,
    /// Cache document settings.
    pub cache: CacheConfig,
    /// Optimizer backend settings.
    pub optimizer: OptimizerConfig,
}

impl OptimConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "scan.extensions must not be empty".into(),
            ));
        }
        if self
            .scan
            .extensions
            .iter()
            .any(|e| e.trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::Validation(
                "scan.extensions must not contain empty entries".into(),
            ));
        }
        if self.cache.file.trim().is_empty() {
            return Err(ConfigError::Validation("cache.file must not be empty".into()));
        }
        if !(1..=100).contains(&self.optimizer.jpeg_quality) {
            return Err(ConfigError::Validation(
                "optimizer.jpeg_quality must be 1-100".into(),
            ));
        }
        if let Some(unknown) = self
            .optimizer
            .disabled
            .iter()
            .find(|d| !worker_names().any(|w| w == d.as_str()))
        {
            let known: Vec<&str> = worker_names().collect();
            return Err(ConfigError::Validation(format!(
                "optimizer.disabled: unknown worker '{}' (known: {})",
                unknown,
                known.join(", ")
            )));
        }
        Ok(())
    }
}

/// Candidate discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// File extensions treated as images (case-insensitive).
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: ["gif", "jpeg", "jpg", "png"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Cache document settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Document path, relative to the image root.
    pub file: String,
    /// How file changes are detected.
    pub fingerprint: FingerprintStrategy,
    /// Save after every N optimized files. `0` saves only at the end.
    pub checkpoint_every: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file: DEFAULT_CACHE_FILENAME.to_string(),
            fingerprint: FingerprintStrategy::Mtime,
            checkpoint_every: 0,
        }
    }
}

/// Which optimizer implementation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pure Rust, via the `image` crate.
    #[default]
    Rust,
    /// External command-line tools found on `PATH`.
    Tools,
}

/// What the scanner does after a file fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the failure and move on to the next file.
    #[default]
    Continue,
    /// Stop at the first failure (successes so far are still saved).
    Abort,
}

/// Optimizer backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub backend: BackendKind,
    /// Rust backend: allow lossy JPEG re-encoding.
    pub allow_lossy: bool,
    /// Rust backend: JPEG quality when `allow_lossy` is set (1-100).
    pub jpeg_quality: u32,
    /// Tools backend: worker names that are never run.
    pub disabled: Vec<String>,
    /// Tools backend: let workers print their own output.
    pub verbose: bool,
    /// Continue past per-file failures or stop at the first one.
    pub on_error: ErrorPolicy,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Rust,
            allow_lossy: false,
            jpeg_quality: 90,
            disabled: vec!["pngout".to_string(), "svgo".to_string()],
            verbose: false,
            on_error: ErrorPolicy::Continue,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(OptimConfig::default())?)
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

/// Load `optim.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config for the image root.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<OptimConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(root)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: OptimConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `optim.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image optimizer configuration
# =============================
# Place this file in the image root as optim.toml.
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Candidate discovery
# ---------------------------------------------------------------------------
[scan]
# File extensions treated as images (case-insensitive), searched recursively.
extensions = ["gif", "jpeg", "jpg", "png"]

# ---------------------------------------------------------------------------
# Cache
# ---------------------------------------------------------------------------
[cache]
# Cache document, relative to the image root.
file = "image_optim_cache.json"

# How changes are detected:
#   "mtime"  - file modification time (cheap, fooled by clock skew)
#   "sha256" - content hash (reads every file on every run)
fingerprint = "mtime"

# Save the cache after every N optimized files so an interrupted run keeps
# its progress. 0 saves only once, at the end of the run.
checkpoint_every = 0

# ---------------------------------------------------------------------------
# Optimizer
# ---------------------------------------------------------------------------
[optimizer]
# "rust"  - built-in lossless PNG recompression, no external tools needed
# "tools" - external optimizers found on PATH (optipng, jpegoptim, ...)
backend = "rust"

# rust backend: also re-encode JPEGs at jpeg_quality (lossy).
allow_lossy = false
jpeg_quality = 90

# tools backend: workers that are never run.
# Known: pngcrush, pngout, advpng, optipng, oxipng, jpegoptim, jpegtran,
#        gifsicle, svgo
disabled = ["pngout", "svgo"]

# tools backend: show each tool's own output.
verbose = false

# What to do when a file fails to optimize:
#   "continue" - report it, keep going, retry it next run
#   "abort"    - stop the run (files optimized so far are still cached)
on_error = "continue"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = OptimConfig::default();
        assert_eq!(config.scan.extensions, vec!["gif", "jpeg", "jpg", "png"]);
        assert_eq!(config.cache.file, "image_optim_cache.json");
        assert_eq!(config.cache.fingerprint, FingerprintStrategy::Mtime);
        assert_eq!(config.cache.checkpoint_every, 0);
        assert_eq!(config.optimizer.backend, BackendKind::Rust);
        assert_eq!(config.optimizer.disabled, vec!["pngout", "svgo"]);
        assert!(!config.optimizer.verbose);
        assert_eq!(config.optimizer.on_error, ErrorPolicy::Continue);
    }

    #[test]
    fn default_config_is_valid() {
        OptimConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[optimizer]
backend = "tools"
"#;
        let config: OptimConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.optimizer.backend, BackendKind::Tools);
        // Defaults preserved
        assert_eq!(config.optimizer.disabled, vec!["pngout", "svgo"]);
        assert_eq!(config.scan.extensions.len(), 4);
    }

    #[test]
    fn parse_enums() {
        let toml = r#"
[cache]
fingerprint = "sha256"

[optimizer]
on_error = "abort"
"#;
        let config: OptimConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.fingerprint, FingerprintStrategy::Sha256);
        assert_eq!(config.optimizer.on_error, ErrorPolicy::Abort);
    }

    #[test]
    fn stock_config_toml_matches_defaults() {
        let parsed: OptimConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(parsed, OptimConfig::default());
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, OptimConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
[scan]
extensions = ["png"]

[cache]
checkpoint_every = 5
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.scan.extensions, vec!["png"]);
        assert_eq!(config.cache.checkpoint_every, 5);
        assert_eq!(config.cache.file, "image_optim_cache.json");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "this is not toml [[[").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn load_config_unknown_key_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "[optimizer]\nbakend = \"tools\"\n",
        )
        .unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn validate_rejects_empty_extensions() {
        let mut config = OptimConfig::default();
        config.scan.extensions.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));

        config.scan.extensions = vec![".".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_cache_file() {
        let mut config = OptimConfig::default();
        config.cache.file = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_quality() {
        let mut config = OptimConfig::default();
        config.optimizer.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.optimizer.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_worker() {
        let mut config = OptimConfig::default();
        config.optimizer.disabled.push("imagemagick".to_string());
        match config.validate() {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("imagemagick")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str("[t]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[t]\ny = 9").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["t"]["x"].as_integer(), Some(1));
        assert_eq!(merged["t"]["y"].as_integer(), Some(9));
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str("a = [1, 2]").unwrap();
        let overlay: toml::Value = toml::from_str("a = [3]").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_array().unwrap().len(), 1);
    }
}
