//! Configuration loading and root folder resolution
//!
//! Every tm service reads the same TOML layout. Missing files are not fatal:
//! the loader logs a warning and falls back to defaults so a service can start
//! with environment variables alone.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "TM_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "TM_ROOT_FOLDER";

/// On-disk TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder holding the database, uploads and enhanced images
    pub root_folder: Option<PathBuf>,
    /// HTTP listen port
    pub port: Option<u16>,
    pub provider: ProviderSection,
    pub enhancement: EnhancementSection,
    pub training: TrainingSection,
}

/// `[provider]` section: training/prediction service credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSection {
    pub training_endpoint: Option<String>,
    pub training_key: Option<String>,
    pub prediction_key: Option<String>,
    pub prediction_resource_id: Option<String>,
    /// Classification domain to create projects in ("General" if unset)
    pub domain_name: Option<String>,
    /// Name the trained iteration is published under ("myModel" if unset)
    pub publish_name: Option<String>,
}

/// `[enhancement]` section: image enhancement service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnhancementSection {
    pub endpoint: Option<String>,
    pub key: Option<String>,
    /// "abort" or "fallback"
    pub failure_policy: Option<String>,
    /// Keep a copy of every enhanced image under `enhanced/<class>/`
    pub save_enhanced: Option<bool>,
}

/// `[training]` section: ingestion, polling and retry tunables
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingSection {
    pub batch_limit: Option<usize>,
    pub poll_base_interval_ms: Option<u64>,
    pub poll_max_interval_ms: Option<u64>,
    pub poll_backoff_factor: Option<f64>,
    pub poll_max_wait_secs: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_initial_backoff_ms: Option<u64>,
    /// Seconds a finished job stays queryable
    pub job_retention_secs: Option<u64>,
}

/// Load TOML configuration from `path`
///
/// A missing file yields `TomlConfig::default()` with a warning; a file that
/// exists but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using defaults and environment",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Resolve the config file path
///
/// Priority: CLI argument, then `TM_CONFIG`, then `<config_dir>/tm/<module>.toml`.
pub fn resolve_config_path(cli_arg: Option<&Path>, module_name: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .map(|d| d.join("tm").join(format!("{}.toml", module_name)))
        .unwrap_or_else(|| PathBuf::from(format!("./{}.toml", module_name)))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `TM_ROOT_FOLDER`
/// 3. TOML `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("tm"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tm"))
    } else {
        // ~/.local/share/tm on Linux, ~/Library/Application Support/tm on macOS
        dirs::data_local_dir()
            .map(|d| d.join("tm"))
            .unwrap_or_else(|| PathBuf::from("./tm_data"))
    }
}

/// Validate a secret or endpoint value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
