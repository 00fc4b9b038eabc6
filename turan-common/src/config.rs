//! Bootstrap configuration loading and root folder resolution
//!
//! The TOML file carries only what is needed before the database is open:
//! root folder, database path, HTTP port, logging and collaborator endpoints.
//! Everything that can change at runtime lives in the `settings` table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TURAN_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the database and stored audio
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// SQLite database file (defaults to `<root>/turan.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Transcription collaborator endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionConfig {
    /// URL accepting audio bytes and returning `{text, confidence}`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent with each request
    #[serde(default)]
    pub api_key: Option<String>,
}

impl TomlConfig {
    /// Database path, falling back to `<root>/turan.db`
    pub fn database_path_or(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join("turan.db"))
    }
}

/// Load a TOML config file
///
/// A missing file is not an error: defaults are returned with a warning so
/// the service can still start.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Default config file location: `<config dir>/turan/<module>.toml`
pub fn default_config_path(module_name: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("turan")
        .join(format!("{}.toml", module_name))
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument
/// 2. `TURAN_ROOT_FOLDER` environment variable
/// 3. TOML config file
/// 4. OS-dependent default
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_value: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        let default = default_root_folder();
        info!(
            module = %self.module_name,
            "No root folder configured, using default {}",
            default.display()
        );
        default
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("turan"))
        .unwrap_or_else(|| PathBuf::from("./turan_data"))
}

/// Create the root folder if it is missing
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        info!("Created root folder {}", root_folder.display());
    }
    Ok(())
}
