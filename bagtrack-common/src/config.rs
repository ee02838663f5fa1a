//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a small TOML file. The root folder is
//! resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `BAGTRACK_ROOT_FOLDER`
//! 3. TOML config file `root_folder`
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "BAGTRACK_ROOT_FOLDER";

/// Environment variable naming an explicit TOML config file
pub const CONFIG_FILE_ENV: &str = "BAGTRACK_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "bagtrack.db";

/// Artifact directory name inside the root folder
pub const ARTIFACTS_DIR_NAME: &str = "artifacts";

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_addr: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_addr: "127.0.0.1:5730".to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_addr: default_bind_addr(),
            logging: LoggingConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Tunables for scan reconciliation and bulk operations
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconciliationConfig {
    /// Scanned input shorter than this is treated as a partial read and ignored
    #[serde(default = "default_min_tag_length")]
    pub min_tag_length: usize,

    /// Shortest digit run accepted from manifest text
    #[serde(default = "default_min_tag_length")]
    pub manifest_min_tag_length: usize,

    /// Longest digit run accepted from manifest text
    #[serde(default = "default_manifest_max_tag_length")]
    pub manifest_max_tag_length: usize,

    /// Mutations per batch for manifest import and cascade delete
    #[serde(default = "default_batch_page_size")]
    pub batch_page_size: usize,

    /// Compare-and-swap attempts before a flight update reports contention
    #[serde(default = "default_status_update_max_attempts")]
    pub status_update_max_attempts: u32,
}

/// Largest batch the document store accepts in a single commit
pub const MAX_BATCH_PAGE_SIZE: usize = 500;

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            min_tag_length: default_min_tag_length(),
            manifest_min_tag_length: default_min_tag_length(),
            manifest_max_tag_length: default_manifest_max_tag_length(),
            batch_page_size: default_batch_page_size(),
            status_update_max_attempts: default_status_update_max_attempts(),
        }
    }
}

impl ReconciliationConfig {
    /// Validate ranges, clamping the batch size into `1..=MAX_BATCH_PAGE_SIZE`
    pub fn validated(mut self) -> Result<Self> {
        if self.manifest_min_tag_length == 0 {
            return Err(Error::Config(
                "manifest_min_tag_length must be at least 1".to_string(),
            ));
        }
        if self.manifest_min_tag_length > self.manifest_max_tag_length {
            return Err(Error::Config(format!(
                "manifest_min_tag_length ({}) exceeds manifest_max_tag_length ({})",
                self.manifest_min_tag_length, self.manifest_max_tag_length
            )));
        }
        if self.status_update_max_attempts == 0 {
            return Err(Error::Config(
                "status_update_max_attempts must be at least 1".to_string(),
            ));
        }
        let clamped = self.batch_page_size.clamp(1, MAX_BATCH_PAGE_SIZE);
        if clamped != self.batch_page_size {
            warn!(
                requested = self.batch_page_size,
                clamped, "batch_page_size out of range, clamped"
            );
            self.batch_page_size = clamped;
        }
        Ok(self)
    }
}

fn default_bind_addr() -> String {
    CompiledDefaults::for_current_platform().bind_addr
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_tag_length() -> usize {
    6
}

fn default_manifest_max_tag_length() -> usize {
    12
}

fn default_batch_page_size() -> usize {
    400
}

fn default_status_update_max_attempts() -> u32 {
    8
}

/// Load TOML config from an explicit path
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(config)
}

/// Load TOML config from `BAGTRACK_CONFIG` or the platform location,
/// falling back to defaults with a warning
pub fn load_toml_config_or_default() -> TomlConfig {
    let path = match std::env::var(CONFIG_FILE_ENV) {
        Ok(explicit) => Some(PathBuf::from(explicit)),
        Err(_) => config_file_path(),
    };

    let Some(path) = path else {
        warn!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config file: {}", path.display());
            config
        }
        Err(e) => {
            warn!("Could not load config file {}: {}. Using compiled defaults", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Platform config file location, if one exists
fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("bagtrack").join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/bagtrack/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("bagtrack"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/bagtrack"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("bagtrack"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/bagtrack"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("bagtrack"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\bagtrack"))
    } else {
        PathBuf::from("./bagtrack_data")
    }
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
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

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout on first run
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        let artifacts = self.artifacts_path();
        if !artifacts.exists() {
            std::fs::create_dir_all(&artifacts)?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.root_folder.join(ARTIFACTS_DIR_NAME)
    }
}
