//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a per-module TOML file. Missing or
//! unreadable files never abort startup: a warning is logged and the
//! compiled defaults are used instead.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `EDU_ROOT_FOLDER`, then `EDU_ROOT` environment variables
//! 3. `root_folder` in the module's TOML file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the shared SQLite database inside the root folder
pub const DATABASE_FILE_NAME: &str = "edu.db";

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/edu (or /var/lib/edu for system-wide)
            dirs::data_local_dir()
                .map(|d| d.join("edu"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/edu"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("edu"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/edu"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("edu"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\edu"))
        } else {
            PathBuf::from("./edu_data")
        };

        Self {
            root_folder,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Every table is optional; absent keys take their built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings for the aggregate maintenance service (edu-agg)
    #[serde(default)]
    pub aggregate: AggregateSettings,

    /// Settings for the gradebook service (edu-gb)
    #[serde(default)]
    pub gradebook: GradebookSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
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

fn default_log_level() -> String {
    "info".to_string()
}

/// `[aggregate]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSettings {
    #[serde(default = "default_aggregate_port")]
    pub port: u16,

    /// Page size used when scanning the entity collection during recompute
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Seconds between scheduled self-healing recomputes (0 disables)
    #[serde(default = "default_recompute_interval_secs")]
    pub recompute_interval_secs: u64,

    /// Attempts the delivery worker makes per change event
    #[serde(default = "default_delivery_max_attempts")]
    pub delivery_max_attempts: u32,

    /// Base backoff between delivery attempts, multiplied by the attempt number
    #[serde(default = "default_delivery_backoff_ms")]
    pub delivery_backoff_ms: u64,

    /// Links examined per batch by the registry link reconciler
    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: usize,

    /// Seconds between scheduled link reconciliations (0 = manual only)
    #[serde(default)]
    pub reconcile_interval_secs: u64,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            port: default_aggregate_port(),
            scan_batch_size: default_scan_batch_size(),
            recompute_interval_secs: default_recompute_interval_secs(),
            delivery_max_attempts: default_delivery_max_attempts(),
            delivery_backoff_ms: default_delivery_backoff_ms(),
            reconcile_batch_size: default_reconcile_batch_size(),
            reconcile_interval_secs: 0,
        }
    }
}

fn default_aggregate_port() -> u16 {
    5810
}

fn default_scan_batch_size() -> usize {
    500
}

fn default_recompute_interval_secs() -> u64 {
    3600
}

fn default_delivery_max_attempts() -> u32 {
    3
}

fn default_delivery_backoff_ms() -> u64 {
    200
}

fn default_reconcile_batch_size() -> usize {
    100
}

/// `[gradebook]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradebookSettings {
    #[serde(default = "default_gradebook_port")]
    pub port: u16,

    /// Directory holding `<course_id>.toml` grade config trees.
    /// Defaults to `<root>/courses` when unset.
    #[serde(default)]
    pub courses_dir: Option<PathBuf>,

    /// Used when neither the request nor the course file sets a threshold
    #[serde(default = "default_passing_threshold")]
    pub default_passing_threshold: f64,
}

impl Default for GradebookSettings {
    fn default() -> Self {
        Self {
            port: default_gradebook_port(),
            courses_dir: None,
            default_passing_threshold: default_passing_threshold(),
        }
    }
}

fn default_gradebook_port() -> u16 {
    5811
}

fn default_passing_threshold() -> f64 {
    60.0
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load the module's config file, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using built-in defaults", e);
                Self::default()
            }
        }
    }
}

/// Resolves the root folder for a module
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
        }
    }

    /// Command-line override (highest priority)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Platform config file for this module: `<config dir>/edu/<module>.toml`
    pub fn config_file_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("edu").join(format!("{}.toml", self.module_name)))
    }

    /// Resolve the root folder. Never fails.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        for var in ["EDU_ROOT_FOLDER", "EDU_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        let config = TomlConfig::load_or_default(self.config_file_path().as_deref());
        if let Some(root) = config.root_folder {
            return root;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Prepares the resolved root folder
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing; safe to call repeatedly
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    pub fn courses_dir(&self) -> PathBuf {
        self.root_folder.join("courses")
    }
}
