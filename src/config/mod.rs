//! Configuration management for mongo-sheets-sync
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! file that drives a synchronisation run:
//! - `[app]`: application name and base directory
//! - `[drive]`: remote storage scopes, client secret, listing and upload policy
//! - `[database]`: MongoDB host/port and which databases to scan
//! - `[logging]`: log level and timestamps
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application identity and local layout
    pub app: AppConfig,

    /// Remote drive configuration
    pub drive: DriveConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application identity and local staging layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the application; also the remote folder name
    pub application_name: String,

    /// Base directory holding the `upload`, `download` and `base` folders
    #[serde(default = "default_base_directory")]
    pub base_directory: PathBuf,
}

/// Remote drive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// OAuth scopes requested for the drive
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Path to the OAuth client secret JSON
    pub client_secret_file: PathBuf,

    /// Number of entries fetched per directory listing page
    #[serde(default = "default_folder_page_size")]
    pub folder_page_size: u32,

    /// Follow page tokens until the listing is exhausted
    #[serde(default)]
    pub list_all_pages: bool,

    /// When staged files are uploaded
    #[serde(default)]
    pub upload_policy: UploadPolicy,

    /// Directory holding stored credentials (defaults to `~/.credentials`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_dir: Option<PathBuf>,
}

/// When staged export files are uploaded to the remote folder
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UploadPolicy {
    /// Upload only when the remote folder had to be created
    #[default]
    FirstRun,

    /// Upload on every run
    Always,

    /// Never upload; exports stay in the staging area
    Never,
}

/// Kind of document database
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Mongo,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database kind; only MongoDB is supported
    #[serde(rename = "type", default)]
    pub kind: DatabaseKind,

    /// Server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Explicit databases to export; all databases when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<String>>,

    /// Databases never exported when enumerating
    #[serde(default = "default_ignored_databases")]
    pub ignored_databases: Vec<String>,

    /// Include `system.*` collections
    #[serde(default)]
    pub include_system_collections: bool,

    /// Upper bound on collections fetched at the same time
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_base_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/drive.file".to_string(),
        "https://spreadsheets.google.com/feeds".to_string(),
    ]
}

fn default_folder_page_size() -> u32 {
    20
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_ignored_databases() -> Vec<String> {
    ["local", "config", "test", "admin"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_timeout() -> u64 {
    30
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: DatabaseKind::default(),
            host: default_host(),
            port: default_port(),
            databases: None,
            ignored_databases: default_ignored_databases(),
            include_system_collections: false,
            max_concurrent_fetches: default_max_concurrent_fetches(),
            timeout: default_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::InvalidFormat(format!("{}: {e}", path.display())),
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - `config.toml` in the working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.app.application_name.trim().is_empty() {
            return Err(ConfigError::MissingField("app.application_name".into()).into());
        }
        if self.app.application_name.contains(['/', '\\']) {
            return Err(invalid("app.application_name", &self.app.application_name));
        }
        if self.drive.client_secret_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("drive.client_secret_file".into()).into());
        }
        if self.drive.scopes.is_empty() {
            return Err(ConfigError::MissingField("drive.scopes".into()).into());
        }
        if self.drive.folder_page_size == 0 {
            return Err(invalid("drive.folder_page_size", "0"));
        }
        if self.database.max_concurrent_fetches == 0 {
            return Err(invalid("database.max_concurrent_fetches", "0"));
        }
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::MissingField("database.host".into()).into());
        }
        if let Some(names) = &self.database.databases {
            if let Some(bad) = names.iter().find(|n| n.trim().is_empty()) {
                return Err(invalid("database.databases", bad));
            }
        }
        Ok(())
    }

    /// Get the server selection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.database.timeout)
    }

    /// Directory where credentials are persisted
    pub fn credentials_dir(&self) -> PathBuf {
        self.drive.credentials_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".credentials")
        })
    }
}

fn invalid(field: &str, value: &str) -> crate::error::SyncError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for UploadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadPolicy::FirstRun => write!(f, "first-run"),
            UploadPolicy::Always => write!(f, "always"),
            UploadPolicy::Never => write!(f, "never"),
        }
    }
}

impl std::str::FromStr for UploadPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first-run" | "first_run" | "firstrun" => Ok(UploadPolicy::FirstRun),
            "always" => Ok(UploadPolicy::Always),
            "never" => Ok(UploadPolicy::Never),
            other => Err(format!(
                "unknown upload policy '{other}' (expected first-run, always or never)"
            )),
        }
    }
}

impl UploadPolicy {
    /// Whether staged files should be uploaded for a run
    pub fn should_upload(&self, is_first_run: bool) -> bool {
        match self {
            UploadPolicy::FirstRun => is_first_run,
            UploadPolicy::Always => true,
            UploadPolicy::Never => false,
        }
    }
}
