//! Command-line interface for mongo-sheets-sync
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Applying command-line overrides on top of the configuration file
//! - The `check-config` subcommand

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel, UploadPolicy};
use crate::error::{ConfigError, Result};
use crate::sync::SyncSettings;

/// Export MongoDB collections to CSV and upload them to a drive folder
#[derive(Parser, Debug)]
#[command(
    name = "mongo-sheets-sync",
    version,
    about = "Export MongoDB collections to spreadsheets in a drive folder",
    long_about = "Exports every collection of the configured MongoDB databases to one CSV file
each and uploads them to a drive folder named after the application. By default
files are uploaded only on the run that creates the folder."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Database to export; repeat for several (overrides the configuration)
    #[arg(long = "database", value_name = "NAME")]
    pub databases: Vec<String>,

    /// When to upload: first-run, always or never
    #[arg(long, value_name = "POLICY")]
    pub upload_policy: Option<UploadPolicy>,

    /// Quiet mode (no progress bar or summary table)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Export and upload (the default)
    Run,

    /// Load and validate the configuration, then print the effective settings
    CheckConfig,
}

/// Parsed arguments plus the configuration they select
pub struct CliInterface {
    args: CliArgs,
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    ///
    /// # Returns
    /// * `Result<Self>` - CLI interface or a configuration error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Load configuration for already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let path = args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path);
        let mut config = Config::from_file(&path)?;
        Self::apply_args_to_config(&mut config, &args);
        config.validate()?;
        Ok(Self { args, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Configuration file in use
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    pub fn command(&self) -> Commands {
        self.args.command.clone().unwrap_or(Commands::Run)
    }

    /// Run settings with the command line applied
    pub fn sync_settings(&self) -> SyncSettings {
        let mut settings = SyncSettings::from_config(&self.config);
        settings.show_progress = !self.args.quiet;
        settings
    }

    /// Effective configuration as TOML
    pub fn render_config(&self) -> Result<String> {
        toml::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };

        if !args.databases.is_empty() {
            config.database.databases = Some(args.databases.clone());
        }
        if let Some(policy) = args.upload_policy {
            config.drive.upload_policy = policy;
        }
    }

    /// Print where the configuration came from and what it resolved to
    pub fn print_config(&self) -> Result<()> {
        println!("Configuration file: {}", display_path(&self.config_path()));
        println!();
        println!("{}", self.render_config()?);
        Ok(())
    }
}

fn display_path(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    const CONFIG: &str = r#"
        [app]
        application_name = "pConnect"

        [drive]
        client_secret_file = "client_secret.json"

        [database]
        type = "mongo"
        databases = ["shop"]
    "#;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, CONFIG).unwrap();
        path
    }

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::try_parse_from(["mongo-sheets-sync"]).unwrap();
        assert!(args.config_file.is_none());
        assert!(args.databases.is_empty());
        assert!(args.upload_policy.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_with_flags() {
        let args = CliArgs::try_parse_from([
            "mongo-sheets-sync",
            "-c",
            "sync.toml",
            "--database",
            "shop",
            "--database",
            "crm",
            "--upload-policy",
            "always",
            "-q",
            "check-config",
        ])
        .unwrap();
        assert_eq!(args.config_file, Some(PathBuf::from("sync.toml")));
        assert_eq!(args.databases, vec!["shop", "crm"]);
        assert_eq!(args.upload_policy, Some(UploadPolicy::Always));
        assert!(args.quiet);
        assert_eq!(args.command, Some(Commands::CheckConfig));
    }

    #[test]
    fn test_invalid_upload_policy_rejected() {
        let result =
            CliArgs::try_parse_from(["mongo-sheets-sync", "--upload-policy", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_arguments_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let args = CliArgs::try_parse_from([
            "mongo-sheets-sync",
            "-c",
            path.to_str().unwrap(),
            "--database",
            "crm",
            "--upload-policy",
            "never",
            "--vv",
        ])
        .unwrap();

        let cli = CliInterface::from_args(args).unwrap();
        assert_eq!(cli.config().database.databases, Some(vec!["crm".to_string()]));
        assert_eq!(cli.config().drive.upload_policy, UploadPolicy::Never);
        assert_eq!(cli.config().logging.level, LogLevel::Trace);
        assert_eq!(cli.command(), Commands::Run);
        assert!(cli.sync_settings().show_progress);
    }

    #[test]
    fn test_config_kept_without_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let args =
            CliArgs::try_parse_from(["mongo-sheets-sync", "-c", path.to_str().unwrap(), "-q"])
                .unwrap();

        let cli = CliInterface::from_args(args).unwrap();
        assert_eq!(cli.config().database.databases, Some(vec!["shop".to_string()]));
        assert_eq!(cli.config().logging.level, LogLevel::Error);
        assert!(!cli.sync_settings().show_progress);

        let rendered = cli.render_config().unwrap();
        assert!(rendered.contains("application_name = \"pConnect\""));
    }

    #[test]
    fn test_missing_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let args =
            CliArgs::try_parse_from(["mongo-sheets-sync", "-c", missing.to_str().unwrap()])
                .unwrap();

        let err = CliInterface::from_args(args).err().unwrap();
        assert!(matches!(err, SyncError::Config(ConfigError::FileNotFound(_))));
        assert!(err.is_fatal());
    }
}
