//! mongo-sheets-sync library
//!
//! Exports MongoDB collections to one CSV file each and places them in a
//! drive folder named after the application. The folder is created on the
//! first run; whether later runs upload again is governed by the
//! [`config::UploadPolicy`].
//!
//! # Modules
//!
//! - `auth`: Credential acquisition for the drive
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `context`: Per-run identity and staging directories
//! - `encoder`: Column derivation and CSV encoding
//! - `error`: Error types and handling
//! - `remote`: Drive transport and folder/file placement
//! - `scanner`: Database enumeration and collection reads
//! - `sync`: The orchestrating state machine and run report
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mongo_sheets_sync::{
//!     Config, HttpDriveApi, MongoStore, StoredCredentialAuthenticator, SyncOrchestrator,
//!     SyncSettings,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let store = MongoStore::connect(
//!         &config.database.host,
//!         config.database.port,
//!         config.connection_timeout(),
//!     )
//!     .await?;
//!
//!     let report = SyncOrchestrator::new(
//!         SyncSettings::from_config(&config),
//!         Arc::new(store),
//!         HttpDriveApi::new(),
//!         StoredCredentialAuthenticator::new(config.credentials_dir()),
//!     )
//!     .run()
//!     .await?;
//!
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod remote;
pub mod scanner;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use auth::{Authenticator, Credentials, StoredCredentialAuthenticator};
pub use config::{Config, UploadPolicy};
pub use context::{RunContext, StagingArea};
pub use encoder::{ColumnSet, ExportFile};
pub use error::{Result, SyncError};
pub use remote::{DriveApi, HttpDriveApi, RemoteStore};
pub use scanner::{DatabaseScanner, DocumentStore, MongoStore};
pub use sync::{SyncOrchestrator, SyncReport, SyncSettings, SyncState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
