//! mongo-sheets-sync
//!
//! Exports MongoDB collections to CSV and uploads them to a drive folder.
//!
//! # Usage
//!
//! ```bash
//! # Export and upload using ./config.toml
//! mongo-sheets-sync
//!
//! # Only two databases, always upload
//! mongo-sheets-sync -c sync.toml --database shop --database crm --upload-policy always
//!
//! # Show the effective configuration
//! mongo-sheets-sync check-config
//! ```

use std::sync::Arc;

use mongo_sheets_sync::cli::{CliInterface, Commands};
use mongo_sheets_sync::error::Result;
use mongo_sheets_sync::{
    HttpDriveApi, MongoStore, StoredCredentialAuthenticator, SyncOrchestrator,
};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle `check-config` or run the synchronisation
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);

    match cli.command() {
        Commands::CheckConfig => cli.print_config(),
        Commands::Run => run_sync(&cli).await,
    }
}

/// Wire the production collaborators and run once
async fn run_sync(cli: &CliInterface) -> Result<()> {
    let config = cli.config();
    let store = MongoStore::connect(
        &config.database.host,
        config.database.port,
        config.connection_timeout(),
    )
    .await?;

    let mut orchestrator = SyncOrchestrator::new(
        cli.sync_settings(),
        Arc::new(store),
        HttpDriveApi::new(),
        StoredCredentialAuthenticator::new(config.credentials_dir()),
    );
    let report = orchestrator.run().await?;

    if !cli.args().quiet {
        println!("{}", report.render_table());
        println!("{report}");
    }
    Ok(())
}

/// Initialize logging on stderr from the effective log level
///
/// # Arguments
/// * `cli` - CLI interface with the resolved configuration
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
