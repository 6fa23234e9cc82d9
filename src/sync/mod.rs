//! Synchronisation pipeline
//!
//! [`SyncOrchestrator`] drives one run through its states:
//!
//! ```text
//! Idle -> Authenticating -> LocatingRemoteFolder -> [CreatingRemoteFolder]
//!      -> Scanning -> FetchingConcurrently -> Encoding -> [Uploading] -> Done
//! ```
//!
//! Any fatal error moves the run to `Failed`. Fetch, encode and upload
//! failures are isolated to their collection or file and recorded in the
//! [`SyncReport`]. Each stage finishes completely before the next begins.

pub mod progress;
pub mod report;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::auth::Authenticator;
use crate::config::{Config, UploadPolicy};
use crate::context::RunContext;
use crate::encoder::{self, ExportFile};
use crate::error::{Result, SyncError};
use crate::remote::{DriveApi, RemoteStore};
use crate::scanner::{
    CollectionFetcher, CollectionHandle, CollectionResult, DatabaseScanner, DocumentStore,
    ScanOptions,
};

pub use progress::ProgressTracker;
pub use report::{FailureRecord, FailureStage, SyncReport, UploadRecord};

/// States of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Authenticating,
    LocatingRemoteFolder,
    CreatingRemoteFolder,
    Scanning,
    FetchingConcurrently,
    Encoding,
    Uploading,
    Done,
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Authenticating => "authenticating",
            SyncState::LocatingRemoteFolder => "locating-remote-folder",
            SyncState::CreatingRemoteFolder => "creating-remote-folder",
            SyncState::Scanning => "scanning",
            SyncState::FetchingConcurrently => "fetching",
            SyncState::Encoding => "encoding",
            SyncState::Uploading => "uploading",
            SyncState::Done => "done",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a run needs from configuration and the command line
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub application_name: String,
    pub base_directory: PathBuf,
    pub scopes: Vec<String>,
    pub client_secret_file: PathBuf,
    pub folder_page_size: u32,
    pub list_all_pages: bool,
    pub upload_policy: UploadPolicy,
    /// Scan only these databases instead of enumerating the server
    pub databases: Option<Vec<String>>,
    pub scan: ScanOptions,
    pub max_concurrent_fetches: usize,
    pub show_progress: bool,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        let db = &config.database;
        Self {
            application_name: config.app.application_name.clone(),
            base_directory: config.app.base_directory.clone(),
            scopes: config.drive.scopes.clone(),
            client_secret_file: config.drive.client_secret_file.clone(),
            folder_page_size: config.drive.folder_page_size,
            list_all_pages: config.drive.list_all_pages,
            upload_policy: config.drive.upload_policy,
            databases: db.databases.clone(),
            scan: ScanOptions {
                ignored_databases: db.ignored_databases.iter().cloned().collect(),
                include_system_collections: db.include_system_collections,
            },
            max_concurrent_fetches: db.max_concurrent_fetches,
            show_progress: false,
        }
    }
}

/// Runs the pipeline once
pub struct SyncOrchestrator<S, A, Au> {
    settings: SyncSettings,
    store: Arc<S>,
    drive: Option<A>,
    authenticator: Au,
    state: SyncState,
    history: Vec<SyncState>,
}

impl<S, A, Au> SyncOrchestrator<S, A, Au>
where
    S: DocumentStore,
    A: DriveApi,
    Au: Authenticator,
{
    pub fn new(settings: SyncSettings, store: Arc<S>, drive: A, authenticator: Au) -> Self {
        Self {
            settings,
            store,
            drive: Some(drive),
            authenticator,
            state: SyncState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// States entered so far, in order
    pub fn history(&self) -> &[SyncState] {
        &self.history
    }

    fn transition(&mut self, next: SyncState) {
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        self.history.push(next);
    }

    /// Execute the run to a terminal state
    ///
    /// An orchestrator runs once; calling this again after `Done` or
    /// `Failed` is an error and leaves the state unchanged.
    ///
    /// # Returns
    /// * `Result<SyncReport>` - Report on success; the fatal error otherwise
    pub async fn run(&mut self) -> Result<SyncReport> {
        if self.state.is_terminal() {
            return Err(SyncError::Generic(format!(
                "orchestrator has already run (state: {})",
                self.state
            )));
        }
        match self.execute().await {
            Ok(report) => {
                self.transition(SyncState::Done);
                info!(%report, "Synchronisation finished");
                Ok(report)
            }
            Err(e) => {
                self.transition(SyncState::Failed);
                error!(error = %e, "Synchronisation failed");
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<SyncReport> {
        let drive = self
            .drive
            .take()
            .ok_or_else(|| SyncError::Generic("orchestrator has already run".into()))?;

        self.transition(SyncState::Authenticating);
        let credentials = self
            .authenticator
            .obtain_credentials(
                &self.settings.scopes,
                &self.settings.client_secret_file,
                &self.settings.application_name,
            )
            .await?;

        let mut context = RunContext::new(
            self.settings.application_name.clone(),
            &self.settings.base_directory,
            credentials,
        );
        debug!(expires_at = ?context.credentials.expires_at(), "Credentials obtained");
        info!(
            run = %context.short_run_id(),
            operator = context.operator.as_deref().unwrap_or("-"),
            host = context.host.as_deref().unwrap_or("-"),
            base = %context.base_directory.display(),
            "Starting synchronisation"
        );
        context.staging.ensure().await?;

        let remote = RemoteStore::new(
            drive,
            context.credentials.clone(),
            self.settings.folder_page_size,
            self.settings.list_all_pages,
        );

        self.transition(SyncState::LocatingRemoteFolder);
        let folder_id = match remote.find_folder(&context.application_name).await? {
            Some(id) => {
                debug!(folder = %context.application_name, id = %id, "Remote folder found");
                id
            }
            None => {
                self.transition(SyncState::CreatingRemoteFolder);
                context.is_first_run = true;
                remote.create_folder(&context.application_name).await?
            }
        };
        let mut report = SyncReport::new(
            context.run_id,
            context.started_at,
            context.is_first_run,
            &folder_id,
        );

        self.transition(SyncState::Scanning);
        let scanner = DatabaseScanner::new(Arc::clone(&self.store), self.settings.scan.clone());
        let targets = scanner
            .list_target_collections(self.settings.databases.as_deref())
            .await?;
        let handles: Vec<CollectionHandle> = targets.into_values().flatten().collect();

        self.transition(SyncState::FetchingConcurrently);
        let fetched = self
            .fetch_all(handles, &context.staging.upload, &mut report)
            .await;

        self.transition(SyncState::Encoding);
        let exports = encode_all(fetched, &context.staging.upload, &mut report).await;
        report.exports = exports;

        if self.settings.upload_policy.should_upload(context.is_first_run) {
            self.transition(SyncState::Uploading);
            for path in context.staging.staged_files().await? {
                match remote.upload_file(&path, &folder_id).await {
                    Ok(remote_id) => report.uploads.push(UploadRecord {
                        file: path.display().to_string(),
                        remote_id,
                    }),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        let message = match e {
                            SyncError::Upload(u) => u.reason,
                            other => other.to_string(),
                        };
                        warn!(file = %path.display(), error = %message, "Upload failed");
                        report.record_failure(
                            path.display().to_string(),
                            FailureStage::Upload,
                            message,
                        );
                    }
                }
            }
        } else {
            info!(
                policy = %self.settings.upload_policy,
                first_run = context.is_first_run,
                "Skipping upload"
            );
        }

        Ok(report)
    }

    /// One task per collection, at most `max_concurrent_fetches` in flight
    ///
    /// Only this task writes the result map; workers hand their result back
    /// through the join handle. A failed collection loses any export an
    /// earlier run left in `staging`.
    async fn fetch_all(
        &self,
        handles: Vec<CollectionHandle>,
        staging: &Path,
        report: &mut SyncReport,
    ) -> BTreeMap<String, CollectionResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_fetches.max(1)));
        let progress = Arc::new(ProgressTracker::new(
            handles.len() as u64,
            self.settings.show_progress,
        ));
        let fetcher = CollectionFetcher::new(Arc::clone(&self.store));

        let tasks: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                let fetcher = fetcher.clone();
                let semaphore = Arc::clone(&semaphore);
                let progress = Arc::clone(&progress);
                let name = handle.qualified_name();
                let task = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let result = fetcher.fetch(&handle).await;
                    progress.advance(&handle.qualified_name());
                    result
                });
                (name, task)
            })
            .collect();

        let mut results = BTreeMap::new();
        for (name, task) in tasks {
            match task.await {
                Ok(Ok(result)) => {
                    results.insert(name, result);
                }
                Ok(Err(e)) => {
                    warn!(collection = %e.collection, error = %e.reason, "Fetch failed, collection dropped");
                    discard_stale_export(staging, &e.collection).await;
                    report.record_failure(e.collection, FailureStage::Fetch, e.reason);
                }
                Err(e) => {
                    error!(collection = %name, error = %e, "Fetch task aborted");
                    discard_stale_export(staging, &name).await;
                    report.record_failure(name, FailureStage::Fetch, e.to_string());
                }
            }
        }

        let elapsed = progress.finish();
        info!(
            fetched = results.len(),
            failed = report.failures.len(),
            elapsed_secs = elapsed,
            "Fetch stage complete"
        );
        results
    }
}

/// Remove the export an earlier run staged for a collection that failed now
async fn discard_stale_export(directory: &Path, qualified_name: &str) {
    let path = directory.join(encoder::export_file_name(qualified_name));
    match tokio::fs::remove_file(&path).await {
        Ok(()) => info!(file = %path.display(), "Removed stale export"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Could not remove stale export"),
    }
}

/// Write every fetched collection to `directory` on the blocking pool
async fn encode_all(
    fetched: BTreeMap<String, CollectionResult>,
    directory: &Path,
    report: &mut SyncReport,
) -> Vec<ExportFile> {
    let tasks: Vec<_> = fetched
        .into_iter()
        .map(|(name, result)| {
            let directory = directory.to_path_buf();
            let task =
                tokio::task::spawn_blocking(move || encoder::write_export(&result, &directory));
            (name, task)
        })
        .collect();

    let mut exports = Vec::new();
    for (name, task) in tasks {
        match task.await {
            Ok(Ok(export)) => exports.push(export),
            Ok(Err(e)) => {
                warn!(collection = %e.collection, error = %e.reason, "Encoding failed, export skipped");
                discard_stale_export(directory, &e.collection).await;
                report.record_failure(e.collection, FailureStage::Encode, e.reason);
            }
            Err(e) => {
                error!(collection = %name, error = %e, "Encoding task aborted");
                discard_stale_export(directory, &name).await;
                report.record_failure(name, FailureStage::Encode, e.to_string());
            }
        }
    }
    info!(files = exports.len(), "Encoding stage complete");
    exports
}
