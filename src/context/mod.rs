//! Per-run identity and local staging layout
//!
//! A [`RunContext`] is built once by the orchestrator at startup and handed to
//! whatever needs identity or audit metadata. Nothing in the crate reads the
//! logged-in user or host from the environment after that point.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::auth::Credentials;
use crate::error::Result;

/// Local directories used by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    /// Export files waiting for upload
    pub upload: PathBuf,
    pub download: PathBuf,
    pub base: PathBuf,
}

impl StagingArea {
    pub fn new(base_directory: &Path) -> Self {
        Self {
            upload: base_directory.join("upload"),
            download: base_directory.join("download"),
            base: base_directory.join("base"),
        }
    }

    /// Create the staging directories if they do not exist yet
    pub async fn ensure(&self) -> Result<()> {
        for dir in [&self.upload, &self.download, &self.base] {
            tokio::fs::create_dir_all(dir).await?;
            debug!(path = %dir.display(), "Staging directory ready");
        }
        Ok(())
    }

    /// Regular files currently in the upload directory, sorted by name
    pub async fn staged_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.upload).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Identity and state of a single synchronisation run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub application_name: String,
    pub base_directory: PathBuf,
    pub staging: StagingArea,
    pub is_first_run: bool,
    pub credentials: Credentials,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Operating system user that started the run
    pub operator: Option<String>,
    pub host: Option<String>,
}

impl RunContext {
    /// Capture identity for a new run
    pub fn new(
        application_name: impl Into<String>,
        base_directory: &Path,
        credentials: Credentials,
    ) -> Self {
        let base_directory =
            std::path::absolute(base_directory).unwrap_or_else(|_| base_directory.to_path_buf());
        let operator = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok();
        let host = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned());

        Self {
            application_name: application_name.into(),
            staging: StagingArea::new(&base_directory),
            base_directory,
            is_first_run: false,
            credentials,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            operator,
            host,
        }
    }

    /// Short form of the run id used in log lines
    pub fn short_run_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }
}
