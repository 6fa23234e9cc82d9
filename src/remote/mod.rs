//! Remote folder and file placement
//!
//! [`DriveApi`] is the raw transport; [`RemoteStore`] layers the cached
//! directory listing and the folder/file lookups the orchestrator relies on.
//!
//! `create_folder` is not idempotent on its own. Callers look the folder up
//! with [`RemoteStore::find_folder`] first and only create it when absent.

pub mod drive;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::error::{Result, UploadError};

pub use drive::HttpDriveApi;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";
pub const CSV_MIME_TYPE: &str = "text/csv";

/// A file or folder in the remote drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn is_tabular(&self) -> bool {
        self.mime_type == SPREADSHEET_MIME_TYPE || self.mime_type == CSV_MIME_TYPE
    }
}

/// One page of a directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    #[serde(default)]
    pub files: Vec<RemoteEntry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Transport to the remote drive
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// One page of the non-trashed entries visible to the credentials
    async fn list_files(
        &self,
        credentials: &Credentials,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<FileListPage>;

    async fn create_folder(&self, credentials: &Credentials, name: &str) -> Result<RemoteEntry>;

    /// Upload CSV content, converted to a spreadsheet, into `parent_id`
    async fn upload_spreadsheet(
        &self,
        credentials: &Credentials,
        name: &str,
        parent_id: &str,
        content: Vec<u8>,
    ) -> Result<RemoteEntry>;
}

/// Directory listing kept for the lifetime of one run
#[derive(Debug, Default)]
pub struct RemoteDirectoryCache {
    entries: RwLock<Option<Vec<RemoteEntry>>>,
}

impl RemoteDirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Vec<RemoteEntry>> {
        self.entries.read().await.clone()
    }

    pub async fn set(&self, entries: Vec<RemoteEntry>) {
        *self.entries.write().await = Some(entries);
    }

    /// Record an entry created during the run; no-op before the first listing
    pub async fn record(&self, entry: RemoteEntry) {
        if let Some(entries) = self.entries.write().await.as_mut() {
            entries.push(entry);
        }
    }

    pub async fn invalidate(&self) {
        *self.entries.write().await = None;
    }
}

/// Folder lookup and file upload against the remote drive
pub struct RemoteStore<A> {
    api: A,
    credentials: Credentials,
    page_size: u32,
    list_all_pages: bool,
    cache: RemoteDirectoryCache,
}

impl<A: DriveApi> RemoteStore<A> {
    /// # Arguments
    /// * `api` - Drive transport
    /// * `credentials` - Passed to every call
    /// * `page_size` - Entries requested per listing page
    /// * `list_all_pages` - Follow page tokens instead of reading only the first page
    pub fn new(api: A, credentials: Credentials, page_size: u32, list_all_pages: bool) -> Self {
        Self {
            api,
            credentials,
            page_size,
            list_all_pages,
            cache: RemoteDirectoryCache::new(),
        }
    }

    /// Cached listing, fetched on first use
    ///
    /// Without `list_all_pages` only the first page is read, so lookups are
    /// best effort on drives with more entries than the page size.
    async fn listing(&self) -> Result<Vec<RemoteEntry>> {
        if let Some(entries) = self.cache.get().await {
            return Ok(entries);
        }

        let mut entries = Vec::new();
        let mut page_token = None;
        loop {
            let page = self
                .api
                .list_files(&self.credentials, self.page_size, page_token)
                .await?;
            entries.extend(page.files);
            match page.next_page_token {
                Some(token) if self.list_all_pages => page_token = Some(token),
                _ => break,
            }
        }

        debug!(entries = entries.len(), "Remote directory listed");
        self.cache.set(entries.clone()).await;
        Ok(entries)
    }

    /// Id of the folder named `name`, if the listing has one
    pub async fn find_folder(&self, name: &str) -> Result<Option<String>> {
        let entries = self.listing().await?;
        Ok(entries
            .into_iter()
            .find(|e| e.name == name && e.is_folder())
            .map(|e| e.id))
    }

    /// Id of the spreadsheet or CSV file named `name`, if the listing has one
    pub async fn find_file(&self, name: &str) -> Result<Option<String>> {
        let entries = self.listing().await?;
        Ok(entries
            .into_iter()
            .find(|e| e.name == name && e.is_tabular())
            .map(|e| e.id))
    }

    /// Create a folder unconditionally
    pub async fn create_folder(&self, name: &str) -> Result<String> {
        let entry = self.api.create_folder(&self.credentials, name).await?;
        info!(folder = %entry.name, id = %entry.id, "Created remote folder");
        let id = entry.id.clone();
        self.cache.record(entry).await;
        Ok(id)
    }

    /// Upload `local_path` as a spreadsheet named after its base name
    ///
    /// Credential failures are returned unchanged and stay fatal; anything
    /// else is an [`UploadError`] for this file only.
    ///
    /// The whole file is read into memory and sent in one request, so an
    /// export must fit in memory and the transfer is not resumed on failure.
    pub async fn upload_file(&self, local_path: &Path, parent_id: &str) -> Result<String> {
        let file_name = local_path.display().to_string();
        let name = local_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::new(&file_name, "path has no file name"))?;

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| UploadError::new(&file_name, e.to_string()))?;
        let size = content.len();

        let entry = self
            .api
            .upload_spreadsheet(&self.credentials, &name, parent_id, content)
            .await
            .map_err(|e| {
                if e.is_fatal() {
                    e
                } else {
                    UploadError::new(&file_name, e.to_string()).into()
                }
            })?;

        info!(file = %file_name, name = %entry.name, id = %entry.id, bytes = size, "Uploaded file");
        let id = entry.id.clone();
        self.cache.record(entry).await;
        Ok(id)
    }

    /// Drop the cached listing so the next lookup lists again
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }
}
