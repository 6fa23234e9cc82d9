//! In-memory doubles for the database, drive and auth seams

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::auth::{Authenticator, Credentials};
use crate::error::{AuthError, ConnectionError, Result, SyncError};
use crate::remote::{DriveApi, FOLDER_MIME_TYPE, FileListPage, RemoteEntry, SPREADSHEET_MIME_TYPE};
use crate::scanner::DocumentStore;

enum Seeded {
    Documents(Vec<Document>),
    Failing(String),
}

/// Document store holding seeded collections
pub struct MemoryStore {
    databases: BTreeMap<String, BTreeMap<String, Seeded>>,
    reachable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            databases: BTreeMap::new(),
            reachable: true,
        }
    }

    pub fn with_collection(mut self, database: &str, collection: &str, docs: Vec<Document>) -> Self {
        self.databases
            .entry(database.to_string())
            .or_default()
            .insert(collection.to_string(), Seeded::Documents(docs));
        self
    }

    /// A collection whose reads fail with `reason`
    pub fn with_failing_collection(mut self, database: &str, collection: &str, reason: &str) -> Self {
        self.databases
            .entry(database.to_string())
            .or_default()
            .insert(collection.to_string(), Seeded::Failing(reason.to_string()));
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(ConnectionError::PingFailed("memory store is unreachable".into()).into())
        }
    }

    async fn list_database_names(&self) -> Result<Vec<String>> {
        Ok(self.databases.keys().cloned().collect())
    }

    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>> {
        Ok(self
            .databases
            .get(database)
            .map(|colls| colls.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        // let sibling fetches interleave
        tokio::task::yield_now().await;
        match self.databases.get(database).and_then(|c| c.get(collection)) {
            Some(Seeded::Documents(docs)) => Ok(docs.clone()),
            Some(Seeded::Failing(reason)) => Err(SyncError::Generic(reason.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// An upload the drive accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub name: String,
    pub parent_id: String,
    pub content: Vec<u8>,
}

#[derive(Default)]
struct DriveState {
    entries: Vec<RemoteEntry>,
    uploads: Vec<RecordedUpload>,
    list_calls: usize,
    next_id: usize,
    failing_uploads: BTreeSet<String>,
    reject_credentials: bool,
}

/// Drive that keeps everything in memory; clones share state
#[derive(Clone, Default)]
pub struct RecordingDrive {
    state: Arc<Mutex<DriveState>>,
}

impl RecordingDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing folder
    pub fn with_folder(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("folder-{}", state.next_id);
            state.entries.push(RemoteEntry {
                id,
                name: name.to_string(),
                mime_type: FOLDER_MIME_TYPE.to_string(),
            });
        }
        self
    }

    /// Uploads named `name` fail with a server error
    pub fn failing_upload(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .insert(name.to_string());
        self
    }

    /// Every upload is rejected as unauthorized
    pub fn rejecting_credentials(self) -> Self {
        self.state.lock().unwrap().reject_credentials = true;
        self
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn folders_named(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.name == name && e.is_folder())
            .count()
    }
}

#[async_trait]
impl DriveApi for RecordingDrive {
    async fn list_files(
        &self,
        _credentials: &Credentials,
        page_size: u32,
        _page_token: Option<String>,
    ) -> Result<FileListPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(FileListPage {
            files: state
                .entries
                .iter()
                .take(page_size as usize)
                .cloned()
                .collect(),
            next_page_token: None,
        })
    }

    async fn create_folder(&self, _credentials: &Credentials, name: &str) -> Result<RemoteEntry> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let entry = RemoteEntry {
            id: format!("folder-{}", state.next_id),
            name: name.to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
        };
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn upload_spreadsheet(
        &self,
        _credentials: &Credentials,
        name: &str,
        parent_id: &str,
        content: Vec<u8>,
    ) -> Result<RemoteEntry> {
        let mut state = self.state.lock().unwrap();
        if state.reject_credentials {
            return Err(AuthError::Rejected("401 Unauthorized".into()).into());
        }
        if state.failing_uploads.contains(name) {
            return Err(SyncError::Generic("Drive API returned 500".into()));
        }
        state.next_id += 1;
        let entry = RemoteEntry {
            id: format!("file-{}", state.next_id),
            name: name.to_string(),
            mime_type: SPREADSHEET_MIME_TYPE.to_string(),
        };
        state.entries.push(entry.clone());
        state.uploads.push(RecordedUpload {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            content,
        });
        Ok(entry)
    }
}

/// Authenticator that always grants a fixed token
pub struct StaticAuthenticator;

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn obtain_credentials(
        &self,
        scopes: &[String],
        _client_secret_file: &Path,
        _application_name: &str,
    ) -> Result<Credentials> {
        Ok(Credentials::new("test-token", None, scopes.to_vec()))
    }
}
