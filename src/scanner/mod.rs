//! Database enumeration and collection reads
//!
//! This module provides:
//! - [`DocumentStore`]: the seam to the document database
//! - [`DatabaseScanner`]: decides which collections a run exports
//! - [`CollectionFetcher`]: reads one collection fully into memory
//!
//! A fetch either returns every document of the collection in the order the
//! server produced them, or fails with a [`FetchError`]; partially read
//! documents never leave the fetcher.

pub mod mongo;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::{debug, info};

use crate::error::{ConnectionError, FetchError, Result, SyncError};

pub use mongo::MongoStore;

/// Prefix of collections the server manages itself
const SYSTEM_COLLECTION_PREFIX: &str = "system.";

/// Operations the pipeline needs from a document database
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Check that the server is reachable
    async fn ping(&self) -> Result<()>;

    /// Names of all databases on the server
    async fn list_database_names(&self) -> Result<Vec<String>>;

    /// Names of all collections in a database
    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>>;

    /// Every document of a collection, in server iteration order
    async fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>>;
}

/// A collection selected for export
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionHandle {
    pub database: String,
    pub collection: String,
}

impl CollectionHandle {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// `<database>.<collection>`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// All documents of one collection, read in a single pass
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionResult {
    pub qualified_name: String,
    pub documents: Vec<Document>,
}

/// Which databases and collections a scan considers
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Never scanned, whether enumerated or named explicitly
    pub ignored_databases: BTreeSet<String>,
    pub include_system_collections: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ignored_databases: ["local", "config", "test", "admin"]
                .into_iter()
                .map(String::from)
                .collect(),
            include_system_collections: false,
        }
    }
}

/// Enumerates the collections a run exports
pub struct DatabaseScanner<S> {
    store: Arc<S>,
    options: ScanOptions,
}

impl<S: DocumentStore> DatabaseScanner<S> {
    pub fn new(store: Arc<S>, options: ScanOptions) -> Self {
        Self { store, options }
    }

    /// Map of database name to the collections selected in it
    ///
    /// Candidates are `explicit_databases` when given, otherwise every
    /// database on the server. Ignored databases are dropped either way. Any
    /// failure to reach the server or list its contents is a [`ConnectionError`].
    pub async fn list_target_collections(
        &self,
        explicit_databases: Option<&[String]>,
    ) -> Result<BTreeMap<String, Vec<CollectionHandle>>> {
        self.store.ping().await.map_err(as_connection_error)?;

        let candidates = match explicit_databases {
            Some(names) => names.to_vec(),
            None => {
                debug!("Enumerating all databases");
                self.store
                    .list_database_names()
                    .await
                    .map_err(as_connection_error)?
            }
        };
        let databases: BTreeSet<String> = candidates
            .into_iter()
            .filter(|name| {
                let ignored = self.options.ignored_databases.contains(name);
                if ignored {
                    debug!(database = %name, "Skipping ignored database");
                }
                !ignored
            })
            .collect();

        let mut targets = BTreeMap::new();
        for database in databases {
            let mut names = self
                .store
                .list_collection_names(&database)
                .await
                .map_err(as_connection_error)?;
            names.retain(|name| {
                self.options.include_system_collections
                    || !name.starts_with(SYSTEM_COLLECTION_PREFIX)
            });
            names.sort();

            debug!(database = %database, collections = names.len(), "Scanned database");
            let handles = names
                .into_iter()
                .map(|name| CollectionHandle::new(database.clone(), name))
                .collect();
            targets.insert(database, handles);
        }

        info!(
            databases = targets.len(),
            collections = targets.values().map(Vec::len).sum::<usize>(),
            "Scan complete"
        );
        Ok(targets)
    }
}

fn as_connection_error(err: SyncError) -> SyncError {
    match err {
        SyncError::Connection(_) => err,
        other => ConnectionError::CommandFailed(other.to_string()).into(),
    }
}

/// Reads one collection into memory
pub struct CollectionFetcher<S> {
    store: Arc<S>,
}

impl<S> Clone for CollectionFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore> CollectionFetcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Read every document of `handle`; all or nothing
    pub async fn fetch(
        &self,
        handle: &CollectionHandle,
    ) -> std::result::Result<CollectionResult, FetchError> {
        let qualified_name = handle.qualified_name();
        debug!(collection = %qualified_name, "Fetching collection");

        let documents = self
            .store
            .fetch_all(&handle.database, &handle.collection)
            .await
            .map_err(|e| FetchError::new(&qualified_name, e.to_string()))?;

        info!(collection = %qualified_name, documents = documents.len(), "Fetched collection");
        Ok(CollectionResult {
            qualified_name,
            documents,
        })
    }
}
