//! MongoDB implementation of [`DocumentStore`]

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::{debug, info};

use super::DocumentStore;
use crate::error::{ConnectionError, Result};

/// Application name reported to the server
const APP_NAME: &str = "mongo-sheets-sync";

/// Document store backed by the official MongoDB driver
pub struct MongoStore {
    client: Client,
    address: String,
}

impl MongoStore {
    /// Build a client for `host:port`
    ///
    /// The driver connects lazily; reachability is checked by [`DocumentStore::ping`].
    ///
    /// # Arguments
    /// * `host` - Server host
    /// * `port` - Server port
    /// * `timeout` - Server selection timeout
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = format!("{host}:{port}");
        let mut options = ClientOptions::parse(format!("mongodb://{address}"))
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(format!("{address}: {e}")))?;
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        options.app_name = Some(APP_NAME.to_string());

        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::ConnectionFailed(format!("{address}: {e}")))?;
        info!(address = %address, "MongoDB client created");
        Ok(Self { client, address })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectionError::PingFailed(format!("{}: {e}", self.address)))?;
        debug!(address = %self.address, "Ping succeeded");
        Ok(())
    }

    async fn list_database_names(&self) -> Result<Vec<String>> {
        let names = self
            .client
            .list_database_names()
            .await
            .map_err(|e| ConnectionError::CommandFailed(e.to_string()))?;
        Ok(names)
    }

    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>> {
        let names = self
            .client
            .database(database)
            .list_collection_names()
            .await
            .map_err(|e| ConnectionError::CommandFailed(format!("{database}: {e}")))?;
        Ok(names)
    }

    async fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let coll = self
            .client
            .database(database)
            .collection::<Document>(collection);

        let mut cursor = coll.find(doc! {}).await?;
        let mut documents = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            documents.push(document);
        }
        Ok(documents)
    }
}
