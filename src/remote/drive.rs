//! Drive v3 REST transport
//!
//! Uploads use a resumable session: the metadata request opens the session
//! and returns its URL in `Location`, the content is then sent in one `PUT`.
//! Retrying an interrupted session is left to the caller.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::{
    CSV_MIME_TYPE, DriveApi, FOLDER_MIME_TYPE, FileListPage, RemoteEntry, SPREADSHEET_MIME_TYPE,
};
use crate::auth::Credentials;
use crate::error::{AuthError, Result, SyncError};

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";
const ENTRY_FIELDS: &str = "id, name, mimeType";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

/// [`DriveApi`] over HTTPS
#[derive(Debug, Clone)]
pub struct HttpDriveApi {
    http: reqwest::Client,
    files_url: String,
    upload_url: String,
}

impl Default for HttpDriveApi {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDriveApi {
    pub fn new() -> Self {
        Self::with_endpoints(FILES_URL, UPLOAD_URL)
    }

    /// Point the transport at other endpoints, e.g. a local emulator
    pub fn with_endpoints(files_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            files_url: files_url.into(),
            upload_url: upload_url.into(),
        }
    }
}

/// Map a non-success status to an error; 401 and 403 are credential failures
fn status_error(status: StatusCode, body: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AuthError::Rejected(format!("{status}: {body}")).into()
        }
        _ => SyncError::Generic(format!("Drive API returned {status}: {body}")),
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body.trim()))
}

#[async_trait]
impl DriveApi for HttpDriveApi {
    async fn list_files(
        &self,
        credentials: &Credentials,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<FileListPage> {
        let mut query = vec![
            ("pageSize", page_size.to_string()),
            ("fields", LIST_FIELDS.to_string()),
            ("q", "trashed = false".to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self
            .http
            .get(&self.files_url)
            .bearer_auth(credentials.access_token())
            .query(&query)
            .send()
            .await?;
        let page: FileListPage = check_status(response).await?.json().await?;
        debug!(files = page.files.len(), more = page.next_page_token.is_some(), "Listed files");
        Ok(page)
    }

    async fn create_folder(&self, credentials: &Credentials, name: &str) -> Result<RemoteEntry> {
        let metadata = FileMetadata {
            name,
            mime_type: FOLDER_MIME_TYPE,
            parents: Vec::new(),
        };
        let response = self
            .http
            .post(&self.files_url)
            .bearer_auth(credentials.access_token())
            .query(&[("fields", ENTRY_FIELDS)])
            .json(&metadata)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn upload_spreadsheet(
        &self,
        credentials: &Credentials,
        name: &str,
        parent_id: &str,
        content: Vec<u8>,
    ) -> Result<RemoteEntry> {
        let metadata = FileMetadata {
            name,
            mime_type: SPREADSHEET_MIME_TYPE,
            parents: vec![parent_id],
        };
        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(credentials.access_token())
            .query(&[("uploadType", "resumable"), ("fields", ENTRY_FIELDS)])
            .header("X-Upload-Content-Type", CSV_MIME_TYPE)
            .header("X-Upload-Content-Length", content.len().to_string())
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response).await?;

        let session_url = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                SyncError::Generic("resumable upload session returned no Location".into())
            })?;
        debug!(name, bytes = content.len(), "Upload session opened");

        // whole body in one PUT; an interrupted transfer is not resumed
        let response = self
            .http
            .put(&session_url)
            .bearer_auth(credentials.access_token())
            .header(reqwest::header::CONTENT_TYPE, CSV_MIME_TYPE)
            .body(content)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_statuses_are_auth_errors() {
        let err = status_error(StatusCode::UNAUTHORIZED, "invalid_token");
        assert!(matches!(err, SyncError::Auth(AuthError::Rejected(_))));
        assert!(err.is_fatal());

        let err = status_error(StatusCode::FORBIDDEN, "insufficientPermissions");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_statuses_are_not_fatal() {
        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "backendError");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("backendError"));
    }

    #[test]
    fn test_metadata_serialization() {
        let folder = FileMetadata {
            name: "pConnect",
            mime_type: FOLDER_MIME_TYPE,
            parents: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&folder).unwrap(),
            serde_json::json!({
                "name": "pConnect",
                "mimeType": "application/vnd.google-apps.folder"
            })
        );

        let sheet = FileMetadata {
            name: "shop.users",
            mime_type: SPREADSHEET_MIME_TYPE,
            parents: vec!["f1"],
        };
        let value = serde_json::to_value(&sheet).unwrap();
        assert_eq!(value["parents"], serde_json::json!(["f1"]));
    }
}
