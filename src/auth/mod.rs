//! Credential acquisition for the remote drive
//!
//! The [`Authenticator`] trait is the seam between the synchronisation
//! pipeline and whatever OAuth machinery produces an access token. The
//! provided [`StoredCredentialAuthenticator`] reuses a token persisted under
//! `<credentials_dir>/<application_name>` and refreshes it with the client
//! secret when it has expired. The interactive consent flow that creates the
//! first token is not part of this crate.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AuthError, Result};

/// Tokens this close to expiry are refreshed up front
const EXPIRY_SKEW_SECS: i64 = 60;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Access token handle passed to every remote call
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
    scopes: Vec<String>,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            scopes,
        }
    }

    /// Bearer token for the `Authorization` header
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Source of credentials for the remote drive
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain credentials for `application_name` granting `scopes`
    ///
    /// Any error returned here is fatal for the run.
    async fn obtain_credentials(
        &self,
        scopes: &[String],
        client_secret_file: &Path,
        application_name: &str,
    ) -> Result<Credentials>;
}

/// Token persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }

    fn missing_scopes(&self, requested: &[String]) -> Vec<String> {
        if self.scopes.is_empty() {
            return Vec::new();
        }
        requested
            .iter()
            .filter(|s| !self.scopes.contains(s))
            .cloned()
            .collect()
    }

    fn into_credentials(self) -> Credentials {
        Credentials::new(self.access_token, self.expires_at, self.scopes)
    }
}

/// OAuth client secret as downloaded from the provider console
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Authenticator backed by a token file per application
pub struct StoredCredentialAuthenticator {
    credentials_dir: PathBuf,
    http: reqwest::Client,
}

impl StoredCredentialAuthenticator {
    pub fn new(credentials_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials_dir: credentials_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Path of the token file for an application
    pub fn token_path(&self, application_name: &str) -> PathBuf {
        self.credentials_dir.join(application_name)
    }

    async fn load_token(&self, path: &Path) -> Result<StoredToken> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::MissingCredentials(path.display().to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|e| {
            AuthError::MissingCredentials(format!("{} (unreadable: {e})", path.display())).into()
        })
    }

    async fn store_token(&self, path: &Path, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| AuthError::RefreshFailed(format!("cannot serialize token: {e}")))?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "Storing credentials");
        Ok(())
    }

    async fn read_client_secret(&self, path: &Path) -> Result<ClientSecret> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuthError::InvalidClientSecret(format!("{}: {e}", path.display())))?;
        let file: ClientSecretFile = serde_json::from_str(&raw)
            .map_err(|e| AuthError::InvalidClientSecret(format!("{}: {e}", path.display())))?;
        file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidClientSecret(format!(
                "{}: expected an 'installed' or 'web' section",
                path.display()
            ))
            .into()
        })
    }

    async fn refresh(&self, token: StoredToken, client_secret_file: &Path) -> Result<StoredToken> {
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            AuthError::RefreshFailed("token expired and no refresh token is stored".into())
        })?;
        let secret = self.read_client_secret(client_secret_file).await?;

        debug!(token_uri = %secret.token_uri, "Refreshing access token");
        let response = self
            .http
            .post(&secret.token_uri)
            .form(&[
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!("{status}: {body}")).into());
        }
        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let scopes = refreshed
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or(token.scopes);
        Ok(StoredToken {
            access_token: refreshed.access_token,
            refresh_token: Some(refresh_token),
            expires_at: refreshed
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            scopes,
        })
    }
}

#[async_trait]
impl Authenticator for StoredCredentialAuthenticator {
    async fn obtain_credentials(
        &self,
        scopes: &[String],
        client_secret_file: &Path,
        application_name: &str,
    ) -> Result<Credentials> {
        tokio::fs::create_dir_all(&self.credentials_dir).await?;
        let path = self.token_path(application_name);
        let token = self.load_token(&path).await?;

        let missing = token.missing_scopes(scopes);
        if !missing.is_empty() {
            return Err(AuthError::ScopeMismatch { missing }.into());
        }

        if token.is_fresh(Utc::now()) {
            debug!(path = %path.display(), "Reusing stored credentials");
            return Ok(token.into_credentials());
        }

        let refreshed = self.refresh(token, client_secret_file).await?;
        self.store_token(&path, &refreshed).await?;
        Ok(refreshed.into_credentials())
    }
}
