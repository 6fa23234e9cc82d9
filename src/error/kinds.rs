use std::{fmt, io};

/// Crate-wide `Result` type using [`SyncError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Top-level error type for a synchronisation run.
///
/// This type wraps the more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum SyncError {
    /// Credential errors. Always fatal.
    Auth(AuthError),

    /// Database connection errors. Always fatal.
    Connection(ConnectionError),

    /// Configuration errors. Always fatal.
    Config(ConfigError),

    /// A single collection could not be read.
    Fetch(FetchError),

    /// A single collection could not be encoded.
    Encoding(EncodingError),

    /// A single file could not be uploaded.
    Upload(UploadError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// HTTP transport errors.
    Http(reqwest::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Credential-specific errors.
#[derive(Debug)]
pub enum AuthError {
    /// No stored credentials exist for the application.
    MissingCredentials(String),

    /// The client secret file could not be read or parsed.
    InvalidClientSecret(String),

    /// Refreshing an expired access token failed.
    RefreshFailed(String),

    /// The remote service rejected the credentials.
    Rejected(String),

    /// The stored token does not grant the requested scopes.
    ScopeMismatch { missing: Vec<String> },
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Ping command failed.
    PingFailed(String),

    /// Listing databases or collections failed.
    CommandFailed(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// A collection read that failed part way through.
///
/// The partially read documents are discarded; only the name and cause survive.
#[derive(Debug)]
pub struct FetchError {
    pub collection: String,
    pub reason: String,
}

/// A value or column that cannot be written as a spreadsheet cell.
#[derive(Debug)]
pub struct EncodingError {
    pub collection: String,
    pub reason: String,
}

/// An upload of a single staged file that did not complete.
#[derive(Debug)]
pub struct UploadError {
    pub file: String,
    pub reason: String,
}

impl SyncError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_) | SyncError::Connection(_) | SyncError::Config(_)
        )
    }
}

impl FetchError {
    pub fn new(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

impl EncodingError {
    pub fn new(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

impl UploadError {
    pub fn new(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Auth(e) => write!(f, "Authentication error: {e}"),
            SyncError::Connection(e) => write!(f, "Connection error: {e}"),
            SyncError::Config(e) => write!(f, "Configuration error: {e}"),
            SyncError::Fetch(e) => write!(f, "Fetch error: {e}"),
            SyncError::Encoding(e) => write!(f, "Encoding error: {e}"),
            SyncError::Upload(e) => write!(f, "Upload error: {e}"),
            SyncError::Io(e) => write!(f, "I/O error: {e}"),
            SyncError::MongoDb(e) => write!(f, "MongoDB error: {e}"),
            SyncError::Http(e) => write!(f, "HTTP error: {e}"),
            SyncError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredentials(path) => {
                write!(f, "No stored credentials at {path}")
            }
            AuthError::InvalidClientSecret(msg) => write!(f, "Invalid client secret: {msg}"),
            AuthError::RefreshFailed(msg) => write!(f, "Token refresh failed: {msg}"),
            AuthError::Rejected(msg) => write!(f, "Credentials rejected: {msg}"),
            AuthError::ScopeMismatch { missing } => {
                write!(f, "Stored token lacks scopes: {}", missing.join(", "))
            }
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
            ConnectionError::CommandFailed(msg) => write!(f, "Command failed: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.collection, self.reason)
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.collection, self.reason)
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.reason)
    }
}

impl std::error::Error for SyncError {}
impl std::error::Error for AuthError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for FetchError {}
impl std::error::Error for EncodingError {}
impl std::error::Error for UploadError {}

/* ========================= Conversions to SyncError ========================= */

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Io(err)
    }
}

impl From<mongodb::error::Error> for SyncError {
    fn from(err: mongodb::error::Error) -> Self {
        SyncError::MongoDb(err)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Http(err)
    }
}

impl From<AuthError> for SyncError {
    fn from(err: AuthError) -> Self {
        SyncError::Auth(err)
    }
}

impl From<ConnectionError> for SyncError {
    fn from(err: ConnectionError) -> Self {
        SyncError::Connection(err)
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        SyncError::Config(err)
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        SyncError::Fetch(err)
    }
}

impl From<EncodingError> for SyncError {
    fn from(err: EncodingError) -> Self {
        SyncError::Encoding(err)
    }
}

impl From<UploadError> for SyncError {
    fn from(err: UploadError) -> Self {
        SyncError::Upload(err)
    }
}

impl From<String> for SyncError {
    fn from(msg: String) -> Self {
        SyncError::Generic(msg)
    }
}

impl From<&str> for SyncError {
    fn from(msg: &str) -> Self {
        SyncError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::from(AuthError::Rejected("401".into())).is_fatal());
        assert!(SyncError::from(ConnectionError::PingFailed("timeout".into())).is_fatal());
        assert!(SyncError::from(ConfigError::MissingField("app".into())).is_fatal());
        assert!(!SyncError::from(FetchError::new("db.c", "boom")).is_fatal());
        assert!(!SyncError::from(EncodingError::new("db.c", "boom")).is_fatal());
        assert!(!SyncError::from(UploadError::new("db.c.csv", "boom")).is_fatal());
    }

    #[test]
    fn test_display_carries_target_name() {
        let err = SyncError::from(FetchError::new("shop.orders", "cursor killed"));
        assert_eq!(err.to_string(), "Fetch error: shop.orders: cursor killed");

        let err = SyncError::from(UploadError::new("shop.orders.csv", "HTTP 500"));
        assert_eq!(err.to_string(), "Upload error: shop.orders.csv: HTTP 500");
    }

    #[test]
    fn test_scope_mismatch_display() {
        let err = AuthError::ScopeMismatch {
            missing: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Stored token lacks scopes: a, b");
    }
}
