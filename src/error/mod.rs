//! Error handling for the synchronisation pipeline.
//!
//! Errors fall into two groups:
//! - fatal errors ([`AuthError`], [`ConnectionError`], [`ConfigError`]) halt
//!   the run and the process exits non-zero
//! - isolable errors ([`FetchError`], [`EncodingError`], [`UploadError`]) are
//!   caught at the task boundary, logged with the collection or file they
//!   concern, and excluded from later stages
//!
//! # Example
//!
//! ```rust
//! use mongo_sheets_sync::error::{FetchError, SyncError};
//!
//! let err: SyncError = FetchError::new("shop.orders", "cursor killed").into();
//! assert!(!err.is_fatal());
//! ```

pub mod kinds;

pub use kinds::{
    AuthError, ConfigError, ConnectionError, EncodingError, FetchError, Result, SyncError,
    UploadError,
};
