//! Error types for the event store.

use eventbuf_db::{MigrationError, PoolError};

/// Errors that can occur while opening or operating an [`EventStore`].
///
/// The store never retries on its own. Every failure is reported to the
/// caller, which decides whether to retry, drop or buffer elsewhere.
///
/// [`EventStore`]: crate::EventStore
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The connection pool could not be created.
    #[error("failed to open event store: {0}")]
    Open(#[from] PoolError),

    /// Schema migrations failed while opening the store.
    #[error("failed to migrate event store schema: {0}")]
    Migration(#[from] MigrationError),

    /// No pooled connection became available in time.
    #[error("event store connection unavailable: {0}")]
    Connection(#[from] r2d2::Error),

    /// A write transaction could not commit (I/O error, corruption,
    /// lock timeout). Nothing from the failed transaction is visible.
    #[error("event store write failed: {0}")]
    WriteFailed(#[source] rusqlite::Error),

    /// A read-only inspection query failed.
    #[error("event store read failed: {0}")]
    ReadFailed(#[source] rusqlite::Error),

    /// The caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be encoded as a JSON payload.
    #[error("event payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns `true` if the backend was busy or locked by another writer,
    /// meaning the same call may succeed if repeated later.
    pub fn is_busy(&self) -> bool {
        let source = match self {
            Self::WriteFailed(e) | Self::ReadFailed(e) => e,
            _ => return false,
        };
        matches!(
            source.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}
