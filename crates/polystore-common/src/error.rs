//! Error types for polystore

use thiserror::Error;

/// Result type alias for polystore operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Unified error type for all polystore operations
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Operation invoked on a handle that is not open
    #[error("{kind} adapter is not open")]
    NotOpen { kind: &'static str },

    /// Concurrent `open` while another open is in flight
    #[error("{kind} adapter is already opening")]
    AlreadyOpening { kind: &'static str },

    /// Concurrent `close` while another close is in flight
    #[error("{kind} adapter is already closing")]
    AlreadyClosing { kind: &'static str },

    /// Backend refused to open
    #[error("{kind} adapter failed to open: {cause}")]
    OpenFailed { kind: &'static str, cause: String },

    /// Parameter binding failed for a placeholder
    #[error("no value bound for placeholder {marker}")]
    Bind { marker: String },

    /// Optional operation requested on a backend without the capability
    #[error("{kind} adapter does not support {capability}")]
    CapabilityMissing {
        kind: &'static str,
        capability: &'static str,
    },

    /// Engine-level failure surfaced verbatim, tagged with adapter kind
    #[error("{kind} backend error: {cause}")]
    Backend { kind: &'static str, cause: String },

    /// Resolver exhausted every candidate backend
    #[error("no storage backend could be opened: [{}]", causes.join("; "))]
    Resolution { causes: Vec<String> },

    /// Merge strategy selected but no merge function resolved the conflict
    #[error("conflict on {table}/{id} could not be merged: {cause}")]
    MergeUnresolvable {
        table: String,
        id: String,
        cause: String,
    },

    /// Storage budget exceeded with the `error` action configured
    #[error("storage budget exceeded: {used} used, limit {limit}")]
    BudgetExceeded { used: String, limit: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transient error that may succeed on retry
    #[error("transient error: {0}")]
    Transient(String),

    /// Unique or exclusion constraint violation
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Shorthand for a backend failure tagged with the adapter kind.
    pub fn backend(kind: &'static str, cause: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            kind,
            cause: cause.to_string(),
        }
    }

    /// Shorthand for an open failure tagged with the adapter kind.
    pub fn open_failed(kind: &'static str, cause: impl std::fmt::Display) -> Self {
        StorageError::OpenFailed {
            kind,
            cause: cause.to_string(),
        }
    }

    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout(_) | StorageError::Transient(_) | StorageError::Connection(_)
        )
    }

    /// Returns true if this is a lifecycle-state error
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            StorageError::NotOpen { .. }
                | StorageError::AlreadyOpening { .. }
                | StorageError::AlreadyClosing { .. }
        )
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// SQLite-specific error conversions (when sqlite-errors feature is enabled)
#[cfg(feature = "sqlite-errors")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    StorageError::Transient(err.to_string())
                }
                ErrorCode::ConstraintViolation => StorageError::Conflict(err.to_string()),
                ErrorCode::CannotOpen => StorageError::Connection(err.to_string()),
                _ => StorageError::Backend {
                    kind: "sqlite",
                    cause: err.to_string(),
                },
            },
            rusqlite::Error::InvalidParameterName(name) => StorageError::Bind {
                marker: name.clone(),
            },
            _ => StorageError::Backend {
                kind: "sqlite",
                cause: err.to_string(),
            },
        }
    }
}

// PostgreSQL-specific error conversions (when postgres-errors feature is enabled)
#[cfg(feature = "postgres-errors")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        match &err {
            Error::Configuration(_) => StorageError::Connection(err.to_string()),
            Error::Database(db_err) => {
                // Classify on PostgreSQL SQLSTATE codes.
                if let Some(code) = db_err.code() {
                    let code_str: &str = &code;
                    match code_str {
                        // Unique constraint violation
                        "23505" => return StorageError::Conflict(err.to_string()),
                        // Exclusion constraint violation
                        "23P01" => return StorageError::Conflict(err.to_string()),
                        // Deadlock or serialization failure (class 40)
                        code if code.starts_with("40") => {
                            return StorageError::Transient(err.to_string())
                        }
                        // Connection errors (class 08)
                        code if code.starts_with("08") => {
                            return StorageError::Connection(err.to_string())
                        }
                        // Operator intervention / admin shutdown
                        "57P01" | "57P02" | "57P03" => {
                            return StorageError::Transient(err.to_string())
                        }
                        _ => {}
                    }
                }
                StorageError::Backend {
                    kind: "postgres",
                    cause: err.to_string(),
                }
            }
            Error::Io(_) | Error::Tls(_) | Error::Protocol(_) => {
                StorageError::Connection(err.to_string())
            }
            Error::PoolTimedOut => StorageError::Timeout("connection pool timed out".to_string()),
            Error::PoolClosed => StorageError::Connection("connection pool closed".to_string()),
            Error::ColumnDecode { .. } | Error::Decode(_) | Error::TypeNotFound { .. } => {
                StorageError::Serialization(err.to_string())
            }
            _ => StorageError::Backend {
                kind: "postgres",
                cause: err.to_string(),
            },
        }
    }
}
