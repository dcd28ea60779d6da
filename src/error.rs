use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors surfaced by entity, storage, query, and walker operations.
///
/// Variants map one-to-one onto the caller-visible failure kinds: callers
/// are expected to match on the variant (or its [`GraphError::code`]) rather
/// than parse display strings.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Assignment to a protected attribute after construction.
    #[error("attribute '{attr}' of {cls} is protected and cannot be reassigned")]
    AttributeProtection { attr: String, cls: String },
    /// An entity required by the operation does not exist.
    #[error("{kind} '{id}' not found")]
    EntityNotFound { kind: &'static str, id: String },
    /// Malformed input that is not a query document: bad config values,
    /// records without ids, invalid state transitions.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Malformed filter or update document.
    #[error("query error: {0}")]
    Query(String),
    /// A hook declared a target of the wrong kind.
    #[error("invalid hook target: {0}")]
    HookTarget(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend-specific failure (connection, statement, corruption).
    #[error("database error: {0}")]
    Database(String),
    /// Stored data that cannot be interpreted as a record.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// A walker tripped a configured limit and was disengaged.
    #[error("walker protection tripped: {limit} ({detail})")]
    WalkerProtection { limit: &'static str, detail: String },
    /// A walker exceeded its wall-clock budget.
    #[error("walker exceeded max execution time of {0:?}")]
    WalkerTimeout(Duration),
}

impl GraphError {
    /// Machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::AttributeProtection { .. } => "AttributeProtectionError",
            GraphError::EntityNotFound { .. } => "EntityNotFound",
            GraphError::Validation(_) => "ValidationError",
            GraphError::Query(_) => "QueryError",
            GraphError::HookTarget(_) => "HookTargetError",
            GraphError::Io(_) => "DatabaseError",
            GraphError::Serialization(_) => "DatabaseError",
            GraphError::Database(_) => "DatabaseError",
            GraphError::Corruption(_) => "DatabaseError",
            GraphError::WalkerProtection { .. } => "WalkerProtectionError",
            GraphError::WalkerTimeout(_) => "WalkerTimeoutError",
        }
    }

    pub(crate) fn query(msg: impl Into<String>) -> Self {
        GraphError::Query(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        GraphError::Validation(msg.into())
    }
}

impl From<rusqlite::Error> for GraphError {
    fn from(err: rusqlite::Error) -> Self {
        GraphError::Database(err.to_string())
    }
}

pub(crate) fn acquire_lock<T>(mutex: &std::sync::Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| {
        tracing::error!("backend lock poisoned - fatal error");
        GraphError::Corruption("backend lock poisoned".into())
    })
}
