//! Error types
//!
//! Three layers of errors live here:
//!
//! - [`DatabaseError`]: what a [`DocumentStore`](crate::store::DocumentStore)
//!   backend reports, with the store-level operation and kind
//! - [`RepositoryError`](crate::repository::RepositoryError): what the unit of
//!   work, repositories and services report (converted from `DatabaseError`)
//! - [`Error`]: the crate-level error for configuration loading and bootstrap

use std::fmt;
use thiserror::Error;

use crate::repository::RepositoryError;

// ============================================================================
// Structured Database Errors
// ============================================================================

/// Store operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseOperation {
    /// Establishing a connection or pinging the server
    Connect,
    /// Executing a query (find, count)
    Query,
    /// Inserting documents
    Insert,
    /// Updating documents
    Update,
    /// Deleting documents
    Delete,
    /// Mixed write batch
    BulkWrite,
    /// Session and transaction operations (start, commit, abort)
    Transaction,
    /// Index management
    Index,
}

impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Query => write!(f, "query"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::BulkWrite => write!(f, "bulk_write"),
            Self::Transaction => write!(f, "transaction"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// Category of database error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    /// Failed to establish connection
    ConnectionFailed,
    /// Record not found
    NotFound,
    /// Unique index violation
    ConstraintViolation,
    /// Query execution failed
    QueryFailed,
    /// Transaction failed (start, commit, or abort)
    TransactionFailed,
    /// Document encoding or decoding failed
    TypeConversion,
    /// Configuration error
    Configuration,
    /// Operation timed out
    Timeout,
    /// Other/unknown error
    Other,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::TransactionFailed => write!(f, "transaction_failed"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Configuration => write!(f, "configuration"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured database error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    /// The operation being performed when the error occurred
    pub operation: DatabaseOperation,
    /// The category of error
    pub kind: DatabaseErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Additional context (e.g., collection name, index field)
    pub context: Option<String>,
}

impl DatabaseError {
    /// Create a new database error
    pub fn new(
        operation: DatabaseOperation,
        kind: DatabaseErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a new database error with context
    pub fn with_context(
        operation: DatabaseOperation,
        kind: DatabaseErrorKind,
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a "not found" error
    pub fn not_found(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::NotFound, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Connect,
            DatabaseErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a constraint violation error
    pub fn constraint_violation(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::ConstraintViolation, message)
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Query,
            DatabaseErrorKind::QueryFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::Timeout, message)
    }

    /// Create a transaction failed error
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Transaction,
            DatabaseErrorKind::TransactionFailed,
            message,
        )
    }

    /// Create a type conversion error
    pub fn type_conversion(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::TypeConversion, message)
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionFailed | DatabaseErrorKind::Timeout
        )
    }

    /// Add context to an existing error
    #[must_use]
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref ctx) = self.context {
            write!(f, " [context: {}]", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for DatabaseError {}

impl From<bson::ser::Error> for DatabaseError {
    fn from(err: bson::ser::Error) -> Self {
        Self::type_conversion(DatabaseOperation::Query, err.to_string())
    }
}

impl From<bson::de::Error> for DatabaseError {
    fn from(err: bson::de::Error) -> Self {
        Self::type_conversion(DatabaseOperation::Query, err.to_string())
    }
}

/// Sanitize a database URL by removing credentials
///
/// ```rust
/// use docwork::error::sanitize_url;
///
/// assert_eq!(
///     sanitize_url("mongodb://admin:secret@db:27017/app"),
///     "mongodb://<redacted>@db:27017/app"
/// );
/// assert_eq!(sanitize_url("mongodb://db:27017/app"), "mongodb://db:27017/app");
/// ```
pub fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(scheme_end) = url.find("://") {
            if scheme_end < at_pos {
                let scheme = &url[..scheme_end + 3];
                let after_at = &url[at_pos + 1..];
                return format!("{}<redacted>@{}", scheme, after_at);
            }
        }
    }
    url.to_string()
}

// ============================================================================
// Crate Error
// ============================================================================

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for configuration and bootstrap
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or extracted
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Configuration loaded but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Structured repository error
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        Error::Repository(RepositoryError::from(err))
    }
}

// Conversion from DatabaseError to RepositoryError
impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        use crate::repository::{RepositoryErrorKind, RepositoryOperation};

        let kind = match err.kind {
            DatabaseErrorKind::NotFound => RepositoryErrorKind::NotFound,
            DatabaseErrorKind::ConstraintViolation => RepositoryErrorKind::DuplicateEntity,
            DatabaseErrorKind::ConnectionFailed => RepositoryErrorKind::ConnectionFailed,
            DatabaseErrorKind::Timeout => RepositoryErrorKind::Timeout,
            DatabaseErrorKind::TypeConversion => RepositoryErrorKind::SerializationError,
            DatabaseErrorKind::Configuration => RepositoryErrorKind::ConfigInvalid,
            _ => RepositoryErrorKind::DatabaseError,
        };

        let operation = match err.operation {
            DatabaseOperation::Connect => RepositoryOperation::Connect,
            DatabaseOperation::Query => RepositoryOperation::FindAll,
            DatabaseOperation::Insert => RepositoryOperation::Insert,
            DatabaseOperation::Update => RepositoryOperation::Update,
            DatabaseOperation::Delete => RepositoryOperation::Delete,
            DatabaseOperation::BulkWrite => RepositoryOperation::BulkUpdate,
            DatabaseOperation::Transaction => RepositoryOperation::BeginTransaction,
            DatabaseOperation::Index => RepositoryOperation::CreateIndex,
        };

        let message = match err.context {
            Some(ctx) => format!("{} ({})", err.message, ctx),
            None => err.message,
        };

        Self {
            operation,
            kind,
            message,
            entity_type: None,
            entity_id: None,
        }
    }
}
