//! Repository error types
//!
//! Every layer above the document store (unit of work, repositories,
//! services) reports failures as a [`RepositoryError`]: a structured error
//! carrying the operation that failed, a [`RepositoryErrorKind`], a message
//! and optionally the entity involved.
//!
//! # Example
//!
//! ```rust
//! use docwork::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("User", "64b7f0c2a1b2c3d4e5f60718");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Validating configuration and connecting to the store
    Connect,
    /// Starting a transaction
    BeginTransaction,
    /// Committing a transaction
    CommitTransaction,
    /// Aborting a transaction
    RollbackTransaction,
    /// Finding a single entity by ID
    FindById,
    /// Finding a single entity by identifier or sparse entity filter
    FindOne,
    /// Finding multiple entities
    FindAll,
    /// Counting entities
    Count,
    /// Resolving an ID from a unique field
    ResolveId,
    /// Inserting a new entity
    Insert,
    /// Updating an existing entity
    Update,
    /// Deleting an entity (hard delete)
    Delete,
    /// Soft deleting an entity
    SoftDelete,
    /// Physically removing an entity and returning it
    HardDelete,
    /// Restoring a soft-deleted entity
    Restore,
    /// Restoring every soft-deleted entity
    RestoreAll,
    /// Listing soft-deleted entities
    GetTrashed,
    /// Batched insert
    BulkInsert,
    /// Batched update
    BulkUpdate,
    /// Batched soft delete
    BulkSoftDelete,
    /// Batched hard delete
    BulkHardDelete,
    /// Creating a unique index
    CreateIndex,
    /// Input validation in the service layer
    Validate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::CommitTransaction => write!(f, "commit_transaction"),
            Self::RollbackTransaction => write!(f, "rollback_transaction"),
            Self::FindById => write!(f, "find_by_id"),
            Self::FindOne => write!(f, "find_one"),
            Self::FindAll => write!(f, "find_all"),
            Self::Count => write!(f, "count"),
            Self::ResolveId => write!(f, "resolve_id"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::SoftDelete => write!(f, "soft_delete"),
            Self::HardDelete => write!(f, "hard_delete"),
            Self::Restore => write!(f, "restore"),
            Self::RestoreAll => write!(f, "restore_all"),
            Self::GetTrashed => write!(f, "get_trashed"),
            Self::BulkInsert => write!(f, "bulk_insert"),
            Self::BulkUpdate => write!(f, "bulk_update"),
            Self::BulkSoftDelete => write!(f, "bulk_soft_delete"),
            Self::BulkHardDelete => write!(f, "bulk_hard_delete"),
            Self::CreateIndex => write!(f, "create_index"),
            Self::Validate => write!(f, "validate"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Connection configuration is invalid (host, port, database)
    ConfigInvalid,
    /// Failed to connect to the store
    ConnectionFailed,
    /// `begin_transaction` called while a transaction is open
    TransactionAlreadyInProgress,
    /// `commit_transaction` called without an open transaction
    NoTransactionInProgress,
    /// Read, update or delete target is missing
    NotFound,
    /// Restore target is missing or not soft-deleted
    NotFoundInTrash,
    /// A unique value is already taken
    DuplicateEntity,
    /// Input validation failed before any store round-trip
    ValidationFailed,
    /// A bulk update modified fewer documents than requested
    BulkPartialMismatch,
    /// A stored value could not be converted to an ObjectId
    TypeCoercionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying store error
    DatabaseError,
    /// Encoding or decoding a document failed
    SerializationError,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid => write!(f, "config_invalid"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::TransactionAlreadyInProgress => write!(f, "transaction_already_in_progress"),
            Self::NoTransactionInProgress => write!(f, "no_transaction_in_progress"),
            Self::NotFound => write!(f, "not_found"),
            Self::NotFoundInTrash => write!(f, "not_found_in_trash"),
            Self::DuplicateEntity => write!(f, "duplicate_entity"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::BulkPartialMismatch => write!(f, "bulk_partial_mismatch"),
            Self::TypeCoercionFailed => write!(f, "type_coercion_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use docwork::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::not_found("User", "64b7f0c2a1b2c3d4e5f60718")
///     .with_operation(RepositoryOperation::Update);
/// assert_eq!(
///     error.to_string(),
///     "Repository not_found error during update: Entity not found [User: 64b7f0c2a1b2c3d4e5f60718]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "User", "Product")
    pub entity_type: Option<String>,
    /// The ID or unique value of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::FindById,
            kind: RepositoryErrorKind::NotFound,
            message: "Entity not found".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
        }
    }

    /// Create a "not found" error for a query without a single ID
    pub fn no_match(operation: RepositoryOperation) -> Self {
        Self::new(operation, RepositoryErrorKind::NotFound, "Entity not found")
    }

    /// Create a "not found in trash" error for a failed restore
    pub fn not_found_in_trash() -> Self {
        Self::new(
            RepositoryOperation::Restore,
            RepositoryErrorKind::NotFoundInTrash,
            "Entity not found in trash",
        )
    }

    /// Create a duplicate entity error
    ///
    /// ```rust
    /// use docwork::repository::{RepositoryError, RepositoryErrorKind};
    ///
    /// let error = RepositoryError::duplicate("User", "alice@example.com");
    /// assert_eq!(error.kind, RepositoryErrorKind::DuplicateEntity);
    /// ```
    pub fn duplicate(entity_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::Insert,
            kind: RepositoryErrorKind::DuplicateEntity,
            message: "Entity already exists".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: Some(identifier.into()),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Validate,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Create an invalid configuration error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Connect,
            RepositoryErrorKind::ConfigInvalid,
            message,
        )
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Connect,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// `begin_transaction` on an instance that already holds one
    pub fn transaction_already_in_progress() -> Self {
        Self::new(
            RepositoryOperation::BeginTransaction,
            RepositoryErrorKind::TransactionAlreadyInProgress,
            "transaction already in progress",
        )
    }

    /// `commit_transaction` on an idle instance
    pub fn no_transaction_in_progress() -> Self {
        Self::new(
            RepositoryOperation::CommitTransaction,
            RepositoryErrorKind::NoTransactionInProgress,
            "no transaction in progress",
        )
    }

    /// A bulk update that modified fewer documents than it was given
    ///
    /// ```rust
    /// use docwork::repository::RepositoryError;
    ///
    /// let error = RepositoryError::bulk_partial_mismatch(2, 3);
    /// assert!(error.message.contains("modified 2 out of 3"));
    /// ```
    pub fn bulk_partial_mismatch(applied: u64, requested: usize) -> Self {
        Self::new(
            RepositoryOperation::BulkUpdate,
            RepositoryErrorKind::BulkPartialMismatch,
            format!(
                "not all entities were updated: modified {} out of {}",
                applied, requested
            ),
        )
    }

    /// A stored identifier value that is not an ObjectId
    pub fn type_coercion_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::ResolveId,
            RepositoryErrorKind::TypeCoercionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a database error
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set only the entity type, keeping any ID already attached
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Prefix the message, keeping kind and operation
    ///
    /// Used by the service layer for per-item context in sequential batches.
    #[must_use]
    pub fn context(mut self, prefix: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", prefix, self.message);
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// Nothing in this crate retries; the flag is for callers that do.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }

    /// True for both `NotFound` and `NotFoundInTrash`
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::NotFound | RepositoryErrorKind::NotFoundInTrash
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(ref entity_type), Some(ref entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindById), "find_by_id");
        assert_eq!(format!("{}", RepositoryOperation::FindAll), "find_all");
        assert_eq!(format!("{}", RepositoryOperation::Insert), "insert");
        assert_eq!(
            format!("{}", RepositoryOperation::BulkSoftDelete),
            "bulk_soft_delete"
        );
        assert_eq!(format!("{}", RepositoryOperation::RestoreAll), "restore_all");
        assert_eq!(
            format!("{}", RepositoryOperation::BeginTransaction),
            "begin_transaction"
        );
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(format!("{}", RepositoryErrorKind::NotFound), "not_found");
        assert_eq!(
            format!("{}", RepositoryErrorKind::NotFoundInTrash),
            "not_found_in_trash"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::DuplicateEntity),
            "duplicate_entity"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::BulkPartialMismatch),
            "bulk_partial_mismatch"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::TypeCoercionFailed),
            "type_coercion_failed"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Timeout), "timeout");
    }

    #[test]
    fn test_not_found_convenience() {
        let error = RepositoryError::not_found("User", "abc");
        assert_eq!(error.operation, RepositoryOperation::FindById);
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_type, Some("User".to_string()));
        assert_eq!(error.entity_id, Some("abc".to_string()));
        assert!(error.is_not_found());
    }

    #[test]
    fn test_not_found_in_trash_counts_as_not_found() {
        let error = RepositoryError::not_found_in_trash();
        assert_eq!(error.kind, RepositoryErrorKind::NotFoundInTrash);
        assert_eq!(error.operation, RepositoryOperation::Restore);
        assert!(error.is_not_found());
    }

    #[test]
    fn test_bulk_partial_mismatch_message() {
        let error = RepositoryError::bulk_partial_mismatch(2, 3);
        assert_eq!(error.kind, RepositoryErrorKind::BulkPartialMismatch);
        assert_eq!(
            error.message,
            "not all entities were updated: modified 2 out of 3"
        );
    }

    #[test]
    fn test_transaction_errors() {
        assert_eq!(
            RepositoryError::transaction_already_in_progress().kind,
            RepositoryErrorKind::TransactionAlreadyInProgress
        );
        assert_eq!(
            RepositoryError::no_transaction_in_progress().kind,
            RepositoryErrorKind::NoTransactionInProgress
        );
    }

    #[test]
    fn test_context_prefixes_message() {
        let error = RepositoryError::validation_failed("email is required").context("user 2");
        assert_eq!(error.message, "user 2: email is required");
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[test]
    fn test_is_retriable() {
        assert!(RepositoryError::connection_failed("refused").is_retriable());
        assert!(RepositoryError::timeout(RepositoryOperation::FindAll, "slow").is_retriable());
        assert!(!RepositoryError::not_found("User", "1").is_retriable());
        assert!(!RepositoryError::duplicate("User", "a@b.c").is_retriable());
        assert!(!RepositoryError::validation_failed("bad").is_retriable());
    }

    #[test]
    fn test_display_without_entity() {
        let error = RepositoryError::database_error(RepositoryOperation::Insert, "write failed");
        let display = error.to_string();
        assert_eq!(
            display,
            "Repository database_error error during insert: write failed"
        );
        assert!(!display.contains('['));
    }

    #[test]
    fn test_display_with_entity() {
        let error = RepositoryError::duplicate("User", "alice@example.com");
        assert_eq!(
            error.to_string(),
            "Repository duplicate_entity error during insert: Entity already exists [User: alice@example.com]"
        );
    }

    #[test]
    fn test_with_entity_type_keeps_missing_id_out_of_display() {
        let error = RepositoryError::no_match(RepositoryOperation::FindOne).with_entity_type("User");
        assert_eq!(error.entity_type, Some("User".to_string()));
        assert!(!error.to_string().contains('['));
    }

    #[test]
    fn test_error_is_error_trait() {
        let error: Box<dyn std::error::Error> = Box::new(RepositoryError::not_found("User", "1"));
        assert!(error.to_string().contains("not_found"));
    }
}
