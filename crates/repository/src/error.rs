//! Error types for the repository layer.
//!
//! Two layers of errors live here. [`DriverError`] is what a store reports
//! (driver failures, missing rows, cancelled scopes) and is the only error an
//! [`ErrorDecipher`](crate::core::ErrorDecipher) looks at. [`RepositoryError`] is
//! the domain taxonomy handed back to callers: every store failure is classified
//! into exactly one of its kinds and tagged with the operation that produced it.

use std::fmt;

use thiserror::Error;

/// Boxed error used by entity hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type for all repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Caller-supplied arguments or entity state failed a precondition.
    #[error("validation failed in [{op}]: {source}")]
    Validation {
        op: &'static str,
        #[source]
        source: ValidationError,
    },

    /// Zero rows matched an id-based lookup.
    #[error("{entity} with value [{key}] not found")]
    NotFound {
        entity: String,
        key: String,
        #[source]
        source: Option<DriverError>,
    },

    /// The store reported a uniqueness conflict.
    #[error("{entity} with value [{}] already exists", key.as_deref().unwrap_or("<unknown>"))]
    AlreadyExists {
        entity: String,
        key: Option<String>,
        #[source]
        source: Option<DriverError>,
    },

    /// The operation is not configured for this entity.
    #[error("not implemented: [{op}] {message}")]
    NotImplemented { op: &'static str, message: String },

    /// Any other store, driver or hook failure.
    #[error("store error: [{op}] {message}: {source}")]
    Store {
        op: &'static str,
        message: String,
        #[source]
        source: BoxError,
    },

    /// Transaction lifecycle errors.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Flat classification of a [`RepositoryError`].
///
/// Downstream layers map these onto their own status codes
/// (`NotFound` → 404, `AlreadyExists` → 409, `Validation` → 400, rest → 500).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyExists,
    NotImplemented,
    Store,
    Transaction,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::NotImplemented => "not-implemented",
            ErrorKind::Store => "store",
            ErrorKind::Transaction => "transaction",
        };
        write!(f, "{}", name)
    }
}

impl RepositoryError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::Validation { .. } => ErrorKind::Validation,
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            RepositoryError::NotImplemented { .. } => ErrorKind::NotImplemented,
            RepositoryError::Store { .. } => ErrorKind::Store,
            RepositoryError::Transaction(_) => ErrorKind::Transaction,
        }
    }

    pub fn validation(op: &'static str, source: ValidationError) -> Self {
        RepositoryError::Validation { op, source }
    }

    pub fn not_found(
        entity: impl Into<String>,
        key: impl fmt::Display,
        source: Option<DriverError>,
    ) -> Self {
        RepositoryError::NotFound {
            entity: entity.into(),
            key: key.to_string(),
            source,
        }
    }

    pub fn already_exists(
        entity: impl Into<String>,
        key: Option<String>,
        source: Option<DriverError>,
    ) -> Self {
        RepositoryError::AlreadyExists {
            entity: entity.into(),
            key,
            source,
        }
    }

    pub fn not_implemented(op: &'static str, message: impl Into<String>) -> Self {
        RepositoryError::NotImplemented {
            op,
            message: message.into(),
        }
    }

    pub fn store(
        op: &'static str,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        RepositoryError::Store {
            op,
            message: message.into(),
            source: source.into(),
        }
    }

    /// Returns true for [`ErrorKind::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true for [`ErrorKind::AlreadyExists`].
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Returns the underlying driver error when the failure came from the store.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            RepositoryError::NotFound { source, .. }
            | RepositoryError::AlreadyExists { source, .. } => source.as_ref(),
            RepositoryError::Store { source, .. } => source.downcast_ref::<DriverError>(),
            RepositoryError::Transaction(err) => err.driver_error(),
            _ => None,
        }
    }
}

/// Errors related to argument and entity validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An argument is out of range.
    #[error("invalid argument [{param}] with value [{value}]")]
    InvalidArgument { param: String, value: String },

    /// A required field is not set.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    /// A field that must be empty for this operation is set.
    #[error("field {field} should be empty")]
    UnexpectedField { field: String },

    /// The entity failed validation.
    #[error("invalid entity: {message}")]
    InvalidEntity { message: String },
}

impl ValidationError {
    pub fn invalid_argument(param: impl Into<String>, value: impl fmt::Display) -> Self {
        ValidationError::InvalidArgument {
            param: param.into(),
            value: value.to_string(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError::MissingRequiredField {
            field: field.into(),
        }
    }

    pub fn unexpected(field: impl Into<String>) -> Self {
        ValidationError::UnexpectedField {
            field: field.into(),
        }
    }
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The store refused to open a transaction.
    #[error("begin transaction failed: {source}")]
    Begin {
        #[source]
        source: DriverError,
    },

    /// Commit failed; the transaction has been rolled back or abandoned.
    #[error("commit failed: {source}")]
    Commit {
        #[source]
        source: DriverError,
    },

    /// Begin or commit did not complete before the deadline.
    #[error("transaction {stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    /// The unit of work panicked; the transaction was rolled back.
    #[error("unit of work panicked: {message}")]
    Panicked { message: String },

    /// Transaction is no longer valid (already committed or rolled back).
    #[error("transaction no longer valid")]
    InvalidTransaction,
}

impl TransactionError {
    fn driver_error(&self) -> Option<&DriverError> {
        match self {
            TransactionError::Begin { source }
            | TransactionError::Commit { source } => Some(source),
            _ => None,
        }
    }
}

/// Errors reported by a store driver.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A single-row query produced no row.
    #[error("no rows in result set")]
    NoRows,

    /// The statement text is blank.
    #[error("statement is empty")]
    EmptyStatement,

    /// A prepared statement was used after being closed.
    #[error("prepared statement already closed")]
    StatementClosed,

    /// The transaction was used after commit or rollback.
    #[error("transaction already finished")]
    TransactionClosed,

    /// The caller's scope was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A column could not be found in the row.
    #[error("column not found: {column}")]
    ColumnNotFound { column: String },

    /// A column value could not be converted to the requested type.
    #[error("cannot convert column {column}: {message}")]
    Conversion { column: String, message: String },

    /// Several failures collected from one operation.
    #[error("{}", join_errors(.0))]
    Multiple(Vec<DriverError>),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "sqlite")]
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Any other driver failure.
    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl DriverError {
    pub fn other(message: impl Into<String>) -> Self {
        DriverError::Other {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true when the scope was cancelled or its deadline passed.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DriverError::Cancelled | DriverError::DeadlineExceeded)
    }
}

fn join_errors(errors: &[DriverError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
