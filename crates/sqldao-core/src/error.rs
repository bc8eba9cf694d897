//! Error types for SqlDao operations.

use std::fmt;

/// The primary error type for all SqlDao operations.
#[derive(Debug)]
pub enum Error {
    /// An entity failed its validator before any SQL was rendered
    Validation(ValidationError),
    /// A filter could not be constructed (empty IN set, unknown field, ...)
    MalformedFilter(FilterError),
    /// A 0-or-1 contract found more than one row
    Cardinality(CardinalityError),
    /// The database collaborator rejected or failed a statement
    Execution(ExecutionError),
    /// Parent/child bindings are inconsistent with persisted state
    Consistency(ConsistencyError),
    /// Configuration errors
    Config(ConfigError),
    /// Connection manager errors
    Pool(PoolError),
    /// I/O errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// Application-defined invariants rejected an entity.
#[derive(Debug)]
pub struct ValidationError {
    /// Table of the entity that failed validation
    pub table: String,
    /// Human-readable message from the validator
    pub message: String,
    /// Underlying cause reported by the validator, if any
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct FilterError {
    pub kind: FilterErrorKind,
    pub column: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterErrorKind {
    /// IN comparison built from an empty value set
    EmptyValueSet,
    /// Field name not present on the target table
    UnknownField,
    /// Column requested in a projection is not part of the table
    InvalidColumn,
    /// Comparison built without a column name
    MissingColumn,
    /// Ordered comparison (`<`, `<=`, `>`, `>=`) against NULL
    NullComparison,
}

#[derive(Debug)]
pub struct CardinalityError {
    pub table: String,
    pub found: usize,
}

#[derive(Debug)]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// Statement rejected by the database (syntax, constraint, ...)
    Rejected,
    /// Statement executed but its result set was not in the expected shape
    UnexpectedResult,
    /// Connection-level failure reported by the collaborator
    Connection,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ConsistencyError {
    pub kind: ConsistencyErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyErrorKind {
    /// Parent entity has no key value yet
    ParentNotPersisted,
    /// Collection needs a parent/foreign-key binding it does not have
    MissingParentBinding,
    /// Entity operation needs a key value that is not set
    MissingKey,
    /// No relationship with the requested name is declared on the schema
    UnknownRelation,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Creating a driver connection failed
    Connect,
    /// Configuration error
    Config,
}

impl Error {
    /// Build a validation error for `table`.
    pub fn validation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(ValidationError {
            table: table.into(),
            message: message.into(),
            cause: None,
        })
    }

    /// Build a malformed-filter error.
    pub fn malformed_filter(
        kind: FilterErrorKind,
        column: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::MalformedFilter(FilterError {
            kind,
            column: column.map(str::to_string),
            message: message.into(),
        })
    }

    /// Build a consistency error.
    pub fn consistency(kind: ConsistencyErrorKind, message: impl Into<String>) -> Self {
        Error::Consistency(ConsistencyError {
            kind,
            message: message.into(),
        })
    }

    /// Build an execution error for a statement the database rejected.
    pub fn execution(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution(ExecutionError {
            kind: ExecutionErrorKind::Rejected,
            sql: Some(sql.into()),
            message: message.into(),
            source: None,
        })
    }

    /// Is this a validation failure?
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Is this a malformed-filter failure?
    pub fn is_malformed_filter(&self) -> bool {
        matches!(self, Error::MalformedFilter(_))
    }

    /// Is this a consistency failure of the given kind?
    pub fn is_consistency(&self, kind: ConsistencyErrorKind) -> bool {
        matches!(self, Error::Consistency(c) if c.kind == kind)
    }

    /// Errors are never retried at this layer; retry policy belongs to the
    /// database collaborator or the caller.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Execution(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::MalformedFilter(e) => write!(f, "Malformed filter: {}", e),
            Error::Cardinality(e) => write!(f, "Cardinality error: {}", e),
            Error::Execution(e) => write!(f, "Execution error: {}", e),
            Error::Consistency(e) => write!(f, "Consistency error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Pool(e) => write!(f, "Pool error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(e) => e
                .cause
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Execution(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Pool(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed validation: {}", self.table, self.message)
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(column) = &self.column {
            write!(f, "{} (column '{}')", self.message, column)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for CardinalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "multiple entries found in {}: expected at most one, found {}",
            self.table, self.found
        )
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<FilterError> for Error {
    fn from(err: FilterError) -> Self {
        Error::MalformedFilter(err)
    }
}

impl From<CardinalityError> for Error {
    fn from(err: CardinalityError) -> Self {
        Error::Cardinality(err)
    }
}

impl From<ExecutionError> for Error {
    fn from(err: ExecutionError) -> Self {
        Error::Execution(err)
    }
}

impl From<ConsistencyError> for Error {
    fn from(err: ConsistencyError) -> Self {
        Error::Consistency(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::Pool(err)
    }
}

/// Result type alias for SqlDao operations.
pub type Result<T> = std::result::Result<T, Error>;
