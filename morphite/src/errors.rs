use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for morphite operations.
///
/// Each kind describes one category of failure and carries its own blast
/// radius: a `ManifestError` aborts a whole run, a `ParseError` or
/// `OperationError` fails a single change unit, a `StoreConnectionError`
/// fails a single database, and a `LogWriteError` is only reported.
///
/// # Examples
///
/// ```rust,ignore
/// use morphite::errors::{MorphiteError, ErrorKind, MorphiteResult};
///
/// fn example() -> MorphiteResult<()> {
///     Err(MorphiteError::new("duplicate change unit id", ErrorKind::ManifestError))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Manifest Errors - fatal to the whole run, raised before any mutation
    /// The manifest file is malformed or contains duplicate change unit ids
    ManifestError,

    // Change Unit Errors - fatal to one change unit only
    /// A change-unit file is malformed or mixes incompatible operation keys
    ParseError,
    /// A single executor call against the store failed
    OperationError,

    // Database Errors - fatal to one database only
    /// The target database could not be resolved or authenticated
    StoreConnectionError,

    // Ledger Errors - reported, never fatal
    /// Appending a changelog entry failed
    LogWriteError,

    // Store Errors - surfaced by store backends
    /// Collection does not exist
    CollectionNotFound,
    /// A unique constraint was violated
    UniqueConstraintViolation,
    /// Transaction begin/commit/abort failed
    TransactionError,

    // IO and Encoding Errors
    /// Generic IO error
    IOError,
    /// Error encoding or decoding JSON data
    EncodingError,

    // Generic/Internal Errors - used as fallback
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ManifestError => write!(f, "Manifest error"),
            ErrorKind::ParseError => write!(f, "Parse error"),
            ErrorKind::OperationError => write!(f, "Operation error"),
            ErrorKind::StoreConnectionError => write!(f, "Store connection error"),
            ErrorKind::LogWriteError => write!(f, "Log write error"),
            ErrorKind::CollectionNotFound => write!(f, "Collection not found"),
            ErrorKind::UniqueConstraintViolation => write!(f, "Unique constraint violation"),
            ErrorKind::TransactionError => write!(f, "Transaction error"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom morphite error type.
///
/// `MorphiteError` encapsulates the error message, kind, and optional cause.
/// It supports error chaining and backtraces for debugging.
///
/// # Examples
///
/// ```rust,ignore
/// use morphite::errors::{MorphiteError, ErrorKind};
///
/// // Create a simple error
/// let err = MorphiteError::new("collection not found", ErrorKind::CollectionNotFound);
///
/// // Create an error with a cause
/// let cause = MorphiteError::new("connection refused", ErrorKind::IOError);
/// let err = MorphiteError::new_with_cause(
///     "cannot resolve database",
///     ErrorKind::StoreConnectionError,
///     cause,
/// );
/// ```
///
/// # Type alias
///
/// The `MorphiteResult<T>` type alias is equivalent to `Result<T, MorphiteError>`
/// and is used throughout the codebase for operations that can fail.
#[derive(Clone)]
pub struct MorphiteError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<MorphiteError>>,
    backtrace: Arc<Backtrace>,
}

impl MorphiteError {
    /// Creates a new `MorphiteError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        MorphiteError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    /// Creates a new `MorphiteError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for
    /// debugging.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: MorphiteError) -> Self {
        MorphiteError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&MorphiteError> {
        self.cause.as_deref()
    }
}

impl Display for MorphiteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for MorphiteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace),
        }
    }
}

impl Error for MorphiteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for morphite operations.
///
/// `MorphiteResult<T>` is shorthand for `Result<T, MorphiteError>`.
/// All fallible morphite operations return this type.
pub type MorphiteResult<T> = Result<T, MorphiteError>;

// From trait implementations for automatic error conversion
impl From<std::io::Error> for MorphiteError {
    fn from(err: std::io::Error) -> Self {
        MorphiteError::new(&format!("IO error: {}", err), ErrorKind::IOError)
    }
}

impl From<serde_json::Error> for MorphiteError {
    fn from(err: serde_json::Error) -> Self {
        MorphiteError::new(&format!("JSON error: {}", err), ErrorKind::EncodingError)
    }
}
