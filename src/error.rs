//! Error types for the Cinnabar interpreter

use std::fmt;
use thiserror::Error;

/// Errors surfaced at the crate boundary.
///
/// Guest-level exceptions travel through the interpreter as a pending-exception
/// state on the executing thread; they only become an [`Error`] when they
/// escape the outermost frame uncaught.
#[derive(Error, Debug)]
pub enum Error {
    /// A guest exception unwound past every try block
    #[error("Uncaught {kind}: {message}")]
    UncaughtException { kind: ErrorKind, message: String },

    /// Malformed bytecode encountered during dispatch
    #[error("InvalidBytecode: {message} at offset {offset}")]
    InvalidBytecode { message: String, offset: usize },

    /// A program image failed validation before execution
    #[error("InvalidProgram: {0}")]
    InvalidProgram(String),

    /// Internal engine invariant violation
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error (program image loading)
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

/// Guest-visible error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// TypeError - wrong type for operation
    TypeError,
    /// ReferenceError - unresolvable binding
    ReferenceError,
    /// RangeError - value out of range (includes call-stack exhaustion)
    RangeError,
    /// SyntaxError - invalid program shape detected at runtime
    SyntaxError,
    /// Generic Error - user-thrown values
    GenericError,
}

impl ErrorKind {
    /// Parse an error-kind name as found on a guest error object
    pub fn from_name(name: &str) -> ErrorKind {
        match name {
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "SyntaxError" => ErrorKind::SyntaxError,
            _ => ErrorKind::GenericError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ReferenceError => write!(f, "ReferenceError"),
            ErrorKind::RangeError => write!(f, "RangeError"),
            ErrorKind::SyntaxError => write!(f, "SyntaxError"),
            ErrorKind::GenericError => write!(f, "Error"),
        }
    }
}

impl Error {
    /// Create an uncaught-exception error
    pub fn uncaught(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::UncaughtException {
            kind,
            message: message.into(),
        }
    }

    /// Create an invalid-bytecode error
    pub fn invalid_bytecode(message: impl Into<String>, offset: usize) -> Self {
        Error::InvalidBytecode {
            message: message.into(),
            offset,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::InternalError(message.into())
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
