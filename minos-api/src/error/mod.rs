//! Error handling module for the MinOS kernel

use core::fmt;

#[cfg(feature = "alloc")]
use alloc::string::String;
#[cfg(feature = "alloc")]
use alloc::format;

/// Common error type used throughout the MinOS kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Out of memory
    OutOfMemory,
    /// No free slot in the process table
    TableFull,
    /// Target process not found or not visible to the caller
    NotFound,
    /// Thread is already bound to a process
    AlreadyAttached,
    /// Operation is undefined for the current state
    InvalidState(&'static str),
    /// Invalid argument
    InvalidArgument(&'static str),
    /// Wrapped error carrying additional context
    #[cfg(feature = "alloc")]
    Context(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::TableFull => write!(f, "Process table full"),
            Error::NotFound => write!(f, "Not found"),
            Error::AlreadyAttached => write!(f, "Thread already attached to a process"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            #[cfg(feature = "alloc")]
            Error::Context(msg) => write!(f, "{}", msg),
        }
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Adds context to the error
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, _context: &'static str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            #[cfg(feature = "alloc")]
            Err(error) => Err(Error::Context(format!("{}: {}", _context, error))),
            #[cfg(not(feature = "alloc"))]
            Err(error) => Err(error),
        }
    }
}

/// Creates a new out of memory error
pub fn out_of_memory() -> Error {
    Error::OutOfMemory
}

/// Creates a new table-full error
pub fn table_full() -> Error {
    Error::TableFull
}

/// Creates a new not found error
pub fn not_found() -> Error {
    Error::NotFound
}

/// Creates a new invalid state error
pub fn invalid_state(msg: &'static str) -> Error {
    Error::InvalidState(msg)
}

/// Creates a new invalid argument error
pub fn invalid_argument(msg: &'static str) -> Error {
    Error::InvalidArgument(msg)
}
