//! Server error model
//!
//! Errors surfaced by the driver seam. A small set of per-document write
//! failures is ignorable (logged and skipped unless stop-on-error is set);
//! the timeseries mixed-schema rejection is recoverable by a collMod and a
//! retry; everything else from the server is fatal.

use std::fmt;

/// Duplicate key on insert.
pub const DUPLICATE_KEY: i32 = 11000;

/// Document failed the collection validator.
pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

/// Timeseries bucket insert rejected because the bucket carries
/// mixed-schema data and the collection does not allow it yet.
pub const MIXED_SCHEMA_NOT_ALLOWED: i32 = 408;

/// Sentinel message for writes the server never acknowledged.
pub const UNACKNOWLEDGED_WRITE: &str = "unacknowledged write";

/// Returns true for per-document write error codes the restore pipeline
/// may skip.
pub fn write_code_ignorable(code: i32) -> bool {
    code == DUPLICATE_KEY || code == DOCUMENT_VALIDATION_FAILURE
}

/// A per-document failure inside a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Index of the failing document within the submitted batch
    pub index: usize,
    /// Server error code
    pub code: i32,
    /// Server error message
    pub message: String,
}

impl WriteFailure {
    /// Returns true if this failure may be skipped under the ignore policy.
    pub fn is_ignorable(&self) -> bool {
        write_code_ignorable(self.code) || self.message == UNACKNOWLEDGED_WRITE
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write error at index {}: ({}) {}", self.index, self.code, self.message)
    }
}

/// Error from a server operation.
#[derive(Debug, Clone)]
pub struct ServerError {
    /// Server error code, when the server supplied one
    code: Option<i32>,
    message: String,
}

impl ServerError {
    /// A command failure with a server error code.
    pub fn command(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// A failure without a server code (connection loss, protocol trouble).
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// A command or namespace the server does not implement.
    pub fn no_such_command(name: &str) -> Self {
        Self {
            code: Some(59),
            message: format!("no such cmd: {}", name),
        }
    }

    /// Namespace not found.
    pub fn namespace_not_found(ns: &str) -> Self {
        Self {
            code: Some(26),
            message: format!("ns not found: {}", ns),
        }
    }

    /// Returns the server error code, if any.
    pub fn error_code(&self) -> Option<i32> {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true when the failure is the timeseries mixed-schema
    /// rejection, which restore recovers from with a collMod and a retry.
    pub fn is_mixed_schema_rejection(&self) -> bool {
        self.code == Some(MIXED_SCHEMA_NOT_ALLOWED)
    }

    /// Returns true for "no such command", which triggers legacy fallbacks.
    pub fn is_unknown_command(&self) -> bool {
        self.code == Some(59) || self.message.starts_with("no such cmd")
    }

    /// Returns true for "namespace not found", which drop tolerates.
    pub fn is_namespace_not_found(&self) -> bool {
        self.code == Some(26)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "server error ({}): {}", code, self.message),
            None => write!(f, "server error: {}", self.message),
        }
    }
}

impl std::error::Error for ServerError {}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
