//! Oplog replay error types

use std::fmt;

use crate::bsonio::BsonIoError;
use crate::server::ServerError;

/// Oplog error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OplogErrorCode {
    /// A replication-log entry is malformed
    DvOplogEntry,
    /// The underlying entry stream failed
    DvOplogStream,
    /// The server rejected an apply-ops batch
    DvOplogApply,
    /// A resharding operation was detected in the stream
    DvOplogResharding,
}

impl OplogErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OplogErrorCode::DvOplogEntry => "DV_OPLOG_ENTRY",
            OplogErrorCode::DvOplogStream => "DV_OPLOG_STREAM",
            OplogErrorCode::DvOplogApply => "DV_OPLOG_APPLY",
            OplogErrorCode::DvOplogResharding => "DV_OPLOG_RESHARDING",
        }
    }
}

impl fmt::Display for OplogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Oplog replay error
#[derive(Debug)]
pub struct OplogError {
    code: OplogErrorCode,
    message: String,
}

impl OplogError {
    /// Malformed entry
    pub fn entry(message: impl Into<String>) -> Self {
        Self {
            code: OplogErrorCode::DvOplogEntry,
            message: message.into(),
        }
    }

    /// Resharding detected; replay must not proceed
    pub fn resharding(message: impl Into<String>) -> Self {
        Self {
            code: OplogErrorCode::DvOplogResharding,
            message: message.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> OplogErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Replay stops on the first error; all oplog errors are fatal
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for OplogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for OplogError {}

impl From<BsonIoError> for OplogError {
    fn from(err: BsonIoError) -> Self {
        Self {
            code: OplogErrorCode::DvOplogStream,
            message: err.to_string(),
        }
    }
}

impl From<ServerError> for OplogError {
    fn from(err: ServerError) -> Self {
        Self {
            code: OplogErrorCode::DvOplogApply,
            message: err.to_string(),
        }
    }
}

/// Result type for oplog operations
pub type OplogResult<T> = Result<T, OplogError>;
