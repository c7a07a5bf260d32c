//! Restore error types

use std::fmt;

use crate::archive::ArchiveError;
use crate::bsonio::BsonIoError;
use crate::catalog::CatalogError;
use crate::intents::IntentError;
use crate::metadata::MetadataError;
use crate::oplog::OplogError;
use crate::server::ServerError;

/// Restore error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreErrorCode {
    /// Disallowed option combination, raised before any mutation
    DvRestoreValidation,
    /// The input tree or archive could not be planned
    DvRestorePlan,
    /// A document write failed and was not ignorable
    DvRestoreWrite,
    /// Index build failure
    DvRestoreIndex,
    /// Users/roles or auth-version failure
    DvRestoreAuth,
    /// Oplog replay failure
    DvRestoreOplog,
    /// Server-side failure
    DvRestoreServer,
    /// Cooperative shutdown; not a data error
    DvRestoreCancelled,
}

impl RestoreErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreErrorCode::DvRestoreValidation => "DV_RESTORE_VALIDATION",
            RestoreErrorCode::DvRestorePlan => "DV_RESTORE_PLAN",
            RestoreErrorCode::DvRestoreWrite => "DV_RESTORE_WRITE",
            RestoreErrorCode::DvRestoreIndex => "DV_RESTORE_INDEX",
            RestoreErrorCode::DvRestoreAuth => "DV_RESTORE_AUTH",
            RestoreErrorCode::DvRestoreOplog => "DV_RESTORE_OPLOG",
            RestoreErrorCode::DvRestoreServer => "DV_RESTORE_SERVER",
            RestoreErrorCode::DvRestoreCancelled => "DV_RESTORE_CANCELLED",
        }
    }
}

impl fmt::Display for RestoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Restore error with context
#[derive(Debug)]
pub struct RestoreError {
    code: RestoreErrorCode,
    message: String,
}

impl RestoreError {
    fn new(code: RestoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Disallowed option combination; nothing has been written yet
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::DvRestoreValidation, message)
    }

    /// Input tree or archive problem
    pub fn plan(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::DvRestorePlan, message)
    }

    /// A non-ignorable write failure
    pub fn write(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::DvRestoreWrite, message)
    }

    /// Index build failure
    pub fn index(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::DvRestoreIndex, message)
    }

    /// Users/roles/auth failure
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::DvRestoreAuth, message)
    }

    /// Cooperative shutdown
    pub fn cancelled() -> Self {
        Self::new(RestoreErrorCode::DvRestoreCancelled, "restore cancelled")
    }

    /// Returns the error code
    pub fn code(&self) -> RestoreErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RestoreError {}

impl From<ServerError> for RestoreError {
    fn from(err: ServerError) -> Self {
        Self::new(RestoreErrorCode::DvRestoreServer, err.to_string())
    }
}

impl From<BsonIoError> for RestoreError {
    fn from(err: BsonIoError) -> Self {
        Self::new(RestoreErrorCode::DvRestorePlan, err.to_string())
    }
}

impl From<ArchiveError> for RestoreError {
    fn from(err: ArchiveError) -> Self {
        Self::new(RestoreErrorCode::DvRestorePlan, err.to_string())
    }
}

impl From<CatalogError> for RestoreError {
    fn from(err: CatalogError) -> Self {
        Self::new(RestoreErrorCode::DvRestoreValidation, err.to_string())
    }
}

impl From<MetadataError> for RestoreError {
    fn from(err: MetadataError) -> Self {
        Self::new(RestoreErrorCode::DvRestoreIndex, err.to_string())
    }
}

impl From<IntentError> for RestoreError {
    fn from(err: IntentError) -> Self {
        Self::new(RestoreErrorCode::DvRestorePlan, err.to_string())
    }
}

impl From<OplogError> for RestoreError {
    fn from(err: OplogError) -> Self {
        Self::new(RestoreErrorCode::DvRestoreOplog, err.to_string())
    }
}

/// Result type for restore operations
pub type RestoreResult<T> = Result<T, RestoreError>;
