//! Dump error types

use std::fmt;

use crate::archive::ArchiveError;
use crate::bsonio::BsonIoError;
use crate::catalog::CatalogError;
use crate::metadata::MetadataError;
use crate::server::ServerError;

/// Dump error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpErrorCode {
    /// Disallowed option combination, raised before any I/O
    DvDumpValidation,
    /// Namespace enumeration failed
    DvDumpEnumeration,
    /// A collection worker failed
    DvDumpWorker,
    /// A resharding operation is in progress
    DvDumpResharding,
    /// Output tree or archive failure
    DvDumpOutput,
    /// Server-side failure
    DvDumpServer,
}

impl DumpErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DumpErrorCode::DvDumpValidation => "DV_DUMP_VALIDATION",
            DumpErrorCode::DvDumpEnumeration => "DV_DUMP_ENUMERATION",
            DumpErrorCode::DvDumpWorker => "DV_DUMP_WORKER",
            DumpErrorCode::DvDumpResharding => "DV_DUMP_RESHARDING",
            DumpErrorCode::DvDumpOutput => "DV_DUMP_OUTPUT",
            DumpErrorCode::DvDumpServer => "DV_DUMP_SERVER",
        }
    }
}

impl fmt::Display for DumpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dump error with context
#[derive(Debug)]
pub struct DumpError {
    code: DumpErrorCode,
    message: String,
}

impl DumpError {
    fn new(code: DumpErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Disallowed option combination; nothing has been read or written yet
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(DumpErrorCode::DvDumpValidation, message)
    }

    /// Enumeration failure
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::new(DumpErrorCode::DvDumpEnumeration, message)
    }

    /// Worker failure
    pub fn worker(message: impl Into<String>) -> Self {
        Self::new(DumpErrorCode::DvDumpWorker, message)
    }

    /// The distinctive resharding failure
    pub fn resharding() -> Self {
        Self::new(
            DumpErrorCode::DvDumpResharding,
            "cannot dump with oplog while resharding operation is in progress",
        )
    }

    /// Output failure
    pub fn output(message: impl Into<String>) -> Self {
        Self::new(DumpErrorCode::DvDumpOutput, message)
    }

    /// Returns the error code
    pub fn code(&self) -> DumpErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for DumpError {}

impl From<ServerError> for DumpError {
    fn from(err: ServerError) -> Self {
        Self::new(DumpErrorCode::DvDumpServer, err.to_string())
    }
}

impl From<BsonIoError> for DumpError {
    fn from(err: BsonIoError) -> Self {
        Self::new(DumpErrorCode::DvDumpOutput, err.to_string())
    }
}

impl From<ArchiveError> for DumpError {
    fn from(err: ArchiveError) -> Self {
        Self::new(DumpErrorCode::DvDumpOutput, err.to_string())
    }
}

impl From<CatalogError> for DumpError {
    fn from(err: CatalogError) -> Self {
        Self::new(DumpErrorCode::DvDumpValidation, err.to_string())
    }
}

impl From<MetadataError> for DumpError {
    fn from(err: MetadataError) -> Self {
        Self::new(DumpErrorCode::DvDumpEnumeration, err.to_string())
    }
}

/// Result type for dump operations
pub type DumpResult<T> = Result<T, DumpError>;
