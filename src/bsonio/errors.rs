//! BSON stream error types
//!
//! Framing failures are format errors and fatal: a truncated or malformed
//! document means the rest of the stream cannot be trusted. Plain I/O
//! failures keep their underlying error as the source.

use std::fmt;
use std::io;

/// BSON stream error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsonIoErrorCode {
    /// Stream ended inside a document
    DvBsonTruncated,
    /// Length prefix or terminator is malformed
    DvBsonInvalid,
    /// Underlying read/write failure
    DvBsonIo,
}

impl BsonIoErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BsonIoErrorCode::DvBsonTruncated => "DV_BSON_TRUNCATED",
            BsonIoErrorCode::DvBsonInvalid => "DV_BSON_INVALID",
            BsonIoErrorCode::DvBsonIo => "DV_BSON_IO",
        }
    }
}

impl fmt::Display for BsonIoErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// BSON stream error with context
#[derive(Debug)]
pub struct BsonIoError {
    code: BsonIoErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl BsonIoError {
    fn new(code: BsonIoErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Stream ended mid-document
    pub fn truncated(message: impl Into<String>) -> Self {
        Self::new(BsonIoErrorCode::DvBsonTruncated, message, None)
    }

    /// Malformed framing (bad length prefix, missing terminator)
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(BsonIoErrorCode::DvBsonInvalid, message, None)
    }

    /// Underlying I/O failure
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(BsonIoErrorCode::DvBsonIo, message, Some(source))
    }

    /// Returns the error code
    pub fn code(&self) -> BsonIoErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Format errors poison the stream; every BSON stream error is fatal
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for BsonIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for BsonIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<io::Error> for BsonIoError {
    fn from(err: io::Error) -> Self {
        BsonIoError::io("I/O error on BSON stream", err)
    }
}

/// Result type for BSON stream operations
pub type BsonIoResult<T> = Result<T, BsonIoError>;
