//! Archive error types
//!
//! Malformed framing is fatal: once the message sequence is off, nothing
//! later in the archive can be attributed to the right namespace.

use std::fmt;
use std::io;

/// Archive error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorCode {
    /// Malformed framing: bad magic, short read mid-message, chunk outside
    /// a body, duplicate open, terminator for an unopened namespace
    DvArchiveFormat,
    /// Underlying read/write failure
    DvArchiveIo,
    /// Writer misuse: chunk after namespace close, second prelude
    DvArchiveState,
}

impl ArchiveErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveErrorCode::DvArchiveFormat => "DV_ARCHIVE_FORMAT",
            ArchiveErrorCode::DvArchiveIo => "DV_ARCHIVE_IO",
            ArchiveErrorCode::DvArchiveState => "DV_ARCHIVE_STATE",
        }
    }
}

impl fmt::Display for ArchiveErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Archive error with context
#[derive(Debug)]
pub struct ArchiveError {
    code: ArchiveErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl ArchiveError {
    fn new(code: ArchiveErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Malformed framing
    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ArchiveErrorCode::DvArchiveFormat, message, None)
    }

    /// Underlying I/O failure
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(ArchiveErrorCode::DvArchiveIo, message, Some(source))
    }

    /// Writer-side state violation
    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ArchiveErrorCode::DvArchiveState, message, None)
    }

    /// Returns the error code
    pub fn code(&self) -> ArchiveErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Archive errors always poison the stream
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ArchiveError::format("x").code().as_str(), "DV_ARCHIVE_FORMAT");
        assert_eq!(ArchiveError::state("x").code().as_str(), "DV_ARCHIVE_STATE");
    }

    #[test]
    fn test_always_fatal() {
        assert!(ArchiveError::format("x").is_fatal());
        assert!(ArchiveError::io("x", io::Error::new(io::ErrorKind::Other, "y")).is_fatal());
    }
}
