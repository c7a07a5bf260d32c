//! CLI error surface

use std::fmt;

use crate::archive::ArchiveError;
use crate::dump::DumpError;
use crate::restore::RestoreError;

/// Result type for CLI commands
pub type CliResult<T> = Result<T, CliError>;

/// A command failure ready for the process exit path.
#[derive(Debug)]
pub struct CliError {
    code: String,
    message: String,
}

impl CliError {
    /// A failure of the CLI layer itself (bad arguments, unknown scheme)
    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            code: "DV_CLI_USAGE".to_string(),
            message: message.into(),
        }
    }

    /// Returns the structured error code
    pub fn code_str(&self) -> &str {
        &self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

impl From<DumpError> for CliError {
    fn from(err: DumpError) -> Self {
        Self {
            code: err.code().as_str().to_string(),
            message: err.message().to_string(),
        }
    }
}

impl From<RestoreError> for CliError {
    fn from(err: RestoreError) -> Self {
        Self {
            code: err.code().as_str().to_string(),
            message: err.message().to_string(),
        }
    }
}

impl From<ArchiveError> for CliError {
    fn from(err: ArchiveError) -> Self {
        Self {
            code: err.code().as_str().to_string(),
            message: err.message().to_string(),
        }
    }
}
