//! Catalog error types
//!
//! Namespace parsing, name escaping, and rename-pattern validation all
//! fail before any I/O; these errors feed the validation path of both
//! tools.

use std::fmt;

/// Catalog error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogErrorCode {
    /// Namespace string could not be split into database and collection
    DvCatalogNamespace,
    /// A bucket collection was named directly
    DvCatalogBucket,
    /// Escaped file stem could not be decoded back to a collection name
    DvCatalogEscape,
    /// Rename pattern pair has mismatched wildcard counts
    DvCatalogRename,
}

impl CatalogErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogErrorCode::DvCatalogNamespace => "DV_CATALOG_NAMESPACE",
            CatalogErrorCode::DvCatalogBucket => "DV_CATALOG_BUCKET",
            CatalogErrorCode::DvCatalogEscape => "DV_CATALOG_ESCAPE",
            CatalogErrorCode::DvCatalogRename => "DV_CATALOG_RENAME",
        }
    }
}

impl fmt::Display for CatalogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Namespace and name-encoding error with context
#[derive(Debug, Clone)]
pub struct CatalogError {
    code: CatalogErrorCode,
    message: String,
}

impl CatalogError {
    fn new(code: CatalogErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Namespace string has no database/collection separator
    pub fn invalid_namespace(ns: &str) -> Self {
        Self::new(
            CatalogErrorCode::DvCatalogNamespace,
            format!("invalid namespace '{}': expected <db>.<collection>", ns),
        )
    }

    /// Bucket collections back timeseries collections and are managed by
    /// the tool, never named directly
    pub fn bucket_specified(coll: &str) -> Self {
        Self::new(
            CatalogErrorCode::DvCatalogBucket,
            format!(
                "cannot specify bucket collection '{}' directly; \
                 use the timeseries collection name",
                coll
            ),
        )
    }

    /// Escaped file name could not be decoded back to a collection name
    pub fn invalid_escape(escaped: &str, reason: &str) -> Self {
        Self::new(
            CatalogErrorCode::DvCatalogEscape,
            format!("invalid escaped collection name '{}': {}", escaped, reason),
        )
    }

    /// Rename pattern pair has mismatched wildcard counts
    pub fn wildcard_mismatch(from: &str, to: &str) -> Self {
        Self::new(
            CatalogErrorCode::DvCatalogRename,
            format!(
                "rename patterns '{}' and '{}' have different wildcard counts",
                from, to
            ),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> CatalogErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CatalogError {}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            CatalogError::invalid_namespace("x").code().as_str(),
            "DV_CATALOG_NAMESPACE"
        );
        assert_eq!(
            CatalogError::bucket_specified("system.buckets.x").code().as_str(),
            "DV_CATALOG_BUCKET"
        );
        assert_eq!(
            CatalogError::invalid_escape("a%", "truncated").code().as_str(),
            "DV_CATALOG_ESCAPE"
        );
        assert_eq!(
            CatalogError::wildcard_mismatch("a.*", "b.c").code().as_str(),
            "DV_CATALOG_RENAME"
        );
    }

    #[test]
    fn test_display_carries_context() {
        let err = CatalogError::invalid_namespace("nodot");
        let display = format!("{}", err);
        assert!(display.contains("DV_CATALOG_NAMESPACE"));
        assert!(display.contains("nodot"));

        let err = CatalogError::wildcard_mismatch("a.*", "b.c");
        assert!(format!("{}", err).contains("a.*"));
    }
}
