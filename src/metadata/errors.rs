//! Metadata error types
//!
//! Metadata files and index specs fail closed: a file that cannot be
//! parsed, a spec missing its key or name, or an index the target server
//! version cannot accept all stop the collection before anything is
//! written.

use std::fmt;

/// Metadata error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataErrorCode {
    /// Metadata file is not valid extended JSON
    DvMetadataJson,
    /// Metadata is missing a required field
    DvMetadataMissingField,
    /// An index spec lacks a key pattern or name
    DvMetadataIndex,
    /// Fully-qualified index name exceeds the pre-4.2 server limit
    DvMetadataIndexName,
    /// Metadata `type` field is not a known collection kind
    DvMetadataType,
}

impl MetadataErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataErrorCode::DvMetadataJson => "DV_METADATA_JSON",
            MetadataErrorCode::DvMetadataMissingField => "DV_METADATA_MISSING_FIELD",
            MetadataErrorCode::DvMetadataIndex => "DV_METADATA_INDEX",
            MetadataErrorCode::DvMetadataIndexName => "DV_METADATA_INDEX_NAME",
            MetadataErrorCode::DvMetadataType => "DV_METADATA_TYPE",
        }
    }
}

impl fmt::Display for MetadataErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Collection metadata and index spec error with context
#[derive(Debug)]
pub struct MetadataError {
    code: MetadataErrorCode,
    message: String,
}

impl MetadataError {
    fn new(code: MetadataErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Metadata file is not valid extended JSON
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::new(
            MetadataErrorCode::DvMetadataJson,
            format!("invalid metadata JSON: {}", message.into()),
        )
    }

    /// Metadata is missing a required field
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            MetadataErrorCode::DvMetadataMissingField,
            format!("metadata missing required field '{}'", field),
        )
    }

    /// An index spec lacks a key pattern or name
    pub fn invalid_index(message: impl Into<String>) -> Self {
        Self::new(
            MetadataErrorCode::DvMetadataIndex,
            format!("invalid index spec: {}", message.into()),
        )
    }

    /// Fully-qualified index name exceeds the pre-4.2 server limit
    pub fn index_name_too_long(name: &str, len: usize, limit: usize) -> Self {
        Self::new(
            MetadataErrorCode::DvMetadataIndexName,
            format!(
                "cannot restore index '{}': fully-qualified name is {} bytes \
                 (max is {} on this server version)",
                name, len, limit
            ),
        )
    }

    /// Metadata `type` field is not a known collection kind
    pub fn unknown_collection_type(kind: &str) -> Self {
        Self::new(
            MetadataErrorCode::DvMetadataType,
            format!("unknown collection type '{}' in metadata", kind),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> MetadataErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for MetadataError {}

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            MetadataError::invalid_json("bad").code().as_str(),
            "DV_METADATA_JSON"
        );
        assert_eq!(
            MetadataError::missing_field("collectionName").code().as_str(),
            "DV_METADATA_MISSING_FIELD"
        );
        assert_eq!(
            MetadataError::invalid_index("missing key").code().as_str(),
            "DV_METADATA_INDEX"
        );
        assert_eq!(
            MetadataError::index_name_too_long("n", 140, 127).code().as_str(),
            "DV_METADATA_INDEX_NAME"
        );
        assert_eq!(
            MetadataError::unknown_collection_type("graph").code().as_str(),
            "DV_METADATA_TYPE"
        );
    }

    #[test]
    fn test_display_carries_context() {
        let err = MetadataError::index_name_too_long("scores_long", 140, 127);
        let display = format!("{}", err);
        assert!(display.contains("DV_METADATA_INDEX_NAME"));
        assert!(display.contains("scores_long"));
        assert!(display.contains("140"));
        assert!(display.contains("127"));
    }
}
