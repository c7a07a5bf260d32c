//! Intent error types
//!
//! Plan construction fails fast: two intents resolving to one post-rename
//! namespace, or a special stream appearing twice, mean the input cannot
//! be scheduled unambiguously.

use std::fmt;

use crate::catalog::Namespace;

/// Intent error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentErrorCode {
    /// Two intents resolved to the same post-rename namespace
    DvIntentDuplicate,
    /// A special intent slot was filled twice
    DvIntentSpecialSlot,
}

impl IntentErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentErrorCode::DvIntentDuplicate => "DV_INTENT_DUPLICATE",
            IntentErrorCode::DvIntentSpecialSlot => "DV_INTENT_SPECIAL_SLOT",
        }
    }
}

impl fmt::Display for IntentErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plan construction error with context
#[derive(Debug)]
pub struct IntentError {
    code: IntentErrorCode,
    message: String,
}

impl IntentError {
    fn new(code: IntentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Two intents resolved to the same post-rename namespace
    pub fn duplicate_namespace(ns: &Namespace) -> Self {
        Self::new(
            IntentErrorCode::DvIntentDuplicate,
            format!("duplicate intent for namespace {}", ns),
        )
    }

    /// A special intent slot was filled twice
    pub fn duplicate_special(what: &str) -> Self {
        Self::new(
            IntentErrorCode::DvIntentSpecialSlot,
            format!("duplicate {} intent", what),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> IntentErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for IntentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for IntentError {}

/// Result type for intent operations
pub type IntentResult<T> = Result<T, IntentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let ns = Namespace::new("db", "users");
        assert_eq!(
            IntentError::duplicate_namespace(&ns).code().as_str(),
            "DV_INTENT_DUPLICATE"
        );
        assert_eq!(
            IntentError::duplicate_special("users").code().as_str(),
            "DV_INTENT_SPECIAL_SLOT"
        );
    }

    #[test]
    fn test_display_carries_context() {
        let ns = Namespace::new("db", "users");
        let display = format!("{}", IntentError::duplicate_namespace(&ns));
        assert!(display.contains("DV_INTENT_DUPLICATE"));
        assert!(display.contains("db.users"));
    }
}
