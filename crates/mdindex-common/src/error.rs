//! Error types for mdindex
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for mdindex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for mdindex
#[derive(Debug, Error)]
pub enum Error {
    // Document errors
    #[error("unsupported document kind: {0}")]
    UnsupportedDocumentKind(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("document has no identifier")]
    MissingIdentifier,

    // Store errors
    #[error("store error: {0}")]
    Store(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a malformed document error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Check if this is a retryable error
    ///
    /// A failed batch is never partially visible, so the whole `update`
    /// can simply be submitted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Io(_))
    }

    /// Check if this error rejects a single document rather than the store
    #[must_use]
    pub fn is_document_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedDocumentKind(_) | Self::MalformedDocument(_) | Self::MissingIdentifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::StoreUnavailable("locked".into()).is_retryable());
        assert!(!Error::UnsupportedDocumentKind("x".into()).is_retryable());
        assert!(!Error::store("corrupt").is_retryable());
        assert!(!Error::Configuration("bad".into()).is_retryable());
    }

    #[test]
    fn test_document_rejection() {
        assert!(Error::UnsupportedDocumentKind("Foo".into()).is_document_rejection());
        assert!(Error::malformed("eof").is_document_rejection());
        assert!(!Error::store("x").is_document_rejection());
    }

    #[test]
    fn test_error_display() {
        let e = Error::UnsupportedDocumentKind("{urn:x}Foo".into());
        assert_eq!(e.to_string(), "unsupported document kind: {urn:x}Foo");
    }
}
