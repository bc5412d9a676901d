use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the index store, analyzer and query engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no index found at {0}")]
    IndexNotFound(PathBuf),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already exists: {0}")]
    DuplicateDocument(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("schema does not match the one persisted with the index: {0}")]
    SchemaMismatch(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("unsupported language code: {0}")]
    InvalidLanguage(String),

    #[error("field not declared in schema: {0}")]
    UnknownField(String),

    #[error("invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("index at {0} is locked by another writer")]
    Locked(PathBuf),

    #[error("query parse error at {position}: {message}")]
    QueryParse { position: usize, message: String },

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Configuration errors are fatal and must not be retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::SchemaMismatch(_)
                | Error::InvalidSchema(_)
                | Error::InvalidLanguage(_)
                | Error::UnknownField(_)
                | Error::InvalidFieldValue { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::IndexNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("/tmp/a.txt".into());
        assert_eq!(err.to_string(), "document not found: /tmp/a.txt");
        let err = Error::QueryParse { position: 3, message: "unbalanced parenthesis".into() };
        assert_eq!(err.to_string(), "query parse error at 3: unbalanced parenthesis");
    }

    #[test]
    fn test_classification() {
        assert!(Error::InvalidLanguage("xx".into()).is_configuration());
        assert!(Error::SchemaMismatch("content".into()).is_configuration());
        assert!(!Error::NotFound("a".into()).is_configuration());
        assert!(Error::NotFound("a".into()).is_not_found());
        assert!(Error::IndexNotFound(PathBuf::from("/x")).is_not_found());
        assert!(!Error::Locked(PathBuf::from("/x")).is_not_found());
    }
}
