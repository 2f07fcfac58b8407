use crate::bulk::BulkWriteFailure;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Server error codes reported alongside each failure.
pub mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const FAILED_TO_PARSE: i32 = 9;
    pub const TYPE_MISMATCH: i32 = 14;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const INDEX_NOT_FOUND: i32 = 27;
    pub const PATH_NOT_VIABLE: i32 = 28;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const WRITE_CONCERN_TIMEOUT: i32 = 64;
    pub const IMMUTABLE_FIELD: i32 = 66;
    pub const INVALID_OPTIONS: i32 = 72;
    pub const INVALID_NAMESPACE: i32 = 73;
    pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
    pub const UNSATISFIABLE_WRITE_CONCERN: i32 = 100;
    pub const COMMAND_NOT_FOUND: i32 = 59;
    pub const INTERNAL_ERROR: i32 = 1;
    pub const DUPLICATE_KEY: i32 = 11000;
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not implemented for command: {0}")]
    NotImplemented(String),
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("ns not found: {0}")]
    NamespaceNotFound(String),
    #[error("namespace already exists: {0}")]
    NamespaceExists(String),
    #[error("index not found with name [{0}]")]
    IndexNotFound(String),
    #[error("E11000 duplicate key error collection: {namespace} index: {index} dup key: {key}")]
    DuplicateKey {
        namespace: String,
        index: String,
        key: String,
    },
    #[error("{message}")]
    Operation { code: i32, message: String },
    #[error(transparent)]
    BulkWrite(Box<BulkWriteFailure>),
    #[error("config error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::Operation {
            code: codes::BAD_VALUE,
            message: message.into(),
        }
    }

    pub fn failed_to_parse(message: impl Into<String>) -> Self {
        Self::Operation {
            code: codes::FAILED_TO_PARSE,
            message: message.into(),
        }
    }

    /// The numeric server code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => codes::BAD_VALUE,
            Self::NotImplemented(_) => codes::COMMAND_NOT_FOUND,
            Self::InvalidNamespace(_) => codes::INVALID_NAMESPACE,
            Self::NamespaceNotFound(_) => codes::NAMESPACE_NOT_FOUND,
            Self::NamespaceExists(_) => codes::NAMESPACE_EXISTS,
            Self::IndexNotFound(_) => codes::INDEX_NOT_FOUND,
            Self::DuplicateKey { .. } => codes::DUPLICATE_KEY,
            Self::Operation { code, .. } => *code,
            Self::BulkWrite(failure) => failure
                .write_errors
                .first()
                .map(|e| e.code)
                .or_else(|| failure.write_concern_error.as_ref().map(|e| e.code))
                .unwrap_or(codes::INTERNAL_ERROR),
            Self::Config(_) | Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Errors a store reports against a single write item. These are
    /// collected per item instead of failing the whole command.
    pub fn is_write_error(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. } | Self::Operation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_variant() {
        assert_eq!(CoreError::bad_value("x").code(), codes::BAD_VALUE);
        assert_eq!(CoreError::failed_to_parse("x").code(), codes::FAILED_TO_PARSE);
        assert_eq!(CoreError::IndexNotFound("a_1".into()).code(), codes::INDEX_NOT_FOUND);
        assert_eq!(
            CoreError::NotImplemented("frobnicate".into()).code(),
            codes::COMMAND_NOT_FOUND
        );
    }

    #[test]
    fn only_store_item_failures_are_write_errors() {
        let dup = CoreError::DuplicateKey {
            namespace: "db.c".into(),
            index: "_id_".into(),
            key: "{ _id: 1 }".into(),
        };
        assert!(dup.is_write_error());
        assert!(CoreError::bad_value("unknown operator").is_write_error());
        assert!(!CoreError::InvalidArgument("bad name".into()).is_write_error());
        assert!(!CoreError::InvalidNamespace("db.".into()).is_write_error());
    }

    #[test]
    fn duplicate_key_message() {
        let err = CoreError::DuplicateKey {
            namespace: "test.users".into(),
            index: "email_1".into(),
            key: "{ email: \"a@b\" }".into(),
        };
        assert_eq!(
            err.to_string(),
            "E11000 duplicate key error collection: test.users index: email_1 dup key: { email: \"a@b\" }"
        );
    }
}
