//! Error types for the document mapping layer.
//!
//! Errors are grouped by family: field validation, schema registration, client-visible
//! request errors, document misuse, bulk writes, store backends and configuration. Every
//! family folds into [`OdmError`].

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all document operations.
#[derive(Error, Debug)]
pub enum OdmError {
    /// Field-level validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Schema registration errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Client-visible request errors
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Document instance errors
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Bulk write errors
    #[error(transparent)]
    Bulk(#[from] BulkError),

    /// Store backend errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl OdmError {
    /// Returns the HTTP status a serving layer should answer with, if this error is
    /// client-visible.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            OdmError::Request(err) => Some(err.status_code()),
            OdmError::Validation(_) => Some(400),
            _ => None,
        }
    }

    /// Returns true for bad-request errors.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, OdmError::Request(RequestError::BadRequest { .. }))
    }

    /// Returns true for not-found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OdmError::Request(RequestError::NotFound { .. }))
    }
}

/// Errors raised while coercing a raw value into a typed field value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("could not parse {kind} from the value ({value}) for field '{field}'")]
    InvalidValue {
        field: String,
        kind: &'static str,
        value: String,
    },

    #[error("field '{field}' holds a single reference, got {count}")]
    Cardinality { field: String, count: usize },
}

/// Errors raised while registering document classes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("document class '{class}' is not registered")]
    UnknownClass { class: String },

    #[error("field '{class}.{field}' references unknown document class '{target}'")]
    UnknownTarget {
        class: String,
        field: String,
        target: String,
    },

    #[error("document class '{class}' must declare exactly one primary key, found {count}")]
    PrimaryKey { class: String, count: usize },

    #[error("primary key '{class}.{field}' cannot be a reference")]
    ReferencePrimaryKey { class: String, field: String },

    #[error("document class '{class}' declares field '{field}' more than once")]
    DuplicateField { class: String, field: String },

    #[error(
        "inverse field '{class}.{field}' already exists and does not point back to '{expected}'"
    )]
    ConflictingInverse {
        class: String,
        field: String,
        expected: String,
    },
}

/// Errors surfaced to clients of a serving layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The request is malformed (HTTP 400).
    #[error("{message}")]
    BadRequest { message: String },

    /// Nothing matched the request (HTTP 404).
    #[error("{message}")]
    NotFound { message: String },
}

impl RequestError {
    /// Creates a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        RequestError::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        RequestError::NotFound {
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::BadRequest { .. } => 400,
            RequestError::NotFound { .. } => 404,
        }
    }
}

/// Errors caused by misuse of a document instance.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("{field} is read-only")]
    ReadOnly { field: String },

    #[error("'{class}' document without a primary key is unhashable")]
    Unhashable { class: String },

    #[error("'{class}' document has not been persisted yet")]
    NotPersisted { class: String },

    #[error("'{class}' object does not have field '{field}'")]
    UnknownField { class: String, field: String },

    #[error("'{class}.{field}' is not a relationship field")]
    NotRelationship { class: String, field: String },

    #[error("'{class}.{field}' is a relationship field and needs related documents or keys")]
    RelationshipField { class: String, field: String },
}

/// Errors returned by a bulk write.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BulkError {
    #[error("errors happened when executing Elasticsearch actions: {}", errors.join("; "))]
    Failed { executed: usize, errors: Vec<String> },
}

/// Errors originating from the search-index store.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The index or document does not exist.
    #[error("{backend_name}: not found: {target}")]
    NotFound {
        backend_name: String,
        target: String,
    },

    /// The store rejected the query shape or an identifier of the wrong type.
    #[error("{backend_name}: bad query: {message}")]
    BadQuery {
        backend_name: String,
        message: String,
    },

    /// Connection to the store failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Internal store error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Errors raised while reading settings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing setting '{key}'")]
    Missing { key: String },

    #[error("invalid setting '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// Result type alias for document operations.
pub type OdmResult<T> = Result<T, OdmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_status_codes() {
        let err: OdmError = RequestError::bad_request("nope").into();
        assert_eq!(err.status_code(), Some(400));
        assert!(err.is_bad_request());

        let err: OdmError = RequestError::not_found("gone").into();
        assert_eq!(err.status_code(), Some(404));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_bulk_error_lists_every_message() {
        let err = BulkError::Failed {
            executed: 1,
            errors: vec!["first failed".to_string(), "second failed".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("first failed"));
        assert!(message.contains("second failed"));
    }

    #[test]
    fn test_backend_error_not_client_visible() {
        let err: OdmError = BackendError::ConnectionFailed {
            backend_name: "memory".to_string(),
            message: "down".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), None);
    }
}
