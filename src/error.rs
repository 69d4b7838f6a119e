//! Error types for facade operations.

use thiserror::Error;

/// Result type for facade operations.
pub type FacadeResult<T> = Result<T, FacadeError>;

/// Fixed messages for arguments the facade checks before delegating.
pub mod messages {
    /// A collection-scoped call was given an empty collection name.
    pub const COLLECTION_NAME_EMPTY: &str = "collection names cannot be empty";
    /// `insert_many` without a `docs` sequence.
    pub const DOCS_NOT_SEQUENCE: &str = "docs parameter must be an array of documents";
    /// `insert_many` with an empty `docs` sequence.
    pub const DOCS_EMPTY: &str = "docs parameter must not be empty";
    /// `update_many` without a filter.
    pub const SELECTOR_INVALID: &str = "selector must be a valid object";
    /// Update document without any `$` operator.
    pub const UPDATE_NO_ATOMIC: &str =
        "The update operation document must contain at least one atomic operator.";
    /// Replacement document containing `$` operators.
    pub const REPLACEMENT_HAS_ATOMIC: &str =
        "Replacement document must not contain atomic operators";
    /// Missing filter on `delete_many` and the `find_one_and_*` family.
    pub const FILTER_NOT_OBJECT: &str = "filter parameter must be an object";
    /// Missing update on `find_one_and_update`.
    pub const UPDATE_NOT_OBJECT: &str = "update parameter must be an object";
    /// Missing replacement on `find_one_and_replace`.
    pub const REPLACEMENT_NOT_OBJECT: &str = "replacement parameter must be an object";
    /// `distinct` without a key.
    pub const DISTINCT_KEY_MISSING: &str =
        "\"key\" had the wrong type. Expected string, found null";
    /// `create_index` whose key pattern resolves to no keys.
    pub const INDEX_KEYS_EMPTY: &str = "Index keys cannot be empty.";
    /// `create_collection` without a name.
    pub const COLLECTION_NAME_MISSING: &str = "must pass name of collection to create";
    /// `aggregate` without a pipeline.
    pub const PIPELINE_NOT_SEQUENCE: &str = "pipeline parameter must be an array of stages";
    /// Pipeline stage with zero or several top-level fields.
    pub const PIPELINE_STAGE_SHAPE: &str =
        "A pipeline stage specification object must contain exactly one field.";
}

/// Broad category of a [`FacadeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The facade rejected an argument before delegating.
    Argument,
    /// The driver or server rejected the operation.
    Operation,
    /// The client is not connected, is closed, or the server is unreachable.
    Connection,
    /// The configuration is invalid.
    Config,
}

/// Errors that can occur during facade operations.
#[derive(Error, Debug)]
pub enum FacadeError {
    /// A required argument was missing or malformed.
    #[error("{0}")]
    Argument(String),

    /// MongoDB driver error, passed through unchanged.
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    /// Server-style rejection raised by a driver other than MongoDB.
    #[error("{message}")]
    Server {
        /// Server error code, when one applies.
        code: Option<i32>,
        /// Diagnostic text.
        message: String,
    },

    /// BSON serialization error.
    #[error("bson error: {0}")]
    Bson(#[from] bson::ser::Error),

    /// BSON deserialization error.
    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation issued before `connect`.
    #[error("client is not connected")]
    NotConnected,

    /// Operation issued after `close`.
    #[error("client is closed")]
    Closed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FacadeError {
    /// Create an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Create a server error without a code.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            code: None,
            message: message.into(),
        }
    }

    /// Create a server error with a code.
    pub fn server_code(code: i32, message: impl Into<String>) -> Self {
        Self::Server {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Argument(_) => ErrorKind::Argument,
            Self::Driver(_) | Self::Server { .. } | Self::Bson(_) | Self::BsonDe(_) => {
                ErrorKind::Operation
            }
            Self::Connection(_) | Self::NotConnected | Self::Closed => ErrorKind::Connection,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Check if the facade rejected an argument.
    pub fn is_argument(&self) -> bool {
        self.kind() == ErrorKind::Argument
    }

    /// Check if this is a connection or lifecycle error.
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Server error code, if the rejection carried one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Server { code, .. } => *code,
            Self::Driver(e) => match e.kind.as_ref() {
                mongodb::error::ErrorKind::Command(cmd) => Some(cmd.code),
                mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(
                    we,
                )) => Some(we.code),
                _ => None,
            },
            _ => None,
        }
    }
}
