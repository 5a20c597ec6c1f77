//! The `error` module defines the error type shared by every layer of `pullsub`.
//!
//! All fallible operations return [`Result`]. Each variant carries the key or
//! name that failed so callers can report it without extra context, and
//! [`Error::kind`] folds the variants into the small set of conditions the
//! transport maps onto status codes.

use thiserror::Error;

/// Boxed backend error carried by [`Error::Storage`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("ack id not found: {0}")]
    AckIdNotFound(String),

    #[error("topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("subscription already exists: {0}")]
    SubscriptionAlreadyExists(String),

    #[error("invalid push endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no readable message")]
    EmptyMessage,

    #[error("failed to decode value at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode value at {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage {op} failed for {key}: {source}")]
    Storage {
        op: &'static str,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("push request failed: {0}")]
    Push(#[from] reqwest::Error),

    #[error("push endpoint {endpoint} answered {status}")]
    PushRejected { endpoint: String, status: u16 },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`Error`] used at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    EmptyBacklog,
    DataIntegrity,
    StorageUnavailable,
    /// Failures outside the broker's data path: push delivery,
    /// configuration and I/O.
    Internal,
}

impl ErrorKind {
    /// HTTP-style status code reported to clients.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound | ErrorKind::EmptyBacklog => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::DataIntegrity | ErrorKind::StorageUnavailable | ErrorKind::Internal => 500,
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TopicNotFound(_)
            | Error::SubscriptionNotFound(_)
            | Error::MessageNotFound(_)
            | Error::AckIdNotFound(_) => ErrorKind::NotFound,
            Error::TopicAlreadyExists(_) | Error::SubscriptionAlreadyExists(_) => {
                ErrorKind::AlreadyExists
            }
            Error::InvalidEndpoint { .. } | Error::InvalidArgument(_) => ErrorKind::InvalidInput,
            Error::EmptyMessage => ErrorKind::EmptyBacklog,
            Error::Decode { .. } | Error::Encode { .. } => ErrorKind::DataIntegrity,
            Error::Storage { .. } => ErrorKind::StorageUnavailable,
            Error::Push(_) | Error::PushRejected { .. } | Error::Config(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn storage(
        op: &'static str,
        key: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Storage {
            op,
            key: key.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
