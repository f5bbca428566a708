//! Error types for the assistant client.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures while talking to the assistant backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("server returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Status { status: u16, detail: Option<String> },

    /// The request could not be sent or the connection failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading the response body failed after the stream was established.
    #[error("stream read failed: {0}")]
    Stream(String),

    /// A single-shot response body could not be parsed.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The HTTP client could not be built.
    #[error("invalid client configuration: {0}")]
    Client(String),
}

impl TransportError {
    /// The server-provided error detail, if the server sent one.
    pub fn server_detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of the failed response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for message store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Rejected mutations of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No message with this id exists.
    #[error("message not found: {0}")]
    NotFound(String),

    /// Only assistant messages can be mutated.
    #[error("message {0} is not an assistant message")]
    NotAssistant(String),

    /// The assistant message has already been finalized.
    #[error("message {0} is already complete")]
    AlreadyComplete(String),
}

/// Errors from the message-sending handler.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// Empty or whitespace-only messages are not dispatched.
    #[error("message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors while locating or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory")]
    NoConfigDir,

    #[error("expanding path {path}: {message}")]
    Expand { path: String, message: String },

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing default config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("loading config: {0}")]
    Load(#[from] config::ConfigError),
}
