//! Client error types.

use sphinx_protocol::{ProtocolError, SearchdStatus};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad or missing server settings, raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timeout")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("already connected")]
    AlreadyConnected,

    /// searchd answered with `ERROR` or `RETRY`; the message carries the prefix.
    #[error("{message}")]
    Server {
        status: SearchdStatus,
        message: String,
    },

    /// The server announced a protocol version older than the client speaks.
    #[error("unsupported searchd protocol version: expected 1+, got {0}")]
    UnsupportedVersion(u32),

    #[error("malformed response: {0}")]
    Protocol(ProtocolError),

    /// The update was accepted but touched fewer documents than requested.
    #[error("partial update: {updated} of {requested} documents updated")]
    PartialUpdate { requested: u32, updated: u32 },
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidRequest(message) => ClientError::InvalidArgument(message),
            ProtocolError::UnsupportedVersion(version) => ClientError::UnsupportedVersion(version),
            other => ClientError::Protocol(other),
        }
    }
}

impl ClientError {
    /// Returns whether the error happened while establishing the connection.
    pub fn is_connect_error(&self) -> bool {
        matches!(self, ClientError::Connect { .. })
    }

    /// Returns whether the same call may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connect { .. } => true,
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::Server { status, .. } => status.is_retryable(),
            _ => false,
        }
    }

    /// Returns whether the server reply did not match its framing.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ClientError::Protocol(err) if err.is_malformed())
    }

    /// Returns whether the connection can no longer be trusted after this error.
    pub(crate) fn poisons_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Timeout
                | ClientError::ConnectionClosed
                | ClientError::Protocol(_)
        )
    }
}
