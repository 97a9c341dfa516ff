//! Protocol error types and reply status codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol-level errors raised while framing requests or parsing replies.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported searchd protocol version: expected 1+, got {0}")]
    UnsupportedVersion(u32),

    #[error("reply too large: {size} bytes (max {max})")]
    ReplyTooLarge { size: u32, max: u32 },

    #[error("truncated reply: need {needed} bytes for {field}, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("received zero-sized searchd response")]
    EmptyReply,

    #[error("unknown status code {0}")]
    UnknownStatus(u32),

    #[error("unknown attribute type {0:#x}")]
    UnknownAttrType(u32),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("unexpected count for {field}: expected {expected}, got {actual}")]
    CountMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{remaining} unexpected trailing bytes after {field}")]
    TrailingBytes {
        field: &'static str,
        remaining: usize,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProtocolError {
    /// Returns whether this error describes a reply that does not match its framing.
    pub fn is_malformed(&self) -> bool {
        !matches!(
            self,
            ProtocolError::InvalidRequest(_) | ProtocolError::UnsupportedVersion(_)
        )
    }
}

/// Status code carried in every reply header, and per query in search replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchdStatus {
    Ok,
    Error,
    Retry,
    Warning,
}

impl SearchdStatus {
    pub fn code(&self) -> u16 {
        match self {
            SearchdStatus::Ok => 0,
            SearchdStatus::Error => 1,
            SearchdStatus::Retry => 2,
            SearchdStatus::Warning => 3,
        }
    }

    /// Parses a status code; search replies carry it as `u32` per query.
    pub fn from_code(code: u32) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(SearchdStatus::Ok),
            1 => Ok(SearchdStatus::Error),
            2 => Ok(SearchdStatus::Retry),
            3 => Ok(SearchdStatus::Warning),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }

    /// Returns whether the server asked the client to try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchdStatus::Retry)
    }
}

impl fmt::Display for SearchdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchdStatus::Ok => write!(f, "OK"),
            SearchdStatus::Error => write!(f, "ERROR"),
            SearchdStatus::Retry => write!(f, "RETRY"),
            SearchdStatus::Warning => write!(f, "WARNING"),
        }
    }
}
