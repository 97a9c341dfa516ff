//! # sphinx-protocol
//!
//! Wire protocol implementation for the Sphinx `searchd` daemon.
//!
//! This crate provides:
//! - Request framing and reply header parsing (big-endian, length prefixed)
//! - `QuerySpec`, the incrementally built search request
//! - Typed results for search, excerpts, keywords, updates and status
//! - A bounds-checked payload reader so truncated replies surface as errors

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod query;
pub mod wire;

pub use codec::{Decoder, Encoder, ExcerptsRequest, KeywordsRequest, UpdateRequest};
pub use error::{ProtocolError, SearchdStatus};
pub use frame::{Command, Reply, ReplyBody, ReplyHeader, RequestFrame, REPLY_HEADER_SIZE};
pub use message::{
    AttrSchema, AttrType, AttrValue, ExcerptOptions, KeywordInfo, Match, QueryOutcome,
    ResultSet, SearchFailure, StatusRow, UpdateValues, WordStat,
};
pub use query::{
    AttrOverride, Filter, GeoAnchor, GroupFunc, MatchMode, QuerySpec, RankingMode, SearchQuery,
    SortMode,
};

/// Handshake version exchanged right after the TCP connect.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default searchd port.
pub const DEFAULT_PORT: u16 = 9312;

/// Maximum reply body accepted from the server (64 MiB).
pub const MAX_REPLY_SIZE: u32 = 64 * 1024 * 1024;

/// Escapes characters that carry meaning in the extended query syntax.
pub fn escape_string(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() * 2);
    for c in input.chars() {
        if matches!(
            c,
            '(' | ')' | '|' | '-' | '!' | '@' | '~' | '"' | '&' | '/' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
