//! Request and reply framing.
//!
//! Request layout (8 bytes header + body):
//!
//! ```text
//! +---------+---------+----------+
//! | command | version | body_len |  body
//! | 2 bytes | 2 bytes | 4 bytes  |  body_len bytes
//! +---------+---------+----------+
//! ```
//!
//! Reply layout (8 bytes header + body):
//!
//! ```text
//! +---------+---------+----------+
//! | status  | version | body_len |  body
//! | 2 bytes | 2 bytes | 4 bytes  |  body_len bytes
//! +---------+---------+----------+
//! ```
//!
//! A `WARNING` reply body starts with the warning string, followed by the
//! regular payload. `ERROR` and `RETRY` bodies carry only the message.

use crate::error::{ProtocolError, SearchdStatus};
use crate::message::SearchFailure;
use crate::wire::{PayloadReader, WireWrite};
use crate::MAX_REPLY_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed request header in bytes (2+2+4 = 8).
pub const REQUEST_HEADER_SIZE: usize = 8;

/// Size of the fixed reply header in bytes (2+2+4 = 8).
pub const REPLY_HEADER_SIZE: usize = 8;

/// searchd commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Search,
    Excerpt,
    Update,
    Keywords,
    Persist,
    Status,
}

impl Command {
    pub fn code(&self) -> u16 {
        match self {
            Command::Search => 0,
            Command::Excerpt => 1,
            Command::Update => 2,
            Command::Keywords => 3,
            Command::Persist => 4,
            Command::Status => 5,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Command::Search),
            1 => Some(Command::Excerpt),
            2 => Some(Command::Update),
            3 => Some(Command::Keywords),
            4 => Some(Command::Persist),
            5 => Some(Command::Status),
            _ => None,
        }
    }

    /// Command version this client speaks.
    pub fn version(&self) -> u16 {
        match self {
            Command::Search => 0x117,
            Command::Excerpt => 0x100,
            Command::Update => 0x102,
            Command::Keywords => 0x100,
            Command::Persist => 0,
            Command::Status => 0x100,
        }
    }

    /// Whether searchd answers this command.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::Persist)
    }
}

/// A request ready to be written to the socket.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    pub command: Command,
    pub version: u16,
    pub body: Bytes,
}

impl RequestFrame {
    /// Creates a frame at the client's version for `command`.
    pub fn new(command: Command, body: Bytes) -> Self {
        Self {
            command,
            version: command.version(),
            body,
        }
    }

    /// Encodes the header and body.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let body_len = self.body.len();
        if body_len > MAX_REPLY_SIZE as usize {
            return Err(ProtocolError::InvalidRequest(format!(
                "request body of {} bytes exceeds {} bytes",
                body_len, MAX_REPLY_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + body_len);
        buf.put_u16(self.command.code());
        buf.put_u16(self.version);
        buf.put_u32(body_len as u32);
        buf.put_slice(&self.body);
        Ok(buf)
    }

    /// Decodes a request from bytes.
    ///
    /// Returns `Ok(None)` if more data is needed.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < REQUEST_HEADER_SIZE {
            return Ok(None);
        }

        let code = u16::from_be_bytes([buf[0], buf[1]]);
        let command = Command::from_code(code).ok_or_else(|| {
            ProtocolError::InvalidRequest(format!("unknown command {}", code))
        })?;
        let version = u16::from_be_bytes([buf[2], buf[3]]);
        let body_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

        if buf.len() < REQUEST_HEADER_SIZE + body_len {
            return Ok(None);
        }

        buf.advance(REQUEST_HEADER_SIZE);
        let body = buf.split_to(body_len).freeze();

        Ok(Some(Self {
            command,
            version,
            body,
        }))
    }
}

/// Parsed reply header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub status: SearchdStatus,
    pub version: u16,
    pub body_len: u32,
}

impl ReplyHeader {
    pub fn decode(header: &[u8; REPLY_HEADER_SIZE]) -> Result<Self, ProtocolError> {
        let status = SearchdStatus::from_code(u16::from_be_bytes([header[0], header[1]]).into())?;
        let version = u16::from_be_bytes([header[2], header[3]]);
        let body_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        if body_len > MAX_REPLY_SIZE {
            return Err(ProtocolError::ReplyTooLarge {
                size: body_len,
                max: MAX_REPLY_SIZE,
            });
        }

        Ok(Self {
            status,
            version,
            body_len,
        })
    }
}

/// What the caller gets out of a reply once its status has been interpreted.
#[derive(Debug, Clone)]
pub enum ReplyBody {
    /// Command succeeded; `warning` may still be set.
    Success {
        payload: Bytes,
        warning: Option<String>,
    },
    /// searchd refused the command.
    Failure(SearchFailure),
}

/// A complete reply: header fields plus the raw body.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: SearchdStatus,
    pub version: u16,
    pub body: Bytes,
}

impl Reply {
    pub fn from_parts(header: ReplyHeader, body: Bytes) -> Self {
        Self {
            status: header.status,
            version: header.version,
            body,
        }
    }

    /// Builds a successful reply for `command`.
    pub fn ok(command: Command, payload: Bytes) -> Self {
        Self {
            status: SearchdStatus::Ok,
            version: command.version(),
            body: payload,
        }
    }

    /// Builds a successful reply carrying a warning ahead of the payload.
    pub fn warning(command: Command, warning: &str, payload: &[u8]) -> Self {
        let mut body = BytesMut::with_capacity(4 + warning.len() + payload.len());
        body.put_str(warning);
        body.put_slice(payload);
        Self {
            status: SearchdStatus::Warning,
            version: command.version(),
            body: body.freeze(),
        }
    }

    /// Builds an `ERROR` or `RETRY` reply.
    pub fn failure(command: Command, status: SearchdStatus, message: &str) -> Self {
        let mut body = BytesMut::with_capacity(4 + message.len());
        body.put_str(message);
        Self {
            status,
            version: command.version(),
            body: body.freeze(),
        }
    }

    /// Encodes the reply header and body.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(REPLY_HEADER_SIZE + self.body.len());
        buf.put_u16(self.status.code());
        buf.put_u16(self.version);
        buf.put_u32(self.body.len() as u32);
        buf.put_slice(&self.body);
        buf
    }

    /// Decodes a reply from bytes.
    ///
    /// Returns `Ok(None)` if more data is needed.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < REPLY_HEADER_SIZE {
            return Ok(None);
        }

        let mut raw = [0u8; REPLY_HEADER_SIZE];
        raw.copy_from_slice(&buf[..REPLY_HEADER_SIZE]);
        let header = ReplyHeader::decode(&raw)?;

        let total_len = REPLY_HEADER_SIZE + header.body_len as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(REPLY_HEADER_SIZE);
        let body = buf.split_to(header.body_len as usize).freeze();
        Ok(Some(Self::from_parts(header, body)))
    }

    /// Interprets the reply status for a reply to `command`.
    pub fn into_body(self, command: Command) -> Result<ReplyBody, ProtocolError> {
        if self.body.is_empty() {
            return Err(ProtocolError::EmptyReply);
        }

        let mut reader = PayloadReader::new(&self.body);
        let (payload, mut warning) = match self.status {
            SearchdStatus::Ok => (self.body.clone(), None),
            SearchdStatus::Warning => {
                let warning = reader.string("warning")?;
                let consumed = self.body.len() - reader.remaining();
                (self.body.slice(consumed..), Some(warning))
            }
            SearchdStatus::Error => {
                return Ok(ReplyBody::Failure(SearchFailure {
                    status: SearchdStatus::Error,
                    message: format!("searchd error: {}", reader.string("error message")?),
                }));
            }
            SearchdStatus::Retry => {
                return Ok(ReplyBody::Failure(SearchFailure {
                    status: SearchdStatus::Retry,
                    message: format!(
                        "temporary searchd error: {}",
                        reader.string("error message")?
                    ),
                }));
            }
        };

        let ours = command.version();
        if self.version < ours {
            let note = format!(
                "searchd command v.{}.{} older than client's v.{}.{}, some options might not work",
                self.version >> 8,
                self.version & 0xff,
                ours >> 8,
                ours & 0xff
            );
            warning = Some(match warning {
                Some(existing) => format!("{}; {}", existing, note),
                None => note,
            });
        }

        Ok(ReplyBody::Success { payload, warning })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_layout() {
        let frame = RequestFrame::new(Command::Status, Bytes::from_static(b"\x00\x00\x00\x01"));
        let encoded = frame.encode().unwrap();
        assert_eq!(
            &encoded[..],
            b"\x00\x05\x01\x00\x00\x00\x00\x04\x00\x00\x00\x01"
        );
    }

    #[test]
    fn test_request_roundtrip() {
        let frame = RequestFrame::new(Command::Keywords, Bytes::from_static(b"payload"));
        let mut buf = frame.encode().unwrap();
        let decoded = RequestFrame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.command, Command::Keywords);
        assert_eq!(decoded.version, 0x100);
        assert_eq!(&decoded.body[..], b"payload");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_request() {
        let frame = RequestFrame::new(Command::Search, Bytes::from_static(b"0123456789"));
        let encoded = frame.encode().unwrap();
        let mut buf = BytesMut::from(&encoded[..12]);
        assert!(RequestFrame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_reply_header_too_large() {
        let raw = [0u8, 0, 1, 0, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            ReplyHeader::decode(&raw),
            Err(ProtocolError::ReplyTooLarge { .. })
        ));
    }

    #[test]
    fn test_reply_unknown_status() {
        let raw = [0u8, 9, 1, 0, 0, 0, 0, 4];
        assert!(matches!(
            ReplyHeader::decode(&raw),
            Err(ProtocolError::UnknownStatus(9))
        ));
    }

    #[test]
    fn test_ok_reply_body() {
        let reply = Reply::ok(Command::Update, Bytes::from_static(b"\x00\x00\x00\x02"));
        match reply.into_body(Command::Update).unwrap() {
            ReplyBody::Success { payload, warning } => {
                assert_eq!(&payload[..], b"\x00\x00\x00\x02");
                assert!(warning.is_none());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_warning_reply_strips_message() {
        let reply = Reply::warning(Command::Keywords, "index is stale", b"rest");
        let mut buf = reply.encode();
        let decoded = Reply::decode(&mut buf).unwrap().unwrap();

        match decoded.into_body(Command::Keywords).unwrap() {
            ReplyBody::Success { payload, warning } => {
                assert_eq!(&payload[..], b"rest");
                assert_eq!(warning.as_deref(), Some("index is stale"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_error_reply() {
        let reply = Reply::failure(Command::Search, SearchdStatus::Error, "unknown index");
        match reply.into_body(Command::Search).unwrap() {
            ReplyBody::Failure(failure) => {
                assert_eq!(failure.status, SearchdStatus::Error);
                assert_eq!(failure.message, "searchd error: unknown index");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_reply() {
        let reply = Reply::failure(Command::Search, SearchdStatus::Retry, "busy");
        match reply.into_body(Command::Search).unwrap() {
            ReplyBody::Failure(failure) => {
                assert!(failure.status.is_retryable());
                assert_eq!(failure.message, "temporary searchd error: busy");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_older_server_version_warns() {
        let mut reply = Reply::ok(Command::Search, Bytes::from_static(b"xxxx"));
        reply.version = 0x113;
        match reply.into_body(Command::Search).unwrap() {
            ReplyBody::Success { warning, .. } => {
                let warning = warning.unwrap();
                assert!(warning.contains("v.1.19"));
                assert!(warning.contains("v.1.23"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_reply_is_malformed() {
        let reply = Reply::ok(Command::Status, Bytes::new());
        assert!(matches!(
            reply.into_body(Command::Status),
            Err(ProtocolError::EmptyReply)
        ));
    }

    #[test]
    fn test_partial_reply() {
        let reply = Reply::ok(Command::Status, Bytes::from_static(b"abcdef"));
        let encoded = reply.encode();
        let mut buf = BytesMut::from(&encoded[..10]);
        assert!(Reply::decode(&mut buf).unwrap().is_none());
    }
}
