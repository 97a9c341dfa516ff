//! Primitive wire encoding.
//!
//! Every integer is big-endian. Strings are a `u32` byte length followed by
//! the raw bytes. Floats travel as their IEEE-754 bit pattern in a `u32`.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// Writes length-prefixed strings and fixed-width fields into a request body.
pub trait WireWrite {
    fn put_str(&mut self, value: &str);
    fn put_f32_bits(&mut self, value: f32);
    fn put_len(&mut self, len: usize);
}

impl WireWrite for BytesMut {
    fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.put_slice(value.as_bytes());
    }

    fn put_f32_bits(&mut self, value: f32) {
        self.put_u32(value.to_bits());
    }

    fn put_len(&mut self, len: usize) {
        self.put_u32(len as u32);
    }
}

/// Bounds-checked cursor over a reply payload.
///
/// Every read names the field it is reading, so a truncated reply reports
/// exactly where the payload ran out.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.len() < needed {
            return Err(ProtocolError::Truncated {
                field,
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        self.ensure(field, 4)?;
        Ok(self.buf.get_u32())
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64, ProtocolError> {
        self.ensure(field, 8)?;
        Ok(self.buf.get_u64())
    }

    pub fn i64(&mut self, field: &'static str) -> Result<i64, ProtocolError> {
        self.ensure(field, 8)?;
        Ok(self.buf.get_i64())
    }

    pub fn f32(&mut self, field: &'static str) -> Result<f32, ProtocolError> {
        Ok(f32::from_bits(self.u32(field)?))
    }

    /// Reads a `u32` element count and checks that at least `min_item_size`
    /// bytes per element remain, so a corrupt count cannot drive a huge allocation.
    pub fn count(
        &mut self,
        field: &'static str,
        min_item_size: usize,
    ) -> Result<usize, ProtocolError> {
        let count = self.u32(field)? as usize;
        self.ensure(field, count.saturating_mul(min_item_size))?;
        Ok(count)
    }

    pub fn bytes(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.ensure(field, len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let len = self.u32(field)? as usize;
        let raw = self.bytes(field, len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
    }

    /// Reads a length-prefixed string, replacing invalid UTF-8 with U+FFFD.
    ///
    /// Text built from document content (excerpts, keywords) arrives in the
    /// index charset, which may be a single-byte encoding.
    pub fn string_lossy(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let len = self.u32(field)? as usize;
        let raw = self.bytes(field, len)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout() {
        let mut buf = BytesMut::new();
        buf.put_str("abc");
        assert_eq!(&buf[..], b"\x00\x00\x00\x03abc");

        let mut reader = PayloadReader::new(&buf);
        assert_eq!(reader.string("s").unwrap(), "abc");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_float_bits() {
        let mut buf = BytesMut::new();
        buf.put_f32_bits(1.5);
        let mut reader = PayloadReader::new(&buf);
        assert_eq!(reader.f32("f").unwrap(), 1.5);
    }

    #[test]
    fn test_truncated_read_names_field() {
        let mut reader = PayloadReader::new(&[0, 0, 1]);
        match reader.u32("total_found") {
            Err(ProtocolError::Truncated {
                field,
                needed,
                remaining,
            }) => {
                assert_eq!(field, "total_found");
                assert_eq!(needed, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_string_length_past_end() {
        // Claims 10 bytes, carries 2
        let mut reader = PayloadReader::new(b"\x00\x00\x00\x0aab");
        assert!(matches!(
            reader.string("word"),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_count_guards_allocation() {
        let mut reader = PayloadReader::new(b"\xff\xff\xff\xff");
        assert!(reader.count("matches", 12).is_err());
    }

    #[test]
    fn test_string_lossy() {
        // cp1251 "\xcf\xf0\xe8" is not valid UTF-8
        let mut reader = PayloadReader::new(b"\x00\x00\x00\x05<\xcf\xf0\xe8>");
        assert_eq!(reader.string_lossy("excerpt").unwrap(), "<\u{fffd}\u{fffd}\u{fffd}>");
        assert!(reader.is_empty());

        let mut reader = PayloadReader::new(b"\x00\x00\x00\x09");
        assert!(matches!(
            reader.string_lossy("excerpt"),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut reader = PayloadReader::new(b"\x00\x00\x00\x02\xff\xfe");
        assert!(matches!(
            reader.string("excerpt"),
            Err(ProtocolError::InvalidUtf8("excerpt"))
        ));
    }
}
