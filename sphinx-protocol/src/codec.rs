//! Encoder and decoder for searchd commands and replies.
//!
//! `Encoder` builds complete request frames on the client side and reply
//! payloads on the server side. `Decoder` buffers raw socket bytes into
//! frames and parses reply payloads into typed results. The request parsers
//! exist so a server (or a test fake) can read what the client sent.

use crate::error::{ProtocolError, SearchdStatus};
use crate::frame::{Command, Reply, RequestFrame};
use crate::message::{
    AttrSchema, AttrType, AttrValue, ExcerptOptions, KeywordInfo, Match, QueryOutcome, ResultSet,
    SearchFailure, StatusRow, UpdateValues, WordStat,
};
use crate::query::SearchQuery;
use crate::wire::{PayloadReader, WireWrite};
use crate::PROTOCOL_VERSION;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::time::Duration;

/// Excerpt request as searchd receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptsRequest {
    pub index: String,
    pub words: String,
    pub docs: Vec<String>,
    pub options: ExcerptOptions,
}

/// Attribute update request as searchd receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub index: String,
    pub attrs: Vec<String>,
    pub values: UpdateValues,
}

/// Keyword extraction request as searchd receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordsRequest {
    pub query: String,
    pub index: String,
    pub hits: bool,
}

/// Builds request frames and reply payloads.
pub struct Encoder;

impl Encoder {
    /// The four bytes a client sends right after connecting.
    pub fn handshake() -> [u8; 4] {
        PROTOCOL_VERSION.to_be_bytes()
    }

    /// Switches the connection to persistent mode. searchd does not answer.
    pub fn persist() -> Result<BytesMut, ProtocolError> {
        let mut body = BytesMut::with_capacity(4);
        body.put_u32(1);
        RequestFrame::new(Command::Persist, body.freeze()).encode()
    }

    /// Builds a search request from query entries encoded by `QuerySpec::encode`.
    pub fn search(queries: &[Bytes]) -> Result<BytesMut, ProtocolError> {
        if queries.is_empty() {
            return Err(ProtocolError::InvalidRequest(
                "search request needs at least one query".into(),
            ));
        }

        let size: usize = queries.iter().map(|q| q.len()).sum();
        let mut body = BytesMut::with_capacity(4 + size);
        body.put_len(queries.len());
        for query in queries {
            body.put_slice(query);
        }
        RequestFrame::new(Command::Search, body.freeze()).encode()
    }

    pub fn excerpts<S: AsRef<str>>(
        docs: &[S],
        index: &str,
        words: &str,
        options: &ExcerptOptions,
    ) -> Result<BytesMut, ProtocolError> {
        let mut body = BytesMut::with_capacity(256);
        // Mode, always 0
        body.put_u32(0);
        body.put_u32(options.flags());
        body.put_str(index);
        body.put_str(words);
        body.put_str(&options.before_match);
        body.put_str(&options.after_match);
        body.put_str(&options.chunk_separator);
        body.put_u32(options.limit);
        body.put_u32(options.around);

        body.put_len(docs.len());
        for doc in docs {
            body.put_str(doc.as_ref());
        }
        RequestFrame::new(Command::Excerpt, body.freeze()).encode()
    }

    /// Builds an attribute update. Every row must carry one value per attribute.
    pub fn update<S: AsRef<str>>(
        index: &str,
        attrs: &[S],
        values: &UpdateValues,
    ) -> Result<BytesMut, ProtocolError> {
        if attrs.is_empty() {
            return Err(ProtocolError::InvalidRequest(
                "update needs at least one attribute".into(),
            ));
        }
        values.validate(attrs.len())?;

        let mut body = BytesMut::with_capacity(128);
        body.put_str(index);
        body.put_len(attrs.len());
        for attr in attrs {
            body.put_str(attr.as_ref());
            body.put_u32(values.is_multi() as u32);
        }

        body.put_len(values.len());
        match values {
            UpdateValues::Scalar(rows) => {
                for (id, row) in rows {
                    body.put_u64(*id);
                    for value in row {
                        body.put_u32(*value);
                    }
                }
            }
            UpdateValues::Multi(rows) => {
                for (id, row) in rows {
                    body.put_u64(*id);
                    for list in row {
                        body.put_len(list.len());
                        for value in list {
                            body.put_u32(*value);
                        }
                    }
                }
            }
        }
        RequestFrame::new(Command::Update, body.freeze()).encode()
    }

    pub fn keywords(query: &str, index: &str, hits: bool) -> Result<BytesMut, ProtocolError> {
        let mut body = BytesMut::with_capacity(12 + query.len() + index.len());
        body.put_str(query);
        body.put_str(index);
        body.put_u32(hits as u32);
        RequestFrame::new(Command::Keywords, body.freeze()).encode()
    }

    pub fn status() -> Result<BytesMut, ProtocolError> {
        let mut body = BytesMut::with_capacity(4);
        body.put_u32(1);
        RequestFrame::new(Command::Status, body.freeze()).encode()
    }

    /// Encodes the payload of a search reply, one entry per query.
    ///
    /// Attribute values are written in schema order; a match missing an
    /// attribute gets the zero value of its type.
    pub fn search_reply(outcomes: &[QueryOutcome]) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        for outcome in outcomes {
            match outcome {
                Err(failure) => {
                    buf.put_u32(failure.status.code().into());
                    buf.put_str(&failure.message);
                }
                Ok(result) => encode_result_set(&mut buf, result),
            }
        }
        buf.freeze()
    }

    pub fn excerpts_reply<S: AsRef<str>>(excerpts: &[S]) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        for excerpt in excerpts {
            buf.put_str(excerpt.as_ref());
        }
        buf.freeze()
    }

    pub fn update_reply(updated: u32) -> Bytes {
        Bytes::copy_from_slice(&updated.to_be_bytes())
    }

    pub fn keywords_reply(keywords: &[KeywordInfo], hits: bool) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_len(keywords.len());
        for keyword in keywords {
            buf.put_str(&keyword.tokenized);
            buf.put_str(&keyword.normalized);
            if hits {
                buf.put_u32(keyword.docs.unwrap_or(0));
                buf.put_u32(keyword.hits.unwrap_or(0));
            }
        }
        buf.freeze()
    }

    pub fn status_reply(rows: &[StatusRow]) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_len(rows.len());
        buf.put_u32(2);
        for row in rows {
            buf.put_str(&row.label);
            buf.put_str(&row.value);
        }
        buf.freeze()
    }
}

fn encode_result_set(buf: &mut BytesMut, result: &ResultSet) {
    match &result.warning {
        Some(warning) => {
            buf.put_u32(SearchdStatus::Warning.code().into());
            buf.put_str(warning);
        }
        None => buf.put_u32(SearchdStatus::Ok.code().into()),
    }

    buf.put_len(result.fields.len());
    for field in &result.fields {
        buf.put_str(field);
    }

    buf.put_len(result.attrs.len());
    for attr in &result.attrs {
        buf.put_str(&attr.name);
        buf.put_u32(attr.attr_type.code());
    }

    buf.put_len(result.matches.len());
    // 64-bit document ids
    buf.put_u32(1);
    for m in &result.matches {
        buf.put_u64(m.id);
        buf.put_u32(m.weight);
        for attr in &result.attrs {
            match m.attrs.get(&attr.name) {
                Some(value) => encode_attr_value(buf, value),
                None => encode_zero(buf, attr.attr_type),
            }
        }
    }

    buf.put_u32(result.total_retrievable);
    buf.put_u32(result.total_found);
    buf.put_u32(result.elapsed.as_millis() as u32);
    buf.put_len(result.words.len());
    for word in &result.words {
        buf.put_str(&word.word);
        buf.put_u32(word.docs);
        buf.put_u32(word.hits);
    }
}

fn encode_attr_value(buf: &mut BytesMut, value: &AttrValue) {
    match value {
        AttrValue::Integer(v) | AttrValue::Ordinal(v) => buf.put_u32(*v),
        AttrValue::Timestamp(ts) => buf.put_u32(ts.timestamp() as u32),
        AttrValue::Bool(v) => buf.put_u32(*v as u32),
        AttrValue::Float(v) => buf.put_f32_bits(*v),
        AttrValue::BigInt(v) => buf.put_i64(*v),
        AttrValue::String(v) => buf.put_str(v),
        AttrValue::Multi(values) => {
            buf.put_len(values.len());
            for v in values {
                buf.put_u32(*v);
            }
        }
    }
}

fn encode_zero(buf: &mut BytesMut, attr_type: AttrType) {
    match attr_type {
        AttrType::BigInt => buf.put_i64(0),
        _ => buf.put_u32(0),
    }
}

/// Buffers socket bytes into frames and parses reply payloads.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next reply from the buffer.
    pub fn decode_reply(&mut self) -> Result<Option<Reply>, ProtocolError> {
        Reply::decode(&mut self.buffer)
    }

    /// Attempts to decode the next request from the buffer.
    pub fn decode_request(&mut self) -> Result<Option<RequestFrame>, ProtocolError> {
        RequestFrame::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Checks the server's handshake version.
    pub fn handshake(raw: [u8; 4]) -> Result<u32, ProtocolError> {
        let version = u32::from_be_bytes(raw);
        if version < PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        Ok(version)
    }

    /// Parses a search reply carrying `nqueries` results.
    pub fn search(payload: &[u8], nqueries: usize) -> Result<Vec<QueryOutcome>, ProtocolError> {
        let mut reader = PayloadReader::new(payload);
        let mut outcomes = Vec::with_capacity(nqueries);
        for _ in 0..nqueries {
            outcomes.push(decode_result_set(&mut reader)?);
        }
        finish(&reader, "search results")?;
        Ok(outcomes)
    }

    pub fn excerpts(payload: &[u8], ndocs: usize) -> Result<Vec<String>, ProtocolError> {
        let mut reader = PayloadReader::new(payload);
        let mut excerpts = Vec::with_capacity(ndocs.min(reader.remaining() / 4));
        for _ in 0..ndocs {
            excerpts.push(reader.string_lossy("excerpt")?);
        }
        finish(&reader, "excerpts")?;
        Ok(excerpts)
    }

    /// Parses the number of documents an update touched.
    pub fn update(payload: &[u8]) -> Result<u32, ProtocolError> {
        let mut reader = PayloadReader::new(payload);
        let updated = reader.u32("updated count")?;
        finish(&reader, "updated count")?;
        Ok(updated)
    }

    pub fn keywords(payload: &[u8], with_hits: bool) -> Result<Vec<KeywordInfo>, ProtocolError> {
        let mut reader = PayloadReader::new(payload);
        let count = reader.count("keyword count", if with_hits { 16 } else { 8 })?;
        let mut keywords = Vec::with_capacity(count);
        for _ in 0..count {
            let tokenized = reader.string_lossy("tokenized keyword")?;
            let normalized = reader.string_lossy("normalized keyword")?;
            let (docs, hits) = if with_hits {
                (
                    Some(reader.u32("keyword docs")?),
                    Some(reader.u32("keyword hits")?),
                )
            } else {
                (None, None)
            };
            keywords.push(KeywordInfo {
                tokenized,
                normalized,
                docs,
                hits,
            });
        }
        finish(&reader, "keywords")?;
        Ok(keywords)
    }

    /// Parses the status table; searchd always sends two columns.
    pub fn status(payload: &[u8]) -> Result<Vec<StatusRow>, ProtocolError> {
        let mut reader = PayloadReader::new(payload);
        let rows = reader.u32("status rows")? as usize;
        let cols = reader.u32("status columns")? as usize;
        if cols != 2 {
            return Err(ProtocolError::CountMismatch {
                field: "status columns",
                expected: 2,
                actual: cols,
            });
        }

        let mut table = Vec::with_capacity(rows.min(reader.remaining() / 8));
        for _ in 0..rows {
            table.push(StatusRow {
                label: reader.string("status label")?,
                value: reader.string("status value")?,
            });
        }
        finish(&reader, "status table")?;
        Ok(table)
    }

    /// Parses the body of a search request.
    pub fn search_request(body: &[u8]) -> Result<Vec<SearchQuery>, ProtocolError> {
        let mut reader = PayloadReader::new(body);
        let count = reader.count("query count", 4)?;
        let mut queries = Vec::with_capacity(count);
        for _ in 0..count {
            queries.push(SearchQuery::decode(&mut reader)?);
        }
        finish(&reader, "search request")?;
        Ok(queries)
    }

    pub fn excerpts_request(body: &[u8]) -> Result<ExcerptsRequest, ProtocolError> {
        let mut reader = PayloadReader::new(body);
        reader.u32("excerpt mode")?;
        let flags = reader.u32("excerpt flags")?;
        let index = reader.string("index")?;
        let words = reader.string("words")?;

        let mut options = ExcerptOptions {
            before_match: reader.string("before match")?,
            after_match: reader.string("after match")?,
            chunk_separator: reader.string("chunk separator")?,
            limit: reader.u32("excerpt limit")?,
            around: reader.u32("excerpt around")?,
            ..ExcerptOptions::default()
        };
        options.apply_flags(flags);

        let count = reader.count("document count", 4)?;
        let mut docs = Vec::with_capacity(count);
        for _ in 0..count {
            docs.push(reader.string("document")?);
        }
        finish(&reader, "excerpts request")?;

        Ok(ExcerptsRequest {
            index,
            words,
            docs,
            options,
        })
    }

    pub fn update_request(body: &[u8]) -> Result<UpdateRequest, ProtocolError> {
        let mut reader = PayloadReader::new(body);
        let index = reader.string("index")?;

        let nattrs = reader.count("attribute count", 8)?;
        let mut attrs = Vec::with_capacity(nattrs);
        let mut multi = None;
        for _ in 0..nattrs {
            attrs.push(reader.string("attribute name")?);
            let flag = reader.u32("attribute mva flag")? != 0;
            if *multi.get_or_insert(flag) != flag {
                return Err(ProtocolError::InvalidRequest(
                    "mixed scalar and multi-valued attributes".into(),
                ));
            }
        }

        let nrows = reader.count("row count", 8)?;
        let values = if multi.unwrap_or(false) {
            let mut rows = BTreeMap::new();
            for _ in 0..nrows {
                let id = reader.u64("document id")?;
                let mut row = Vec::with_capacity(nattrs);
                for _ in 0..nattrs {
                    let n = reader.count("mva length", 4)?;
                    let mut list = Vec::with_capacity(n);
                    for _ in 0..n {
                        list.push(reader.u32("mva value")?);
                    }
                    row.push(list);
                }
                rows.insert(id, row);
            }
            UpdateValues::Multi(rows)
        } else {
            let mut rows = BTreeMap::new();
            for _ in 0..nrows {
                let id = reader.u64("document id")?;
                let mut row = Vec::with_capacity(nattrs);
                for _ in 0..nattrs {
                    row.push(reader.u32("attribute value")?);
                }
                rows.insert(id, row);
            }
            UpdateValues::Scalar(rows)
        };
        finish(&reader, "update request")?;

        Ok(UpdateRequest {
            index,
            attrs,
            values,
        })
    }

    pub fn keywords_request(body: &[u8]) -> Result<KeywordsRequest, ProtocolError> {
        let mut reader = PayloadReader::new(body);
        let request = KeywordsRequest {
            query: reader.string("query")?,
            index: reader.string("index")?,
            hits: reader.u32("hits flag")? != 0,
        };
        finish(&reader, "keywords request")?;
        Ok(request)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(reader: &PayloadReader<'_>, field: &'static str) -> Result<(), ProtocolError> {
    if !reader.is_empty() {
        return Err(ProtocolError::TrailingBytes {
            field,
            remaining: reader.remaining(),
        });
    }
    Ok(())
}

fn decode_result_set(reader: &mut PayloadReader<'_>) -> Result<QueryOutcome, ProtocolError> {
    let status = SearchdStatus::from_code(reader.u32("query status")?)?;
    let mut warning = None;
    match status {
        SearchdStatus::Ok => {}
        SearchdStatus::Warning => warning = Some(reader.string("query warning")?),
        SearchdStatus::Error | SearchdStatus::Retry => {
            return Ok(Err(SearchFailure {
                status,
                message: reader.string("query error")?,
            }));
        }
    }

    let nfields = reader.count("field count", 4)?;
    let mut fields = Vec::with_capacity(nfields);
    for _ in 0..nfields {
        fields.push(reader.string("field name")?);
    }

    let nattrs = reader.count("attribute count", 8)?;
    let mut attrs = Vec::with_capacity(nattrs);
    for _ in 0..nattrs {
        let name = reader.string("attribute name")?;
        let attr_type = AttrType::from_code(reader.u32("attribute type")?)?;
        attrs.push(AttrSchema { name, attr_type });
    }

    let nmatches = reader.count("match count", 8)?;
    let id64 = reader.u32("id64 flag")? != 0;
    let mut matches = Vec::with_capacity(nmatches);
    for _ in 0..nmatches {
        let id = if id64 {
            reader.u64("match id")?
        } else {
            reader.u32("match id")? as u64
        };
        let weight = reader.u32("match weight")?;

        let mut values = BTreeMap::new();
        for attr in &attrs {
            values.insert(attr.name.clone(), decode_attr_value(reader, attr.attr_type)?);
        }
        matches.push(Match {
            id,
            weight,
            attrs: values,
        });
    }

    let total_retrievable = reader.u32("total")?;
    let total_found = reader.u32("total found")?;
    let elapsed = Duration::from_millis(reader.u32("elapsed msecs")? as u64);

    let nwords = reader.count("word count", 12)?;
    let mut words = Vec::with_capacity(nwords);
    for _ in 0..nwords {
        words.push(WordStat {
            word: reader.string("word")?,
            docs: reader.u32("word docs")?,
            hits: reader.u32("word hits")?,
        });
    }

    if (total_found as usize) < matches.len() {
        return Err(ProtocolError::CountMismatch {
            field: "total found",
            expected: matches.len(),
            actual: total_found as usize,
        });
    }

    Ok(Ok(ResultSet {
        warning,
        fields,
        attrs,
        total: matches.len() as u32,
        matches,
        total_found,
        total_retrievable,
        elapsed,
        words,
    }))
}

fn decode_attr_value(
    reader: &mut PayloadReader<'_>,
    attr_type: AttrType,
) -> Result<AttrValue, ProtocolError> {
    Ok(match attr_type {
        AttrType::BigInt => AttrValue::BigInt(reader.i64("bigint value")?),
        AttrType::Float => AttrValue::Float(reader.f32("float value")?),
        AttrType::String => AttrValue::String(reader.string("string value")?),
        AttrType::MultiInteger => {
            let n = reader.count("mva length", 4)?;
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(reader.u32("mva value")?);
            }
            AttrValue::Multi(values)
        }
        AttrType::Timestamp => {
            let secs = reader.u32("timestamp value")?;
            AttrValue::Timestamp(DateTime::from_timestamp(secs as i64, 0).unwrap_or_default())
        }
        AttrType::Bool => AttrValue::Bool(reader.u32("bool value")? != 0),
        AttrType::Integer => AttrValue::Integer(reader.u32("integer value")?),
        AttrType::Ordinal => AttrValue::Ordinal(reader.u32("ordinal value")?),
    })
}
