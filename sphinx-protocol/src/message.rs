//! Typed requests options and results exchanged with searchd.

use crate::error::{ProtocolError, SearchdStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Bit flag marking a multi-valued attribute in the schema.
pub const ATTR_MULTI_FLAG: u32 = 0x4000_0000;

/// Attribute types as reported in the result schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    Integer,
    Timestamp,
    Ordinal,
    Bool,
    Float,
    BigInt,
    String,
    /// Ordered list of 32-bit integers (MVA).
    MultiInteger,
}

impl AttrType {
    pub fn code(&self) -> u32 {
        match self {
            AttrType::Integer => 1,
            AttrType::Timestamp => 2,
            AttrType::Ordinal => 3,
            AttrType::Bool => 4,
            AttrType::Float => 5,
            AttrType::BigInt => 6,
            AttrType::String => 7,
            AttrType::MultiInteger => ATTR_MULTI_FLAG | 1,
        }
    }

    pub fn from_code(code: u32) -> Result<Self, ProtocolError> {
        if code & ATTR_MULTI_FLAG != 0 {
            return Ok(AttrType::MultiInteger);
        }
        match code {
            1 => Ok(AttrType::Integer),
            2 => Ok(AttrType::Timestamp),
            3 => Ok(AttrType::Ordinal),
            4 => Ok(AttrType::Bool),
            5 => Ok(AttrType::Float),
            6 => Ok(AttrType::BigInt),
            7 => Ok(AttrType::String),
            other => Err(ProtocolError::UnknownAttrType(other)),
        }
    }
}

/// A single attribute value, tagged by its schema type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Integer(u32),
    Timestamp(DateTime<Utc>),
    Ordinal(u32),
    Bool(bool),
    Float(f32),
    BigInt(i64),
    String(String),
    Multi(Vec<u32>),
}

impl AttrValue {
    /// Returns the value as a signed integer when it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(v) | AttrValue::Ordinal(v) => Some(*v as i64),
            AttrValue::Bool(v) => Some(*v as i64),
            AttrValue::BigInt(v) => Some(*v),
            AttrValue::Timestamp(ts) => Some(ts.timestamp()),
            _ => None,
        }
    }

    pub fn as_multi(&self) -> Option<&[u32]> {
        match self {
            AttrValue::Multi(values) => Some(values),
            _ => None,
        }
    }

    pub fn attr_type(&self) -> AttrType {
        match self {
            AttrValue::Integer(_) => AttrType::Integer,
            AttrValue::Timestamp(_) => AttrType::Timestamp,
            AttrValue::Ordinal(_) => AttrType::Ordinal,
            AttrValue::Bool(_) => AttrType::Bool,
            AttrValue::Float(_) => AttrType::Float,
            AttrValue::BigInt(_) => AttrType::BigInt,
            AttrValue::String(_) => AttrType::String,
            AttrValue::Multi(_) => AttrType::MultiInteger,
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Integer(v) | AttrValue::Ordinal(v) => write!(f, "{}", v),
            AttrValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            AttrValue::Bool(v) => write!(f, "{}", *v as u8),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::BigInt(v) => write!(f, "{}", v),
            AttrValue::String(v) => write!(f, "{}", v),
            AttrValue::Multi(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", joined.join(","))
            }
        }
    }
}

/// One schema entry of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttrType,
}

/// A matched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: u64,
    pub weight: u32,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Match {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }
}

/// Per-word statistics of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordStat {
    pub word: String,
    pub docs: u32,
    pub hits: u32,
}

/// Result of a single successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Non-fatal warning attached to this query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub fields: Vec<String>,
    pub attrs: Vec<AttrSchema>,
    pub matches: Vec<Match>,
    /// Number of matches returned in this window (`matches.len()`).
    pub total: u32,
    /// Number of matches found in the index.
    pub total_found: u32,
    /// Number of matches the server could page through (bounded by max matches).
    pub total_retrievable: u32,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    pub words: Vec<WordStat>,
}

impl ResultSet {
    pub fn attr_type(&self, name: &str) -> Option<AttrType> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.attr_type)
    }
}

/// A query the server refused, inside a successful batch reply or as a whole reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub status: SearchdStatus,
    pub message: String,
}

/// One entry per query of a batch.
pub type QueryOutcome = Result<ResultSet, SearchFailure>;

/// Tokenized and normalized form of a query word, with optional statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordInfo {
    pub tokenized: String,
    pub normalized: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hits: Option<u32>,
}

/// One row of the server status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRow {
    pub label: String,
    pub value: String,
}

/// Highlighting options for excerpt building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcerptOptions {
    pub before_match: String,
    pub after_match: String,
    pub chunk_separator: String,
    /// Maximum snippet size in characters.
    pub limit: u32,
    /// Words to keep around each match.
    pub around: u32,
    pub exact_phrase: bool,
    pub single_passage: bool,
    pub use_boundaries: bool,
    pub weight_order: bool,
    pub query_mode: bool,
    pub force_all_words: bool,
}

impl Default for ExcerptOptions {
    fn default() -> Self {
        Self {
            before_match: "<b>".to_string(),
            after_match: "</b>".to_string(),
            chunk_separator: " ... ".to_string(),
            limit: 256,
            around: 5,
            exact_phrase: false,
            single_passage: false,
            use_boundaries: false,
            weight_order: false,
            query_mode: false,
            force_all_words: false,
        }
    }
}

impl ExcerptOptions {
    const REMOVE_SPACES: u32 = 1 << 0;
    const EXACT_PHRASE: u32 = 1 << 1;
    const SINGLE_PASSAGE: u32 = 1 << 2;
    const USE_BOUNDARIES: u32 = 1 << 3;
    const WEIGHT_ORDER: u32 = 1 << 4;
    const QUERY_MODE: u32 = 1 << 5;
    const FORCE_ALL_WORDS: u32 = 1 << 6;

    /// Flags word sent on the wire.
    pub fn flags(&self) -> u32 {
        let mut flags = Self::REMOVE_SPACES;
        if self.exact_phrase {
            flags |= Self::EXACT_PHRASE;
        }
        if self.single_passage {
            flags |= Self::SINGLE_PASSAGE;
        }
        if self.use_boundaries {
            flags |= Self::USE_BOUNDARIES;
        }
        if self.weight_order {
            flags |= Self::WEIGHT_ORDER;
        }
        if self.query_mode {
            flags |= Self::QUERY_MODE;
        }
        if self.force_all_words {
            flags |= Self::FORCE_ALL_WORDS;
        }
        flags
    }

    /// Restores boolean options from a flags word.
    pub fn apply_flags(&mut self, flags: u32) {
        self.exact_phrase = flags & Self::EXACT_PHRASE != 0;
        self.single_passage = flags & Self::SINGLE_PASSAGE != 0;
        self.use_boundaries = flags & Self::USE_BOUNDARIES != 0;
        self.weight_order = flags & Self::WEIGHT_ORDER != 0;
        self.query_mode = flags & Self::QUERY_MODE != 0;
        self.force_all_words = flags & Self::FORCE_ALL_WORDS != 0;
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_around(mut self, around: u32) -> Self {
        self.around = around;
        self
    }

    pub fn with_chunk_separator(mut self, separator: impl Into<String>) -> Self {
        self.chunk_separator = separator.into();
        self
    }

    pub fn with_markers(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before_match = before.into();
        self.after_match = after.into();
        self
    }

    pub fn with_exact_phrase(mut self, exact: bool) -> Self {
        self.exact_phrase = exact;
        self
    }
}

/// New attribute values keyed by document id.
///
/// Each row holds one entry per attribute name, in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateValues {
    /// Plain integer attributes.
    Scalar(BTreeMap<u64, Vec<u32>>),
    /// Multi-valued attributes; every entry replaces the whole list.
    Multi(BTreeMap<u64, Vec<Vec<u32>>>),
}

impl UpdateValues {
    pub fn len(&self) -> usize {
        match self {
            UpdateValues::Scalar(rows) => rows.len(),
            UpdateValues::Multi(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, UpdateValues::Multi(_))
    }

    /// Checks that every row carries exactly `attr_count` values.
    pub fn validate(&self, attr_count: usize) -> Result<(), ProtocolError> {
        let mismatch = match self {
            UpdateValues::Scalar(rows) => rows
                .iter()
                .find(|(_, values)| values.len() != attr_count)
                .map(|(id, values)| (*id, values.len())),
            UpdateValues::Multi(rows) => rows
                .iter()
                .find(|(_, values)| values.len() != attr_count)
                .map(|(id, values)| (*id, values.len())),
        };

        match mismatch {
            Some((id, got)) => Err(ProtocolError::InvalidRequest(format!(
                "document {} has {} values for {} attributes",
                id, got, attr_count
            ))),
            None => Ok(()),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
