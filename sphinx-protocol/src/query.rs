//! Search query specification and its wire encoding.
//!
//! A [`QuerySpec`] is built incrementally by the caller and then encoded
//! together with the query text, index list and comment. The layout follows
//! searchd command version 0x117:
//!
//! ```text
//! offset limit mode ranker sort | sort_by | query | weights(0) | index
//! id64(1) min_id max_id | filters | group_func group_by | max_matches
//! group_sort | cutoff retry_count retry_delay | group_distinct | anchor
//! index_weights | max_query_time | field_weights | comment | overrides | select
//! ```

use crate::error::ProtocolError;
use crate::wire::{PayloadReader, WireWrite};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(&self) -> u32 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn from_code(code: u32) -> Result<Self, ProtocolError> {
                match code {
                    $($code => Ok($name::$variant),)+
                    other => Err(ProtocolError::InvalidRequest(format!(
                        "unknown {} {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

wire_enum!(
    /// How query words are matched against documents.
    MatchMode {
        All = 0,
        Any = 1,
        Phrase = 2,
        Boolean = 3,
        Extended = 4,
        Fullscan = 5,
        Extended2 = 6,
    }
);

wire_enum!(
    /// Relevance ranking function.
    RankingMode {
        ProximityBm25 = 0,
        Bm25 = 1,
        None = 2,
        WordCount = 3,
        Proximity = 4,
        MatchAny = 5,
        FieldMask = 6,
    }
);

wire_enum!(
    /// Result ordering.
    SortMode {
        Relevance = 0,
        AttrDesc = 1,
        AttrAsc = 2,
        TimeSegments = 3,
        Extended = 4,
        Expr = 5,
    }
);

wire_enum!(
    /// Grouping function applied to the group-by attribute.
    GroupFunc {
        Day = 0,
        Week = 1,
        Month = 2,
        Year = 3,
        Attr = 4,
        AttrPair = 5,
    }
);

/// Attribute filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// Attribute value must be one of `values`.
    Values {
        attr: String,
        values: Vec<i64>,
        exclude: bool,
    },
    /// Attribute value must lie in `[min, max]`.
    Range {
        attr: String,
        min: i64,
        max: i64,
        exclude: bool,
    },
    /// Float attribute value must lie in `[min, max]`.
    FloatRange {
        attr: String,
        min: f32,
        max: f32,
        exclude: bool,
    },
}

impl Filter {
    const VALUES: u32 = 0;
    const RANGE: u32 = 1;
    const FLOAT_RANGE: u32 = 2;

    pub fn attr(&self) -> &str {
        match self {
            Filter::Values { attr, .. } | Filter::Range { attr, .. } => attr,
            Filter::FloatRange { attr, .. } => attr,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_str(self.attr());
        let exclude = match self {
            Filter::Values {
                values, exclude, ..
            } => {
                buf.put_u32(Self::VALUES);
                buf.put_len(values.len());
                for value in values {
                    buf.put_i64(*value);
                }
                *exclude
            }
            Filter::Range {
                min, max, exclude, ..
            } => {
                buf.put_u32(Self::RANGE);
                buf.put_i64(*min);
                buf.put_i64(*max);
                *exclude
            }
            Filter::FloatRange {
                min, max, exclude, ..
            } => {
                buf.put_u32(Self::FLOAT_RANGE);
                buf.put_f32_bits(*min);
                buf.put_f32_bits(*max);
                *exclude
            }
        };
        buf.put_u32(exclude as u32);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let attr = reader.string("filter attr")?;
        let filter = match reader.u32("filter type")? {
            Self::VALUES => {
                let count = reader.count("filter values", 8)?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(reader.i64("filter value")?);
                }
                Filter::Values {
                    attr,
                    values,
                    exclude: false,
                }
            }
            Self::RANGE => Filter::Range {
                attr,
                min: reader.i64("filter min")?,
                max: reader.i64("filter max")?,
                exclude: false,
            },
            Self::FLOAT_RANGE => Filter::FloatRange {
                attr,
                min: reader.f32("filter min")?,
                max: reader.f32("filter max")?,
                exclude: false,
            },
            other => {
                return Err(ProtocolError::InvalidRequest(format!(
                    "unknown filter type {}",
                    other
                )))
            }
        };

        let exclude = reader.u32("filter exclude")? != 0;
        Ok(match filter {
            Filter::Values { attr, values, .. } => Filter::Values {
                attr,
                values,
                exclude,
            },
            Filter::Range { attr, min, max, .. } => Filter::Range {
                attr,
                min,
                max,
                exclude,
            },
            Filter::FloatRange { attr, min, max, .. } => Filter::FloatRange {
                attr,
                min,
                max,
                exclude,
            },
        })
    }
}

/// Geographical anchor point for distance calculations (radians).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoAnchor {
    pub lat_attr: String,
    pub long_attr: String,
    pub lat: f32,
    pub long: f32,
}

/// Per-query attribute override: replaces stored values for the given documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum AttrOverride {
    Integer(BTreeMap<u64, u32>),
    Timestamp(BTreeMap<u64, u32>),
    Bool(BTreeMap<u64, bool>),
    Float(BTreeMap<u64, f32>),
    BigInt(BTreeMap<u64, i64>),
}

impl AttrOverride {
    fn type_code(&self) -> u32 {
        match self {
            AttrOverride::Integer(_) => 1,
            AttrOverride::Timestamp(_) => 2,
            AttrOverride::Bool(_) => 4,
            AttrOverride::Float(_) => 5,
            AttrOverride::BigInt(_) => 6,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AttrOverride::Integer(v) | AttrOverride::Timestamp(v) => v.len(),
            AttrOverride::Bool(v) => v.len(),
            AttrOverride::Float(v) => v.len(),
            AttrOverride::BigInt(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.type_code());
        buf.put_len(self.len());
        match self {
            AttrOverride::Integer(values) | AttrOverride::Timestamp(values) => {
                for (id, value) in values {
                    buf.put_u64(*id);
                    buf.put_u32(*value);
                }
            }
            AttrOverride::Bool(values) => {
                for (id, value) in values {
                    buf.put_u64(*id);
                    buf.put_u32(*value as u32);
                }
            }
            AttrOverride::Float(values) => {
                for (id, value) in values {
                    buf.put_u64(*id);
                    buf.put_f32_bits(*value);
                }
            }
            AttrOverride::BigInt(values) => {
                for (id, value) in values {
                    buf.put_u64(*id);
                    buf.put_i64(*value);
                }
            }
        }
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let type_code = reader.u32("override type")?;
        let count = reader.count("override values", 12)?;

        fn collect<T>(
            reader: &mut PayloadReader<'_>,
            count: usize,
            mut value: impl FnMut(&mut PayloadReader<'_>) -> Result<T, ProtocolError>,
        ) -> Result<BTreeMap<u64, T>, ProtocolError> {
            let mut values = BTreeMap::new();
            for _ in 0..count {
                let id = reader.u64("override docid")?;
                values.insert(id, value(reader)?);
            }
            Ok(values)
        }

        match type_code {
            1 => Ok(AttrOverride::Integer(collect(reader, count, |r| {
                r.u32("override value")
            })?)),
            2 => Ok(AttrOverride::Timestamp(collect(reader, count, |r| {
                r.u32("override value")
            })?)),
            4 => Ok(AttrOverride::Bool(collect(reader, count, |r| {
                Ok(r.u32("override value")? != 0)
            })?)),
            5 => Ok(AttrOverride::Float(collect(reader, count, |r| {
                r.f32("override value")
            })?)),
            6 => Ok(AttrOverride::BigInt(collect(reader, count, |r| {
                r.i64("override value")
            })?)),
            other => Err(ProtocolError::InvalidRequest(format!(
                "unsupported override type {}",
                other
            ))),
        }
    }
}

/// Everything about a search except the query text and target indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    pub offset: u32,
    pub limit: u32,
    pub max_matches: u32,
    pub cutoff: u32,
    pub match_mode: MatchMode,
    pub ranking_mode: RankingMode,
    pub sort_mode: SortMode,
    pub sort_by: String,
    pub min_id: u64,
    pub max_id: u64,
    pub filters: Vec<Filter>,
    pub group_func: GroupFunc,
    pub group_by: String,
    pub group_sort: String,
    pub group_distinct: String,
    pub retry_count: u32,
    pub retry_delay: u32,
    pub anchor: Option<GeoAnchor>,
    pub index_weights: BTreeMap<String, u32>,
    /// Server-side time budget in milliseconds; 0 means unlimited.
    pub max_query_time: u32,
    pub field_weights: BTreeMap<String, u32>,
    pub overrides: BTreeMap<String, AttrOverride>,
    pub select: String,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
            max_matches: 1000,
            cutoff: 0,
            match_mode: MatchMode::All,
            ranking_mode: RankingMode::ProximityBm25,
            sort_mode: SortMode::Relevance,
            sort_by: String::new(),
            min_id: 0,
            max_id: 0,
            filters: Vec::new(),
            group_func: GroupFunc::Day,
            group_by: String::new(),
            group_sort: "@group desc".to_string(),
            group_distinct: String::new(),
            retry_count: 0,
            retry_delay: 0,
            anchor: None,
            index_weights: BTreeMap::new(),
            max_query_time: 0,
            field_weights: BTreeMap::new(),
            overrides: BTreeMap::new(),
            select: "*".to_string(),
        }
    }
}

fn invalid(message: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidRequest(message.into())
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result window and the server-side match limits.
    pub fn set_limits(
        &mut self,
        offset: u32,
        limit: u32,
        max_matches: u32,
        cutoff: u32,
    ) -> Result<&mut Self, ProtocolError> {
        if limit == 0 {
            return Err(invalid("limit must be positive"));
        }
        if max_matches == 0 {
            return Err(invalid("max_matches must be positive"));
        }
        self.offset = offset;
        self.limit = limit;
        self.max_matches = max_matches;
        self.cutoff = cutoff;
        Ok(self)
    }

    pub fn set_match_mode(&mut self, mode: MatchMode) -> &mut Self {
        self.match_mode = mode;
        self
    }

    pub fn set_ranking_mode(&mut self, mode: RankingMode) -> &mut Self {
        self.ranking_mode = mode;
        self
    }

    /// Sets the ordering; every mode except relevance needs a sort clause.
    pub fn set_sort_mode(
        &mut self,
        mode: SortMode,
        sort_by: impl Into<String>,
    ) -> Result<&mut Self, ProtocolError> {
        let sort_by = sort_by.into();
        if mode != SortMode::Relevance && sort_by.is_empty() {
            return Err(invalid(format!("sort mode {:?} requires a sort clause", mode)));
        }
        self.sort_mode = mode;
        self.sort_by = sort_by;
        Ok(self)
    }

    pub fn set_field_weights<K: Into<String>>(
        &mut self,
        weights: impl IntoIterator<Item = (K, u32)>,
    ) -> &mut Self {
        self.field_weights = weights.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    pub fn set_index_weights<K: Into<String>>(
        &mut self,
        weights: impl IntoIterator<Item = (K, u32)>,
    ) -> &mut Self {
        self.index_weights = weights.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    /// Restricts matches to document ids in `[min, max]`; `0, 0` means no restriction.
    pub fn set_id_range(&mut self, min: u64, max: u64) -> Result<&mut Self, ProtocolError> {
        if min > max {
            return Err(invalid(format!("id range {}..{} is inverted", min, max)));
        }
        self.min_id = min;
        self.max_id = max;
        Ok(self)
    }

    pub fn add_filter(
        &mut self,
        attr: impl Into<String>,
        values: Vec<i64>,
        exclude: bool,
    ) -> Result<&mut Self, ProtocolError> {
        let attr = non_empty(attr.into(), "filter attribute")?;
        if values.is_empty() {
            return Err(invalid(format!("filter on {} has no values", attr)));
        }
        self.filters.push(Filter::Values {
            attr,
            values,
            exclude,
        });
        Ok(self)
    }

    pub fn add_filter_range(
        &mut self,
        attr: impl Into<String>,
        min: i64,
        max: i64,
        exclude: bool,
    ) -> Result<&mut Self, ProtocolError> {
        let attr = non_empty(attr.into(), "filter attribute")?;
        if min > max {
            return Err(invalid(format!("range filter on {} is inverted", attr)));
        }
        self.filters.push(Filter::Range {
            attr,
            min,
            max,
            exclude,
        });
        Ok(self)
    }

    pub fn add_filter_float_range(
        &mut self,
        attr: impl Into<String>,
        min: f32,
        max: f32,
        exclude: bool,
    ) -> Result<&mut Self, ProtocolError> {
        let attr = non_empty(attr.into(), "filter attribute")?;
        if min.is_nan() || max.is_nan() || min > max {
            return Err(invalid(format!("float range filter on {} is inverted", attr)));
        }
        self.filters.push(Filter::FloatRange {
            attr,
            min,
            max,
            exclude,
        });
        Ok(self)
    }

    pub fn reset_filters(&mut self) -> &mut Self {
        self.filters.clear();
        self.anchor = None;
        self
    }

    pub fn set_geo_anchor(
        &mut self,
        lat_attr: impl Into<String>,
        long_attr: impl Into<String>,
        lat: f32,
        long: f32,
    ) -> Result<&mut Self, ProtocolError> {
        self.anchor = Some(GeoAnchor {
            lat_attr: non_empty(lat_attr.into(), "latitude attribute")?,
            long_attr: non_empty(long_attr.into(), "longitude attribute")?,
            lat,
            long,
        });
        Ok(self)
    }

    pub fn set_group_by(
        &mut self,
        attr: impl Into<String>,
        func: GroupFunc,
        group_sort: impl Into<String>,
    ) -> Result<&mut Self, ProtocolError> {
        self.group_by = non_empty(attr.into(), "group-by attribute")?;
        self.group_func = func;
        self.group_sort = group_sort.into();
        Ok(self)
    }

    pub fn set_group_distinct(&mut self, attr: impl Into<String>) -> &mut Self {
        self.group_distinct = attr.into();
        self
    }

    pub fn reset_group_by(&mut self) -> &mut Self {
        let defaults = Self::default();
        self.group_by = defaults.group_by;
        self.group_func = defaults.group_func;
        self.group_sort = defaults.group_sort;
        self.group_distinct = defaults.group_distinct;
        self
    }

    /// Distributed-agent retries, performed by searchd itself.
    pub fn set_retries(&mut self, count: u32, delay: u32) -> &mut Self {
        self.retry_count = count;
        self.retry_delay = delay;
        self
    }

    pub fn set_max_query_time(&mut self, millis: u32) -> &mut Self {
        self.max_query_time = millis;
        self
    }

    pub fn set_override(
        &mut self,
        attr: impl Into<String>,
        values: AttrOverride,
    ) -> Result<&mut Self, ProtocolError> {
        let attr = non_empty(attr.into(), "override attribute")?;
        self.overrides.insert(attr, values);
        Ok(self)
    }

    pub fn reset_overrides(&mut self) -> &mut Self {
        self.overrides.clear();
        self
    }

    pub fn set_select(&mut self, select: impl Into<String>) -> &mut Self {
        self.select = select.into();
        self
    }

    /// Re-checks the setter invariants, for specs whose fields were assigned directly.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.limit == 0 {
            return Err(invalid("limit must be positive"));
        }
        if self.max_matches == 0 {
            return Err(invalid("max_matches must be positive"));
        }
        if self.sort_mode != SortMode::Relevance && self.sort_by.is_empty() {
            return Err(invalid(format!(
                "sort mode {:?} requires a sort clause",
                self.sort_mode
            )));
        }
        if self.min_id > self.max_id {
            return Err(invalid(format!(
                "id range {}..{} is inverted",
                self.min_id, self.max_id
            )));
        }
        for filter in &self.filters {
            let valid = match filter {
                Filter::Values { values, .. } => !values.is_empty(),
                Filter::Range { min, max, .. } => min <= max,
                Filter::FloatRange { min, max, .. } => min <= max,
            };
            if !valid || filter.attr().is_empty() {
                return Err(invalid(format!("filter on '{}' is invalid", filter.attr())));
            }
        }
        Ok(())
    }

    /// Encodes one query entry of a search request.
    pub fn encode(&self, query: &str, index: &str, comment: &str) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + query.len());

        buf.put_u32(self.offset);
        buf.put_u32(self.limit);
        buf.put_u32(self.match_mode.code());
        buf.put_u32(self.ranking_mode.code());
        buf.put_u32(self.sort_mode.code());
        buf.put_str(&self.sort_by);
        buf.put_str(query);
        // Legacy per-field weights, superseded by named field weights
        buf.put_u32(0);
        buf.put_str(index);

        buf.put_u32(1);
        buf.put_u64(self.min_id);
        buf.put_u64(self.max_id);

        buf.put_len(self.filters.len());
        for filter in &self.filters {
            filter.encode(&mut buf);
        }

        buf.put_u32(self.group_func.code());
        buf.put_str(&self.group_by);
        buf.put_u32(self.max_matches);
        buf.put_str(&self.group_sort);
        buf.put_u32(self.cutoff);
        buf.put_u32(self.retry_count);
        buf.put_u32(self.retry_delay);
        buf.put_str(&self.group_distinct);

        match &self.anchor {
            Some(anchor) => {
                buf.put_u32(1);
                buf.put_str(&anchor.lat_attr);
                buf.put_str(&anchor.long_attr);
                buf.put_f32_bits(anchor.lat);
                buf.put_f32_bits(anchor.long);
            }
            None => buf.put_u32(0),
        }

        buf.put_len(self.index_weights.len());
        for (index, weight) in &self.index_weights {
            buf.put_str(index);
            buf.put_u32(*weight);
        }

        buf.put_u32(self.max_query_time);

        buf.put_len(self.field_weights.len());
        for (field, weight) in &self.field_weights {
            buf.put_str(field);
            buf.put_u32(*weight);
        }

        buf.put_str(comment);

        buf.put_len(self.overrides.len());
        for (attr, values) in &self.overrides {
            buf.put_str(attr);
            values.encode(&mut buf);
        }

        buf.put_str(&self.select);

        buf.freeze()
    }
}

fn non_empty(value: String, what: &str) -> Result<String, ProtocolError> {
    if value.is_empty() {
        return Err(invalid(format!("{} must not be empty", what)));
    }
    Ok(value)
}

/// A fully decoded query entry, as searchd sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub index: String,
    pub comment: String,
    pub spec: QuerySpec,
}

impl SearchQuery {
    pub fn encode(&self) -> Bytes {
        self.spec.encode(&self.query, &self.index, &self.comment)
    }

    /// Decodes one query entry written by [`QuerySpec::encode`].
    pub fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let mut spec = QuerySpec {
            offset: reader.u32("offset")?,
            limit: reader.u32("limit")?,
            match_mode: MatchMode::from_code(reader.u32("match mode")?)?,
            ranking_mode: RankingMode::from_code(reader.u32("ranking mode")?)?,
            sort_mode: SortMode::from_code(reader.u32("sort mode")?)?,
            sort_by: reader.string("sort by")?,
            ..QuerySpec::default()
        };
        let query = reader.string("query")?;

        let legacy_weights = reader.count("legacy weights", 4)?;
        for _ in 0..legacy_weights {
            reader.u32("legacy weight")?;
        }
        let index = reader.string("index")?;

        if reader.u32("id64 marker")? == 1 {
            spec.min_id = reader.u64("min id")?;
            spec.max_id = reader.u64("max id")?;
        } else {
            spec.min_id = reader.u32("min id")? as u64;
            spec.max_id = reader.u32("max id")? as u64;
        }

        let filters = reader.count("filters", 12)?;
        for _ in 0..filters {
            spec.filters.push(Filter::decode(reader)?);
        }

        spec.group_func = GroupFunc::from_code(reader.u32("group func")?)?;
        spec.group_by = reader.string("group by")?;
        spec.max_matches = reader.u32("max matches")?;
        spec.group_sort = reader.string("group sort")?;
        spec.cutoff = reader.u32("cutoff")?;
        spec.retry_count = reader.u32("retry count")?;
        spec.retry_delay = reader.u32("retry delay")?;
        spec.group_distinct = reader.string("group distinct")?;

        if reader.u32("anchor marker")? != 0 {
            spec.anchor = Some(GeoAnchor {
                lat_attr: reader.string("anchor lat attr")?,
                long_attr: reader.string("anchor long attr")?,
                lat: reader.f32("anchor lat")?,
                long: reader.f32("anchor long")?,
            });
        }

        let index_weights = reader.count("index weights", 8)?;
        for _ in 0..index_weights {
            let name = reader.string("index weight name")?;
            spec.index_weights.insert(name, reader.u32("index weight")?);
        }

        spec.max_query_time = reader.u32("max query time")?;

        let field_weights = reader.count("field weights", 8)?;
        for _ in 0..field_weights {
            let name = reader.string("field weight name")?;
            spec.field_weights.insert(name, reader.u32("field weight")?);
        }

        let comment = reader.string("comment")?;

        let overrides = reader.count("overrides", 12)?;
        for _ in 0..overrides {
            let attr = reader.string("override attr")?;
            spec.overrides.insert(attr, AttrOverride::decode(reader)?);
        }

        spec.select = reader.string("select")?;

        Ok(Self {
            query,
            index,
            comment,
            spec,
        })
    }
}
