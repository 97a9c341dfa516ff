//! Command execution and output formatting.

use crate::{Commands, QueryArgs};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sphinx_client::Client;
use sphinx_protocol::{
    escape_string, AttrValue, ExcerptOptions, KeywordInfo, QuerySpec, ResultSet, StatusRow,
    UpdateValues,
};
use std::collections::BTreeMap;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Executes a command and returns the formatted output.
pub async fn execute(client: &mut Client, cmd: Commands, json: bool) -> CliResult<String> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Query(args) => {
            let spec = build_spec(&args)?;
            let text = if args.literal {
                escape_string(&args.query)
            } else {
                args.query.clone()
            };
            let result = client.query(&text, &args.index, &spec).await?;
            if json {
                return format_json(&result);
            }
            Ok(format_result_set(&text, &result))
        }

        Commands::Excerpts {
            index,
            words,
            docs,
            limit,
            around,
            exact_phrase,
            before,
            after,
        } => {
            let docs = docs
                .iter()
                .map(|d| read_text_arg(d))
                .collect::<CliResult<Vec<_>>>()?;
            let options = ExcerptOptions::default()
                .with_limit(limit)
                .with_around(around)
                .with_exact_phrase(exact_phrase)
                .with_markers(before, after);

            let excerpts = client
                .build_excerpts(&docs, &index, &words, &options)
                .await?;
            if json {
                return format_json(&excerpts);
            }
            Ok(format_excerpts(&excerpts))
        }

        Commands::Keywords { query, index, hits } => {
            let keywords = client.build_keywords(&query, &index, hits).await?;
            if json {
                return format_json(&keywords);
            }
            Ok(format_keywords(&keywords))
        }

        Commands::Update {
            index,
            attrs,
            values,
            multi,
        } => {
            let raw = read_text_arg(&values)?;
            let values = if multi {
                UpdateValues::Multi(serde_json::from_str(&raw)?)
            } else {
                UpdateValues::Scalar(serde_json::from_str(&raw)?)
            };

            let updated = client.update_attributes(&index, &attrs, &values).await?;
            if json {
                return format_json(&serde_json::json!({ "updated": updated }));
            }
            Ok(format!(
                "{} {} document(s) in {}",
                "Updated".green(),
                updated,
                index.cyan()
            ))
        }

        Commands::Status => {
            let rows = client.status().await?;
            if json {
                return format_json(&rows);
            }
            Ok(format_status(&rows))
        }
    }
}

/// Builds a query spec from command-line options.
fn build_spec(args: &QueryArgs) -> CliResult<QuerySpec> {
    let mut spec = QuerySpec::new();
    let max_matches = spec
        .max_matches
        .max(args.offset.saturating_add(args.limit));
    spec.set_limits(args.offset, args.limit, max_matches, 0)?;

    if let Some(ref mode) = args.mode {
        spec.set_match_mode(parse_mode(mode)?);
    }
    if let Some(ref ranker) = args.ranker {
        spec.set_ranking_mode(parse_mode(ranker)?);
    }
    if let Some(ref sort) = args.sort {
        spec.set_sort_mode(parse_mode(sort)?, args.sort_by.as_str())?;
    }

    for filter in &args.filter {
        let (attr, values) = parse_filter(filter)?;
        spec.add_filter(attr, values, false)?;
    }
    for filter in &args.exclude {
        let (attr, values) = parse_filter(filter)?;
        spec.add_filter(attr, values, true)?;
    }
    for range in &args.range {
        let (attr, min, max) = parse_range(range)?;
        spec.add_filter_range(attr, min, max, false)?;
    }

    if !args.weight.is_empty() {
        let weights = args
            .weight
            .iter()
            .map(|w| parse_weight(w))
            .collect::<CliResult<Vec<_>>>()?;
        spec.set_field_weights(weights);
    }
    if let Some(ref attr) = args.group_by {
        spec.set_group_by(attr.as_str(), sphinx_protocol::GroupFunc::Attr, "@group desc")?;
    }
    if let Some(ref select) = args.select {
        spec.set_select(select.as_str());
    }
    if let Some(ms) = args.max_query_time {
        spec.set_max_query_time(ms);
    }

    Ok(spec)
}

/// Parses a mode name such as `extended2` or `attr-desc`.
pub(crate) fn parse_mode<T: DeserializeOwned>(name: &str) -> CliResult<T> {
    let normalized = name.trim().to_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|_| format!("unknown mode: {}", name).into())
}

/// Parses `attr=v1,v2,...`.
pub(crate) fn parse_filter(arg: &str) -> CliResult<(String, Vec<i64>)> {
    let (attr, values) = split_assignment(arg)?;
    let values = values
        .split(',')
        .map(|v| v.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid filter value in '{}': {}", arg, e))?;
    Ok((attr, values))
}

/// Parses `attr=min..max`.
pub(crate) fn parse_range(arg: &str) -> CliResult<(String, i64, i64)> {
    let (attr, range) = split_assignment(arg)?;
    let (min, max) = range
        .split_once("..")
        .ok_or_else(|| format!("expected attr=min..max, got '{}'", arg))?;
    Ok((attr, min.trim().parse()?, max.trim().parse()?))
}

/// Parses `field=weight`.
pub(crate) fn parse_weight(arg: &str) -> CliResult<(String, u32)> {
    let (field, weight) = split_assignment(arg)?;
    Ok((field, weight.trim().parse()?))
}

fn split_assignment(arg: &str) -> CliResult<(String, &str)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value)),
        _ => Err(format!("expected name=value, got '{}'", arg).into()),
    }
}

/// Reads a text argument (either inline text or @file).
fn read_text_arg(arg: &str) -> CliResult<String> {
    if let Some(path) = arg.strip_prefix('@') {
        Ok(std::fs::read_to_string(path)?)
    } else {
        Ok(arg.to_string())
    }
}

pub(crate) fn format_result_set(query: &str, result: &ResultSet) -> String {
    let mut output = format!(
        "Query '{}' retrieved {} of {} matches in {:.3} sec\n",
        query.cyan(),
        result.total,
        result.total_found,
        result.elapsed.as_secs_f64()
    )
    .bold()
    .to_string();

    if !result.words.is_empty() {
        output.push_str("Words:\n");
        for word in &result.words {
            output.push_str(&format!(
                "  {}: {} documents, {} hits\n",
                word.word.yellow(),
                word.docs,
                word.hits
            ));
        }
    }

    if result.matches.is_empty() {
        output.push_str(&"No matches".yellow().to_string());
        return output;
    }

    output.push_str("Matches:\n");
    for (n, m) in result.matches.iter().enumerate() {
        output.push_str(&format!(
            "  {}. doc_id={}, weight={}",
            n + 1,
            m.id.to_string().cyan(),
            m.weight
        ));
        // Schema order, not map order
        for schema in &result.attrs {
            if let Some(value) = m.attr(&schema.name) {
                output.push_str(&format!(", {}={}", schema.name, format_attr(value)));
            }
        }
        output.push('\n');
    }
    output
}

pub(crate) fn format_attr(value: &AttrValue) -> String {
    match value {
        AttrValue::Integer(v) | AttrValue::Ordinal(v) => v.to_string(),
        AttrValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        AttrValue::Bool(v) => v.to_string(),
        AttrValue::Float(v) => format!("{:.6}", v),
        AttrValue::BigInt(v) => v.to_string(),
        AttrValue::String(v) => v.clone(),
        AttrValue::Multi(values) => format!(
            "({})",
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}

pub(crate) fn format_excerpts(excerpts: &[String]) -> String {
    excerpts
        .iter()
        .enumerate()
        .map(|(n, e)| format!("{}. {}", n + 1, e))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_keywords(keywords: &[KeywordInfo]) -> String {
    if keywords.is_empty() {
        return "No keywords".yellow().to_string();
    }
    let mut output = String::new();
    for (n, kw) in keywords.iter().enumerate() {
        output.push_str(&format!(
            "  {}. tokenized={}, normalized={}",
            n + 1,
            kw.tokenized.cyan(),
            kw.normalized
        ));
        if let (Some(docs), Some(hits)) = (kw.docs, kw.hits) {
            output.push_str(&format!(", docs={}, hits={}", docs, hits));
        }
        output.push('\n');
    }
    output
}

pub(crate) fn format_status(rows: &[StatusRow]) -> String {
    let width = rows.iter().map(|r| r.label.len()).max().unwrap_or(0);
    rows.iter()
        .map(|r| format!("{:<width$}  {}", r.label.cyan(), r.value, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Parses update values for a single document: `docid=v1,v2`.
pub(crate) fn parse_update_row(arg: &str) -> CliResult<(u64, Vec<u32>)> {
    let (doc, values) = split_assignment(arg)?;
    let doc = doc.parse()?;
    let values = values
        .split(',')
        .map(|v| v.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok((doc, values))
}

/// Collects `docid=v1,v2` rows into scalar update values.
pub(crate) fn parse_update_rows<'a>(
    args: impl IntoIterator<Item = &'a str>,
) -> CliResult<UpdateValues> {
    let mut rows = BTreeMap::new();
    for arg in args {
        let (doc, values) = parse_update_row(arg)?;
        rows.insert(doc, values);
    }
    Ok(UpdateValues::Scalar(rows))
}
