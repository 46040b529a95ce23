//! Parser for the `---`-fenced metadata header at the top of each post.
//!
//! The header is a flat mapping, one `key: value` per line. Values may be
//! bare or quoted scalars, inline lists (`[a, b]`), or block lists written
//! as `- item` lines under an empty `key:`. Nesting is not supported.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashMap;

const FENCE: &str = "---";

/// Errors while parsing a post header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrontMatterError {
    /// The file does not start with a `---` line.
    #[error("post does not start with a front matter fence")]
    MissingFence,
    /// The opening fence is never closed.
    #[error("front matter is not terminated")]
    Unterminated,
    /// A required key is absent or empty.
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),
    /// The date is not `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]` or RFC 3339.
    #[error("invalid date `{0}`")]
    InvalidDate(String),
    /// A line is not `key: value` or a list item.
    #[error("line {line}: cannot parse `{text}`")]
    InvalidLine {
        /// One-based line number within the file.
        line: usize,
        /// The offending line.
        text: String,
    },
}

/// The metadata header of a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter {
    /// Post title.
    pub title: String,
    /// Publication date.
    pub date: NaiveDate,
    /// Short summary.
    pub description: Option<String>,
    /// Cover image path.
    pub image: Option<String>,
    /// Tags, in file order.
    pub tags: Vec<String>,
}

#[derive(Debug)]
enum Value {
    Scalar(String),
    List(Vec<String>),
}

/// Split a post into its front matter and its markdown body.
pub fn parse(source: &str) -> Result<(FrontMatter, &str), FrontMatterError> {
    let (header, body) = split(source)?;
    let fields = fields(header)?;
    Ok((FrontMatter::from_fields(fields)?, body))
}

fn split(source: &str) -> Result<(&str, &str), FrontMatterError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let rest = source
        .strip_prefix(FENCE)
        .and_then(|rest| rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')))
        .ok_or(FrontMatterError::MissingFence)?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((header, body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }
    Err(FrontMatterError::Unterminated)
}

fn fields(header: &str) -> Result<HashMap<String, Value>, FrontMatterError> {
    let mut fields = HashMap::new();
    // Key of an open block list, if the previous key had no inline value.
    let mut open: Option<String> = None;

    for (idx, raw) in header.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = || FrontMatterError::InvalidLine {
            line: idx + 2,
            text: raw.to_owned(),
        };

        if let Some(item) = line.strip_prefix("- ").or((line == "-").then_some("")) {
            let key = open.as_ref().ok_or_else(invalid)?;
            if let Some(Value::List(items)) = fields.get_mut(key) {
                items.push(unquote(item.trim()).to_owned());
            }
            continue;
        }

        let (key, value) = line.split_once(':').ok_or_else(invalid)?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let value = value.trim();

        if value.is_empty() {
            fields.insert(key.to_owned(), Value::List(Vec::new()));
            open = Some(key.to_owned());
        } else {
            fields.insert(key.to_owned(), parse_value(value));
            open = None;
        }
    }

    Ok(fields)
}

fn parse_value(value: &str) -> Value {
    match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        Some(inner) => Value::List(
            inner
                .split(',')
                .map(|item| unquote(item.trim()))
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
        ),
        None => Value::Scalar(unquote(value).to_owned()),
    }
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
        .unwrap_or(value)
}

fn parse_date(value: &str) -> Result<NaiveDate, FrontMatterError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").map(|dt| dt.date()))
        .map_err(|_| FrontMatterError::InvalidDate(value.to_owned()))
}

impl FrontMatter {
    fn from_fields(mut fields: HashMap<String, Value>) -> Result<Self, FrontMatterError> {
        let mut scalar = |key: &str| match fields.remove(key) {
            Some(Value::Scalar(s)) if !s.is_empty() => Some(s),
            _ => None,
        };

        let title = scalar("title").ok_or(FrontMatterError::MissingKey("title"))?;
        let date = scalar("date").ok_or(FrontMatterError::MissingKey("date"))?;
        let date = parse_date(&date)?;
        let description = scalar("description");
        let image = scalar("image");

        let tags = match fields.remove("tags") {
            Some(Value::List(tags)) => tags,
            Some(Value::Scalar(tag)) => vec![tag],
            None => Vec::new(),
        };

        Ok(Self {
            title,
            date,
            description,
            image,
            tags,
        })
    }
}
