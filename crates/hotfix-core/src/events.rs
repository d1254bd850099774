//! Change event parsing
//!
//! Derives one [`ChangeEvent`] per well-formed `DataTable=` directive line of
//! a document. Anything else, including lines whose table name would be
//! empty, is skipped.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::diff::table_name;

static EVENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[+\-]?DataTable=(?P<table_path>[^;]+);(?P<op>[^;]+);(?P<row>[^;]+)(?:;(?P<rest>.*))?$",
    )
    .expect("event pattern is valid")
});

/// One directive line, parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Short table name (last path segment, extension stripped)
    pub table: String,
    /// Operation, e.g. `RowUpdate`
    pub operation: String,
    pub row_key: String,
    /// Everything after the row key, if present
    pub remainder: Option<String>,
    /// The trimmed source line
    pub raw_line: String,
}

impl ChangeEvent {
    /// Parse a single line
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            return None;
        }

        let caps = EVENT_RE.captures(line)?;
        let table = table_name(&caps["table_path"]);
        if table.is_empty() {
            return None;
        }

        Some(Self {
            table,
            operation: caps["op"].to_string(),
            row_key: caps["row"].to_string(),
            remainder: caps.name("rest").map(|m| m.as_str().to_string()),
            raw_line: line.to_string(),
        })
    }
}

/// Lazily parse every event of a document, in line order
///
/// Calling this again on the same text yields the same sequence.
pub fn events(text: &str) -> impl Iterator<Item = ChangeEvent> + '_ {
    text.lines().filter_map(ChangeEvent::parse)
}

/// Parse every event of a document
pub fn parse_events(text: &str) -> Vec<ChangeEvent> {
    events(text).collect()
}
