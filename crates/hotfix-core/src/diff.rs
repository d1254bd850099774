//! Table-level diffing of canonical documents
//!
//! Only `DataTable=` directive lines take part. Other directive families still
//! change the document hash, so a snapshot can differ while no table does.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

static TABLE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+\-]?DataTable=([^;]+);").expect("table line pattern is valid")
});

/// Table name → set of raw directive lines
pub type TableLineSet = BTreeMap<String, BTreeSet<String>>;

/// Group the `DataTable=` lines of a document by table name
///
/// Lines are trimmed before matching; the trimmed line is what gets stored.
pub fn table_line_sets(text: &str) -> TableLineSet {
    let mut sets = TableLineSet::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(caps) = TABLE_LINE_RE.captures(line) {
            sets.entry(table_name(&caps[1]))
                .or_default()
                .insert(line.to_string());
        }
    }
    sets
}

/// Names of tables whose line sets differ between two documents
///
/// A table present in only one document counts as changed against an empty
/// set. The result is sorted and may be empty.
pub fn changed_tables(old: &str, new: &str) -> Vec<String> {
    let old_sets = table_line_sets(old);
    let new_sets = table_line_sets(new);
    let empty = BTreeSet::new();

    let names: BTreeSet<&String> = old_sets.keys().chain(new_sets.keys()).collect();
    names
        .into_iter()
        .filter(|name| {
            let before = old_sets.get(*name).unwrap_or(&empty);
            let after = new_sets.get(*name).unwrap_or(&empty);
            before != after
        })
        .cloned()
        .collect()
}

/// Short table name from a table path
///
/// Final `/` segment with its extension stripped. A leading dot does not
/// start an extension, so `.hidden` stays `.hidden`.
pub fn table_name(table_path: &str) -> String {
    let segment = table_path.rsplit('/').next().unwrap_or(table_path);
    let stem_start = segment.len() - segment.trim_start_matches('.').len();
    match segment[stem_start..].rfind('.') {
        Some(dot) => segment[..stem_start + dot].to_string(),
        None => segment.to_string(),
    }
}
