//! Canonical document assembly
//!
//! Merges per-key fetch results, in key order, into one text document with a
//! comment-delimited section per key. The document is what gets hashed,
//! diffed and handed to the event parser.

use std::fmt::Write as _;

use crate::fetch::FetchResult;

/// Row name used when a JSON entry has no `RowName`
const DEFAULT_ROW_NAME: &str = "Default.SafeZone.WaitTime";

/// Placeholder body for an empty untyped text entry
const EMPTY_TEXT_PLACEHOLDER: &str = "; (raw: empty text)";

/// Placeholder body for a binary entry
const BINARY_PLACEHOLDER: &str = "; (binary: content omitted)";

/// One fetched key and its classified result
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedEntry {
    pub key: String,
    pub result: FetchResult,
}

/// Ordered results of one poll
///
/// Order is insertion order of successful fetches, which is the input key
/// order filtered by success and the content filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    entries: Vec<FetchedEntry>,
}

impl FetchBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result after every entry pushed so far
    pub fn push(&mut self, key: impl Into<String>, result: FetchResult) {
        self.entries.push(FetchedEntry {
            key: key.into(),
            result,
        });
    }

    pub fn entries(&self) -> &[FetchedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One delimited section of the canonical document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Key the section was fetched from
    pub key: String,
    /// Body lines, without trailing newlines
    pub lines: Vec<String>,
}

/// Aggregated text artifact for one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalDocument {
    sections: Vec<Section>,
}

impl CanonicalDocument {
    /// Build the document from a batch, one section per entry in batch order
    pub fn from_batch(batch: &FetchBatch) -> Self {
        let sections = batch
            .entries()
            .iter()
            .map(|entry| Section {
                key: entry.key.clone(),
                lines: section_lines(&entry.key, &entry.result),
            })
            .collect();
        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Render the document text
    ///
    /// Every section is a `; ===== {key} =====` header, its body lines, and a
    /// blank separator line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "; ===== {} =====", section.key);
            for line in &section.lines {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

/// Body lines for one entry
fn section_lines(key: &str, result: &FetchResult) -> Vec<String> {
    match result {
        FetchResult::Json(value) => vec![synthesize_curve_row(key, value)],
        FetchResult::Directive(text) => text.lines().map(str::to_string).collect(),
        FetchResult::Text(text) if text.is_empty() => vec![EMPTY_TEXT_PLACEHOLDER.to_string()],
        FetchResult::Text(text) => text.lines().map(str::to_string).collect(),
        FetchResult::Binary(_) => vec![BINARY_PLACEHOLDER.to_string()],
    }
}

/// Synthesize the single directive line standing in for a JSON entry
///
/// `+CurveTable=/{key};RowUpdate;{RowName};{X};{Y}`
fn synthesize_curve_row(key: &str, value: &serde_json::Value) -> String {
    let row_name = value
        .get("RowName")
        .map(render_scalar)
        .unwrap_or_else(|| DEFAULT_ROW_NAME.to_string());
    let x = value.get("X").map(render_scalar).unwrap_or_else(|| "0".to_string());
    let y = value.get("Y").map(render_scalar).unwrap_or_else(|| "0".to_string());
    format!("+CurveTable=/{};RowUpdate;{};{};{}", key, row_name, x, y)
}

/// Strings render bare, everything else as JSON text
fn render_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sections_follow_batch_order() {
        let mut batch = FetchBatch::new();
        batch.push("zeta", FetchResult::Directive("+DataTable=/Z;RowUpdate;R;1".into()));
        batch.push("alpha", FetchResult::Directive("+DataTable=/A;RowUpdate;R;1".into()));

        let doc = CanonicalDocument::from_batch(&batch);
        let keys: Vec<&str> = doc.sections().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_render_layout() {
        let mut batch = FetchBatch::new();
        batch.push(
            "k1",
            FetchResult::Directive("[AssetHotfix]\r\n+DataTable=/A/B.B;RowUpdate;R;Val;3".into()),
        );
        batch.push("k2", FetchResult::Text(String::new()));
        batch.push("k3", FetchResult::Binary(vec![0xff]));
        batch.push("k4", FetchResult::Text("plain\ntext".into()));

        let text = CanonicalDocument::from_batch(&batch).render();
        let expected = "; ===== k1 =====\n\
                        [AssetHotfix]\n\
                        +DataTable=/A/B.B;RowUpdate;R;Val;3\n\
                        \n\
                        ; ===== k2 =====\n\
                        ; (raw: empty text)\n\
                        \n\
                        ; ===== k3 =====\n\
                        ; (binary: content omitted)\n\
                        \n\
                        ; ===== k4 =====\n\
                        plain\n\
                        text\n\
                        \n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_json_synthesizes_one_line() {
        let mut batch = FetchBatch::new();
        batch.push(
            "abc",
            FetchResult::Json(json!({"RowName": "Storm.Wait", "X": 1.5, "Y": 30, "Z": true})),
        );
        let doc = CanonicalDocument::from_batch(&batch);
        assert_eq!(
            doc.sections()[0].lines,
            vec!["+CurveTable=/abc;RowUpdate;Storm.Wait;1.5;30"]
        );
    }

    #[test]
    fn test_json_defaults() {
        let mut batch = FetchBatch::new();
        batch.push("abc", FetchResult::Json(json!({"unrelated": 1})));
        batch.push("def", FetchResult::Json(json!([1, 2])));
        let doc = CanonicalDocument::from_batch(&batch);
        assert_eq!(
            doc.sections()[0].lines,
            vec!["+CurveTable=/abc;RowUpdate;Default.SafeZone.WaitTime;0;0"]
        );
        assert_eq!(
            doc.sections()[1].lines,
            vec!["+CurveTable=/def;RowUpdate;Default.SafeZone.WaitTime;0;0"]
        );
    }

    #[test]
    fn test_empty_batch_renders_empty() {
        assert_eq!(CanonicalDocument::from_batch(&FetchBatch::new()).render(), "");
    }
}
