// # Snapshot Store
//
// Owns the canonical document file and its replacement.
//
// ## Commit protocol
//
// 1. `stage` writes the candidate to `{document}.tmp` (flushed and synced)
// 2. `commit` compares SHA-256 digests of candidate and previous document
// 3. Equal digests: the candidate is removed, the previous file is untouched
// 4. Otherwise the table diff is computed, then the candidate is renamed over
//    the previous document
//
// A reader of the document path sees either the old or the new snapshot,
// never a partial write.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::aggregate::CanonicalDocument;
use crate::diff::changed_tables;
use crate::error::{Error, Result};

/// Result of committing a candidate snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Candidate identical to the previous document
    Unchanged,
    /// Document replaced; `tables` is sorted and may be empty
    Changed { tables: Vec<String> },
}

impl DiffOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, DiffOutcome::Changed { .. })
    }

    /// Changed table names (empty when unchanged)
    pub fn tables(&self) -> &[String] {
        match self {
            DiffOutcome::Unchanged => &[],
            DiffOutcome::Changed { tables } => tables,
        }
    }
}

/// Candidate written to disk but not yet committed
#[derive(Debug, Clone)]
pub struct StagedSnapshot {
    temp_path: PathBuf,
    text: String,
    digest: String,
}

impl StagedSnapshot {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Hex SHA-256 of the candidate
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Canonical document on disk
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Candidate path: the document's file name with `.tmp` appended
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read the committed document, `None` if there is none yet
    pub async fn read_current(&self) -> Result<Option<String>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::snapshot(format!(
                "Failed to read document {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(text))
    }

    /// Write the candidate document next to the committed one
    pub async fn stage(&self, document: &CanonicalDocument) -> Result<StagedSnapshot> {
        let text = document.render();
        let temp_path = self.temp_path();
        write_synced(&temp_path, text.as_bytes()).await?;

        let digest = sha256_hex(text.as_bytes());
        tracing::debug!(
            "Staged candidate {} ({} bytes, sha256 {})",
            temp_path.display(),
            text.len(),
            digest
        );
        Ok(StagedSnapshot {
            temp_path,
            text,
            digest,
        })
    }

    /// Compare the staged candidate with the committed document and replace it
    /// when they differ
    pub async fn commit(&self, staged: StagedSnapshot) -> Result<DiffOutcome> {
        let previous = self.read_current().await?;

        if let Some(previous) = &previous
            && sha256_hex(previous.as_bytes()) == staged.digest
        {
            fs::remove_file(&staged.temp_path).await.map_err(|e| {
                Error::snapshot(format!(
                    "Failed to remove candidate {}: {}",
                    staged.temp_path.display(),
                    e
                ))
            })?;
            tracing::info!("No change in {}", self.path.display());
            return Ok(DiffOutcome::Unchanged);
        }

        let tables = changed_tables(previous.as_deref().unwrap_or(""), &staged.text);

        fs::rename(&staged.temp_path, &self.path).await.map_err(|e| {
            Error::snapshot(format!(
                "Failed to rename {} to {}: {}",
                staged.temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        if tables.is_empty() {
            tracing::info!(
                "{} updated, no table-level changes",
                self.path.display()
            );
        } else {
            tracing::info!(
                "{} updated, changed tables: {}",
                self.path.display(),
                tables.join(", ")
            );
        }
        Ok(DiffOutcome::Changed { tables })
    }
}

/// Write the changed-tables artifact atomically
///
/// Pretty-printed JSON array; an empty list is written as `[]`.
pub async fn write_changed_tables(path: &Path, tables: &[String]) -> Result<()> {
    let json = if tables.is_empty() {
        "[]".to_string()
    } else {
        serde_json::to_string_pretty(tables)?
    };

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    write_synced(&temp, json.as_bytes()).await?;
    fs::rename(&temp, path).await.map_err(|e| {
        Error::snapshot(format!(
            "Failed to rename {} to {}: {}",
            temp.display(),
            path.display(),
            e
        ))
    })?;
    tracing::debug!("Changed tables written to {}", path.display());
    Ok(())
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Create parent directories, then write, flush and sync a file
async fn write_synced(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::snapshot(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let mut file = fs::File::create(path).await.map_err(|e| {
        Error::snapshot(format!("Failed to create {}: {}", path.display(), e))
    })?;
    file.write_all(contents).await.map_err(|e| {
        Error::snapshot(format!("Failed to write {}: {}", path.display(), e))
    })?;
    file.flush().await.map_err(|e| {
        Error::snapshot(format!("Failed to flush {}: {}", path.display(), e))
    })?;
    file.sync_all().await.map_err(|e| {
        Error::snapshot(format!("Failed to sync {}: {}", path.display(), e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::FetchBatch;
    use crate::fetch::FetchResult;
    use tempfile::tempdir;

    fn document(lines: &str) -> CanonicalDocument {
        let mut batch = FetchBatch::new();
        batch.push("key", FetchResult::Directive(lines.to_string()));
        CanonicalDocument::from_batch(&batch)
    }

    #[tokio::test]
    async fn test_first_commit_reports_all_tables() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("out").join("Hotfix.ini"));

        let staged = store
            .stage(&document("+DataTable=/X/Foo;RowUpdate;R1;1"))
            .await
            .unwrap();
        assert!(store.temp_path().exists());

        let outcome = store.commit(staged).await.unwrap();
        assert_eq!(
            outcome,
            DiffOutcome::Changed {
                tables: vec!["Foo".to_string()]
            }
        );
        assert!(store.path().exists());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_identical_bytes_unchanged() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("Hotfix.ini"));
        let doc = document("+DataTable=/X/Foo;RowUpdate;R1;1");

        let staged = store.stage(&doc).await.unwrap();
        store.commit(staged).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let staged = store.stage(&doc).await.unwrap();
        assert_eq!(store.commit(staged).await.unwrap(), DiffOutcome::Unchanged);
        assert!(!store.temp_path().exists());
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_changed_without_tables() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("Hotfix.ini"));

        let staged = store
            .stage(&document("+CurveTable=/a;RowUpdate;R;0;0"))
            .await
            .unwrap();
        store.commit(staged).await.unwrap();

        let staged = store
            .stage(&document("+CurveTable=/a;RowUpdate;R;1;0"))
            .await
            .unwrap();
        let outcome = store.commit(staged).await.unwrap();
        assert_eq!(outcome, DiffOutcome::Changed { tables: vec![] });
        assert!(outcome.is_changed());
        assert!(outcome.tables().is_empty());
    }

    #[tokio::test]
    async fn test_value_change_detected() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("Hotfix.ini"));

        let staged = store
            .stage(&document("+DataTable=/X/Foo;RowUpdate;R1;1\n+DataTable=/X/Bar;RowUpdate;R;1"))
            .await
            .unwrap();
        store.commit(staged).await.unwrap();

        let staged = store
            .stage(&document("+DataTable=/X/Bar;RowUpdate;R;1\n+DataTable=/X/Foo;RowUpdate;R1;2"))
            .await
            .unwrap();
        assert_eq!(
            store.commit(staged).await.unwrap().tables(),
            &["Foo".to_string()]
        );
        let committed = store.read_current().await.unwrap().unwrap();
        assert!(committed.contains("R1;2"));
    }

    #[tokio::test]
    async fn test_changed_tables_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changed_tables.json");

        write_changed_tables(&path, &["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        let parsed: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, vec!["A", "B"]);

        write_changed_tables(&path, &[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
