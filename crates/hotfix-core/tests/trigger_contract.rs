//! Contract Test: Trigger-Only Mode
//!
//! Rules evaluated against the committed document, without any network call.
//!
//! Constraints verified:
//! - The allow-list restricts events before any rule sees them
//! - Cross-triggers fire their target once, with the target's own command
//! - A group fires at most once however many events match it
//! - Malformed lines are skipped without aborting evaluation

mod common;

use common::*;
use hotfix_core::error::Error;
use hotfix_core::{HotfixEngine, RuleSet};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::tempdir;

const RULES: &str = r#"
groups:
  - name: loot
    match: { tables: ["Loot"] }
    ops: [RowUpdate]
    cmd: ["update-loot"]
  - name: storm
    match: { method: suffix, tables: ["_Storm"] }
    ops: [RowUpdate]
    cmd: ["update-storm"]
cross_triggers:
  - source: { method: regex, tables: ["^Spawn"] }
    ops: [RowUpdate]
    target_group: loot
"#;

const DOCUMENT: &str = "\
; ===== k1 =====
+DataTable=/Game/SpawnRates.SpawnRates;RowUpdate;R1;1
+DataTable=/Game/Zone_Storm;RowUpdate;A;1
+DataTable=/Game/Zone_Storm;RowUpdate;B;1
+DataTable=broken
+DataTable=/Game/Zone_Storm;RowUpdate;C;1

";

fn engine(paths: &TestPaths, runner: &RecordingRunner, rules: Option<RuleSet>) -> HotfixEngine {
    HotfixEngine::new(
        Box::new(ScriptedStore::new()),
        Box::new(RecordingNotifier::new()),
        Arc::new(runner.clone()),
        rules,
        test_config(paths, &["k1"]),
    )
    .unwrap()
}

#[tokio::test]
async fn cross_trigger_and_once_per_group() {
    let dir = tempdir().unwrap();
    let paths = TestPaths::new(dir.path());
    std::fs::write(&paths.document, DOCUMENT).unwrap();
    let runner = RecordingRunner::new();

    let engine = engine(&paths, &runner, Some(RuleSet::from_yaml_str(RULES).unwrap()));
    let reports = engine.run_trigger(None).await.unwrap();

    let groups: Vec<&str> = reports.iter().map(|r| r.group.as_str()).collect();
    // Base groups first, then cross-trigger targets
    assert_eq!(groups, vec!["storm", "loot"]);
    assert_eq!(runner.calls(), vec!["update-storm", "update-loot"]);
}

#[tokio::test]
async fn allow_list_restricts_tables() {
    let dir = tempdir().unwrap();
    let paths = TestPaths::new(dir.path());
    std::fs::write(&paths.document, DOCUMENT).unwrap();
    let runner = RecordingRunner::new();

    let engine = engine(&paths, &runner, Some(RuleSet::from_yaml_str(RULES).unwrap()));
    let allow: BTreeSet<String> = ["SpawnRates".to_string()].into_iter().collect();
    let reports = engine.run_trigger(Some(&allow)).await.unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].group, "loot");
}

#[tokio::test]
async fn failing_action_reported_and_later_ones_run() {
    let dir = tempdir().unwrap();
    let paths = TestPaths::new(dir.path());
    std::fs::write(&paths.document, DOCUMENT).unwrap();
    let runner = RecordingRunner::new().with_exit_code(4);

    let engine = engine(&paths, &runner, Some(RuleSet::from_yaml_str(RULES).unwrap()));
    let reports = engine.run_trigger(None).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.code == 4));
}

#[tokio::test]
async fn missing_rules_or_document_fail() {
    let dir = tempdir().unwrap();
    let paths = TestPaths::new(dir.path());
    let runner = RecordingRunner::new();

    let without_rules = engine(&paths, &runner, None);
    assert!(matches!(
        without_rules.run_trigger(None).await,
        Err(Error::Config(_))
    ));

    let without_document = engine(&paths, &runner, Some(RuleSet::from_yaml_str(RULES).unwrap()));
    assert!(matches!(
        without_document.run_trigger(None).await,
        Err(Error::Snapshot(_))
    ));
    assert_eq!(runner.call_count(), 0);
}
