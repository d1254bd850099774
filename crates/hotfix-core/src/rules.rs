//! Rule groups and cross-triggers
//!
//! A [`RuleSet`] is loaded once per run from YAML and decides which groups
//! fire for a set of [`ChangeEvent`]s. Each group fires at most once per
//! evaluation: base groups first, in file order, then cross-triggers in file
//! order.
//!
//! ```yaml
//! groups:
//!   - name: loot
//!     match: { method: prefix, tables: ["Loot"] }
//!     ops: [RowUpdate]
//!     cmd: ["./rebuild-loot.sh"]
//! cross_triggers:
//!   - source: { method: exact, tables: ["SpawnRates"], ops: [RowUpdate] }
//!     target_group: loot
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::ChangeEvent;

/// How a matcher compares table names against its patterns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Set membership
    #[default]
    Exact,
    /// Unanchored regex search
    Regex,
    Prefix,
    Suffix,
}

/// Table matcher as written in the rule file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default)]
    pub method: MatchMethod,

    #[serde(default)]
    pub tables: Vec<String>,
}

/// One rule group as written in the rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,

    #[serde(rename = "match", default)]
    pub matcher: MatcherConfig,

    /// Operations this group reacts to
    #[serde(default)]
    pub ops: Vec<String>,

    /// Action argv
    #[serde(default)]
    pub cmd: Vec<String>,
}

/// Source side of a cross-trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossSourceConfig {
    #[serde(default)]
    pub method: MatchMethod,

    #[serde(default)]
    pub tables: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ops: Option<Vec<String>>,
}

/// One cross-trigger as written in the rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossTriggerConfig {
    pub source: CrossSourceConfig,

    /// Fallback source operations when `source.ops` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ops: Option<Vec<String>>,

    pub target_group: String,
}

/// Whole rule file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub groups: Vec<GroupConfig>,

    #[serde(default)]
    pub cross_triggers: Vec<CrossTriggerConfig>,
}

/// Compiled table matcher
#[derive(Debug, Clone)]
enum TableMatcher {
    Exact(HashSet<String>),
    Regex(Vec<Regex>),
    Prefix(Vec<String>),
    Suffix(Vec<String>),
}

impl TableMatcher {
    fn compile(method: MatchMethod, tables: &[String]) -> Result<Self> {
        Ok(match method {
            MatchMethod::Exact => TableMatcher::Exact(tables.iter().cloned().collect()),
            MatchMethod::Regex => TableMatcher::Regex(
                tables
                    .iter()
                    .map(|pattern| Regex::new(pattern))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            MatchMethod::Prefix => TableMatcher::Prefix(tables.to_vec()),
            MatchMethod::Suffix => TableMatcher::Suffix(tables.to_vec()),
        })
    }

    fn matches(&self, table: &str) -> bool {
        match self {
            TableMatcher::Exact(names) => names.contains(table),
            TableMatcher::Regex(patterns) => patterns.iter().any(|re| re.is_match(table)),
            TableMatcher::Prefix(prefixes) => prefixes.iter().any(|p| table.starts_with(p.as_str())),
            TableMatcher::Suffix(suffixes) => suffixes.iter().any(|s| table.ends_with(s.as_str())),
        }
    }
}

/// Matcher plus allowed operations
#[derive(Debug, Clone)]
struct EventFilter {
    matcher: TableMatcher,
    ops: HashSet<String>,
}

impl EventFilter {
    fn accepts(&self, event: &ChangeEvent) -> bool {
        self.ops.contains(&event.operation) && self.matcher.matches(&event.table)
    }
}

#[derive(Debug, Clone)]
struct RuleGroup {
    name: String,
    filter: EventFilter,
    command: Vec<String>,
}

#[derive(Debug, Clone)]
struct CrossTrigger {
    filter: EventFilter,
    /// Index into `RuleSet::groups`
    target: usize,
}

/// Why a group fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireCause {
    /// The group's own matcher accepted `events` events
    Matched { events: usize },
    /// A cross-trigger's source accepted `events` events
    CrossTrigger { index: usize, events: usize },
}

/// A group selected for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredGroup {
    pub name: String,
    /// The group's own configured argv
    pub command: Vec<String>,
    pub cause: FireCause,
}

/// Names of groups already fired in one evaluation
#[derive(Debug, Default)]
pub struct FiredSet {
    names: HashSet<String>,
}

impl FiredSet {
    /// Record a firing; `false` if the group already fired
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Compiled, validated rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    groups: Vec<RuleGroup>,
    cross_triggers: Vec<CrossTrigger>,
}

impl RuleSet {
    /// Compile a rule configuration
    ///
    /// # Errors
    ///
    /// - `Error::Config`: empty or duplicate group name, empty command, or a
    ///   cross-trigger naming an undefined group
    /// - `Error::Regex`: a `regex` matcher pattern does not compile
    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        let mut groups = Vec::with_capacity(config.groups.len());
        let mut seen = HashSet::new();

        for group in &config.groups {
            if group.name.trim().is_empty() {
                return Err(Error::config("Rule group name cannot be empty"));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(Error::config(format!(
                    "Duplicate rule group: {}",
                    group.name
                )));
            }
            if group.cmd.is_empty() || group.cmd[0].trim().is_empty() {
                return Err(Error::config(format!(
                    "Rule group {} has no command",
                    group.name
                )));
            }
            groups.push(RuleGroup {
                name: group.name.clone(),
                filter: EventFilter {
                    matcher: TableMatcher::compile(group.matcher.method, &group.matcher.tables)?,
                    ops: group.ops.iter().cloned().collect(),
                },
                command: group.cmd.clone(),
            });
        }

        let mut cross_triggers = Vec::with_capacity(config.cross_triggers.len());
        for cross in &config.cross_triggers {
            let target = groups
                .iter()
                .position(|g| g.name == cross.target_group)
                .ok_or_else(|| {
                    Error::config(format!(
                        "Cross-trigger targets undefined group: {}",
                        cross.target_group
                    ))
                })?;
            let ops = cross
                .source
                .ops
                .as_ref()
                .or(cross.ops.as_ref())
                .cloned()
                .unwrap_or_default();
            cross_triggers.push(CrossTrigger {
                filter: EventFilter {
                    matcher: TableMatcher::compile(cross.source.method, &cross.source.tables)?,
                    ops: ops.into_iter().collect(),
                },
                target,
            });
        }

        Ok(Self {
            groups,
            cross_triggers,
        })
    }

    /// Parse and compile a YAML rule file's contents
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: RuleConfig = serde_yaml::from_str(text)?;
        Self::from_config(&config)
    }

    /// Load and compile a YAML rule file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read rule file {}: {}", path.display(), e))
        })?;
        let rules = Self::from_yaml_str(&text)?;
        tracing::info!(
            "Loaded {} rule group(s) and {} cross-trigger(s) from {}",
            rules.groups.len(),
            rules.cross_triggers.len(),
            path.display()
        );
        Ok(rules)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn cross_trigger_count(&self) -> usize {
        self.cross_triggers.len()
    }

    /// Decide which groups fire for a set of events
    ///
    /// When `allow` is given, events for other tables are dropped before any
    /// rule is consulted. The output is in firing order: matching base groups
    /// in configuration order, then cross-trigger targets in cross-trigger
    /// order. No group appears twice.
    pub fn evaluate(
        &self,
        events: &[ChangeEvent],
        allow: Option<&BTreeSet<String>>,
    ) -> Vec<FiredGroup> {
        let events: Vec<&ChangeEvent> = events
            .iter()
            .filter(|e| allow.is_none_or(|tables| tables.contains(&e.table)))
            .collect();

        let mut fired = FiredSet::default();
        let mut out = Vec::new();

        for group in &self.groups {
            let matched = events.iter().filter(|e| group.filter.accepts(e)).count();
            if matched > 0 && fired.insert(&group.name) {
                tracing::debug!("Group {} matched {} event(s)", group.name, matched);
                out.push(FiredGroup {
                    name: group.name.clone(),
                    command: group.command.clone(),
                    cause: FireCause::Matched { events: matched },
                });
            }
        }

        for (index, cross) in self.cross_triggers.iter().enumerate() {
            let matched = events.iter().filter(|e| cross.filter.accepts(e)).count();
            let target = &self.groups[cross.target];
            if matched > 0 && fired.insert(&target.name) {
                tracing::debug!(
                    "Cross-trigger #{} fired {} ({} event(s))",
                    index,
                    target.name,
                    matched
                );
                out.push(FiredGroup {
                    name: target.name.clone(),
                    command: target.command.clone(),
                    cause: FireCause::CrossTrigger {
                        index,
                        events: matched,
                    },
                });
            }
        }

        out
    }
}
