use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a decision. Only `Active` decisions are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    #[default]
    Active,
    Deprecated,
    Superseded,
    Archived,
}

/// How loudly a triggered decision is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "error", alias = "high")]
    Critical,
    #[default]
    #[serde(alias = "warn")]
    Warning,
    #[serde(alias = "low", alias = "note")]
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionStatus::Active => write!(f, "active"),
            DecisionStatus::Deprecated => write!(f, "deprecated"),
            DecisionStatus::Superseded => write!(f, "superseded"),
            DecisionStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A declared architectural decision, scoped to files by glob patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier, used for display.
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub status: DecisionStatus,

    #[serde(default)]
    pub severity: Severity,

    /// Glob patterns. A leading `!` marks an exclusion.
    #[serde(default)]
    pub files: Vec<String>,

    /// Structured conditions. Decisions without rules are matched on `files` alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleNode>,
}

impl Decision {
    pub fn is_active(&self) -> bool {
        self.status == DecisionStatus::Active
    }

    /// Patterns without the `!` exclusion marker.
    pub fn include_patterns(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(String::as_str)
            .filter(|p| !p.starts_with('!'))
    }

    /// Exclusion patterns with the leading `!` stripped.
    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.files.iter().filter_map(|p| p.strip_prefix('!'))
    }
}

/// A node of a decision's rule tree: either a boolean group or a single file rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleNode {
    Condition(RuleCondition),
    File(FileRule),
}

/// Logical combinator for a [`RuleCondition`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Logical OR.
    #[default]
    Any,
    /// Logical AND.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    #[serde(default)]
    pub match_mode: MatchMode,
    pub conditions: Vec<RuleNode>,
}

/// A glob-scoped rule, optionally refined by content tests on the added lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRule {
    pub pattern: String,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub exclude: Vec<String>,

    /// Implicit OR across rules: a file counts when any one of them fires.
    #[serde(
        default,
        alias = "content",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub content_rules: Vec<ContentRule>,
}

impl FileRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exclude: Vec::new(),
            content_rules: Vec::new(),
        }
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn with_content(mut self, rule: ContentRule) -> Self {
        self.content_rules.push(rule);
        self
    }
}

/// A test over the added lines of one file's diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ContentRule {
    /// Plain substring containment.
    #[serde(rename = "string")]
    Substring { patterns: Vec<String> },
    Regex {
        pattern: String,
        #[serde(default)]
        flags: String,
    },
    /// Inclusive range of destination line numbers.
    LineRange { start: usize, end: usize },
    FullFile,
    /// Dot-separated key paths, checked heuristically against `"key":` fragments.
    JsonPath { paths: Vec<String> },
}

impl ContentRule {
    pub fn mode(&self) -> &'static str {
        match self {
            ContentRule::Substring { .. } => "string",
            ContentRule::Regex { .. } => "regex",
            ContentRule::LineRange { .. } => "line_range",
            ContentRule::FullFile => "full_file",
            ContentRule::JsonPath { .. } => "json_path",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    #[default]
    Modified,
    Renamed,
}

/// One changed file as reported by the revision-control provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub filename: String,

    #[serde(default)]
    pub status: FileStatus,

    #[serde(default)]
    pub additions: u32,

    #[serde(default)]
    pub deletions: u32,

    #[serde(default)]
    pub changes: u32,

    /// Unified-diff hunks for this file. Absent for binary files.
    #[serde(default)]
    pub patch: Option<String>,
}

impl FileDiff {
    pub fn new(filename: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: FileStatus::Modified,
            additions: 0,
            deletions: 0,
            changes: 0,
            patch: Some(patch.into()),
        }
    }
}

/// A triggered decision and the evidence that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub file: String,
    pub decision: Arc<Decision>,
    /// Human-readable evidence.
    pub matched_pattern: String,
    pub match_details: Option<MatchDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchDetails {
    pub matched_files: Vec<String>,
    pub matched_patterns: Vec<String>,
    /// Depth in the rule tree at which the verdict was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}
