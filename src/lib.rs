//! Evaluates declared architectural decisions against the files changed in a revision.
//!
//! [`FileMatcher`] is the entry point. Decisions with only `files` globs are matched
//! through a [`PatternTrie`]; decisions with structured rules go through the
//! [`RuleEvaluator`] and the [`ContentMatchers`].

pub mod cli;
pub mod config;
pub mod content;
pub mod decision;
pub mod error;
pub mod matcher;
pub mod rules;

pub use config::EngineConfig;
pub use content::ContentMatchers;
pub use decision::{
    ContentRule, Decision, DecisionStatus, FileDiff, FileRule, FileStatus, Match, MatchDetails,
    MatchMode, RuleCondition, RuleNode, Severity,
};
pub use error::{DecisionGuardError, Result};
pub use matcher::{group_by_severity, FileMatcher, MatchReport, PatternTrie, SeverityGroups};
pub use rules::{RuleEvaluator, RuleResult, MAX_RULE_DEPTH};
