use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};

use crate::content::ContentMatchers;
use crate::decision::{Decision, FileDiff, FileRule, MatchMode, RuleCondition, RuleNode};
use crate::error::{DecisionGuardError, Result};
use crate::matcher::glob::{build_globset, compile_glob, normalize_path};

/// Deepest rule-tree level that is evaluated. The root is level 0.
pub const MAX_RULE_DEPTH: usize = 10;

/// Verdict of a rule node, with the evidence that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleResult {
    pub matched: bool,
    /// Sorted, deduplicated.
    pub matched_files: Vec<String>,
    /// Sorted, deduplicated.
    pub matched_patterns: Vec<String>,
    pub depth: usize,
    /// Diagnostics from branches that could not be fully evaluated.
    pub error: Option<String>,
}

impl RuleResult {
    fn unmatched(depth: usize) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    fn failed(depth: usize, error: impl std::fmt::Display) -> Self {
        Self {
            depth,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Evaluates decision rule trees against a set of changed files.
pub struct RuleEvaluator {
    content: Arc<ContentMatchers>,
}

impl RuleEvaluator {
    pub fn new(content: Arc<ContentMatchers>) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &ContentMatchers {
        &self.content
    }

    /// Evaluate a decision's rule tree from the root. Decisions without rules never match.
    pub async fn evaluate_decision(&self, decision: &Decision, files: &[FileDiff]) -> RuleResult {
        match &decision.rules {
            Some(root) => self.evaluate(root, files, 0).await,
            None => RuleResult::unmatched(0),
        }
    }

    /// Evaluate `node` at `depth`. Never fails: errors become unmatched results.
    pub fn evaluate<'a>(
        &'a self,
        node: &'a RuleNode,
        files: &'a [FileDiff],
        depth: usize,
    ) -> BoxFuture<'a, RuleResult> {
        async move {
            if depth > MAX_RULE_DEPTH {
                let err = DecisionGuardError::DepthExceeded {
                    depth,
                    max: MAX_RULE_DEPTH,
                };
                tracing::warn!("{err}");
                return RuleResult::failed(depth, err);
            }
            match node {
                RuleNode::File(rule) => self.evaluate_file_rule(rule, files, depth).await,
                RuleNode::Condition(condition) => {
                    self.evaluate_condition(condition, files, depth).await
                }
            }
        }
        .boxed()
    }

    async fn evaluate_condition(
        &self,
        condition: &RuleCondition,
        files: &[FileDiff],
        depth: usize,
    ) -> RuleResult {
        let branches = join_all(
            condition
                .conditions
                .iter()
                .map(|child| self.evaluate(child, files, depth + 1)),
        )
        .await;
        combine(condition.match_mode, &branches, depth)
    }

    /// Evaluate a single file rule. Errors are confined to this rule.
    pub async fn evaluate_file_rule(
        &self,
        rule: &FileRule,
        files: &[FileDiff],
        depth: usize,
    ) -> RuleResult {
        match self.try_evaluate_file_rule(rule, files, depth).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(pattern = %rule.pattern, "file rule failed: {e}");
                RuleResult::failed(depth, e)
            }
        }
    }

    async fn try_evaluate_file_rule(
        &self,
        rule: &FileRule,
        files: &[FileDiff],
        depth: usize,
    ) -> Result<RuleResult> {
        let pattern = normalize_path(&rule.pattern);
        let include = compile_glob(&pattern)?;
        let excludes: Vec<String> = rule.exclude.iter().map(|p| normalize_path(p)).collect();
        let exclude = build_globset(&excludes)?;

        let in_scope: Vec<(String, &FileDiff)> = files
            .iter()
            .map(|file| (normalize_path(&file.filename), file))
            .filter(|(name, _)| include.is_match(name) && !exclude.is_match(name))
            .collect();

        if in_scope.is_empty() {
            return Ok(RuleResult::unmatched(depth));
        }

        if rule.content_rules.is_empty() {
            let matched_files: BTreeSet<String> =
                in_scope.into_iter().map(|(name, _)| name).collect();
            return Ok(RuleResult {
                matched: true,
                matched_files: matched_files.into_iter().collect(),
                matched_patterns: vec![pattern],
                depth,
                error: None,
            });
        }

        let mut matched_files = BTreeSet::new();
        let mut matched_patterns = BTreeSet::new();
        let mut errors = Vec::new();
        for (name, file) in in_scope {
            let verdict = self.content.match_file(&rule.content_rules, file).await;
            if verdict.matched() {
                matched_files.insert(name);
                matched_patterns.extend(verdict.evidence);
            }
            errors.extend(verdict.errors);
        }

        Ok(RuleResult {
            matched: !matched_files.is_empty(),
            matched_files: matched_files.into_iter().collect(),
            matched_patterns: matched_patterns.into_iter().collect(),
            depth,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        })
    }
}

/// Combine settled branches. Evidence comes from matching branches only; errors from all.
/// An empty group never matches.
fn combine(mode: MatchMode, branches: &[RuleResult], depth: usize) -> RuleResult {
    let matched = !branches.is_empty()
        && match mode {
            MatchMode::Any => branches.iter().any(|b| b.matched),
            MatchMode::All => branches.iter().all(|b| b.matched),
        };

    let mut files = BTreeSet::new();
    let mut patterns = BTreeSet::new();
    let mut errors = Vec::new();
    for branch in branches {
        if branch.matched {
            files.extend(branch.matched_files.iter().cloned());
            patterns.extend(branch.matched_patterns.iter().cloned());
        }
        if let Some(error) = &branch.error {
            errors.push(error.clone());
        }
    }

    RuleResult {
        matched,
        matched_files: files.into_iter().collect(),
        matched_patterns: patterns.into_iter().collect(),
        depth,
        error: (!errors.is_empty()).then(|| errors.join("; ")),
    }
}
