pub mod glob;
pub mod trie;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use globset::{GlobMatcher, GlobSet};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::content::ContentMatchers;
use crate::decision::{Decision, FileDiff, Match, MatchDetails, Severity};
use crate::rules::{RuleEvaluator, RuleResult};

pub use trie::PatternTrie;

/// A decision's `files` patterns, compiled.
///
/// A decision with any pattern that fails to compile matches nothing on the glob path;
/// the errors are reported as a failure for that decision.
struct CompiledPatterns {
    includes: Vec<(String, GlobMatcher)>,
    excludes: GlobSet,
    errors: Vec<String>,
}

impl CompiledPatterns {
    fn compile(decision: &Decision) -> Self {
        let mut errors = Vec::new();

        let mut includes = Vec::new();
        for pattern in decision.include_patterns().map(glob::normalize_path) {
            match glob::compile_glob(&pattern) {
                Ok(matcher) => includes.push((pattern, matcher)),
                Err(e) => errors.push(e.to_string()),
            }
        }

        let exclude_patterns: Vec<String> =
            decision.exclude_patterns().map(glob::normalize_path).collect();
        let excludes = match glob::build_globset(&exclude_patterns) {
            Ok(set) => set,
            Err(e) => {
                errors.push(e.to_string());
                GlobSet::empty()
            }
        };

        if !errors.is_empty() {
            tracing::warn!(
                decision = %decision.id,
                "decision disabled on the glob path: {}",
                errors.join("; ")
            );
        }

        Self {
            includes,
            excludes,
            errors,
        }
    }

    fn error(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }

    /// Indices of include patterns matching `path`; empty when an exclusion applies
    /// or any pattern failed to compile.
    fn matching_includes(&self, path: &str) -> Vec<usize> {
        if !self.errors.is_empty() || self.excludes.is_match(path) {
            return Vec::new();
        }
        self.includes
            .iter()
            .enumerate()
            .filter(|(_, (_, matcher))| matcher.is_match(path))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// A decision that could not be fully evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionFailure {
    pub decision_id: String,
    pub error: String,
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub active_decisions: usize,
    pub pattern_decisions: usize,
    pub rule_decisions: usize,
    pub files_checked: usize,
    pub matches: usize,
}

/// Matches plus the record of what could not be evaluated.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub matches: Vec<Match>,
    pub failures: Vec<DecisionFailure>,
    pub stats: MatchStats,
}

/// Matches partitioned by severity, each in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeverityGroups {
    pub critical: Vec<Match>,
    pub warning: Vec<Match>,
    pub info: Vec<Match>,
}

impl SeverityGroups {
    pub fn len(&self) -> usize {
        self.critical.len() + self.warning.len() + self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition matches by their decision's severity. Order within each group is preserved.
pub fn group_by_severity(matches: Vec<Match>) -> SeverityGroups {
    let mut groups = SeverityGroups::default();
    for m in matches {
        match m.decision.severity {
            Severity::Critical => groups.critical.push(m),
            Severity::Warning => groups.warning.push(m),
            Severity::Info => groups.info.push(m),
        }
    }
    groups
}

/// Entry point: evaluates active decisions against changed files.
pub struct FileMatcher {
    /// Active decisions, in declaration order. Indices are positions here.
    decisions: Vec<Arc<Decision>>,
    patterns: Vec<CompiledPatterns>,
    trie: PatternTrie,
    evaluator: Arc<RuleEvaluator>,
    config: EngineConfig,
}

impl FileMatcher {
    pub fn new(decisions: Vec<Decision>, config: EngineConfig) -> Self {
        let content = Arc::new(ContentMatchers::new(&config));
        Self::with_content_matchers(decisions, config, content)
    }

    /// Build with a shared [`ContentMatchers`], keeping its regex cache across runs.
    pub fn with_content_matchers(
        decisions: Vec<Decision>,
        config: EngineConfig,
        content: Arc<ContentMatchers>,
    ) -> Self {
        let active: Vec<Decision> = decisions.into_iter().filter(Decision::is_active).collect();
        let trie = PatternTrie::build(&active);
        let patterns = active.iter().map(CompiledPatterns::compile).collect();

        tracing::debug!(
            active = active.len(),
            indexed_patterns = trie.len(),
            "file matcher ready"
        );

        Self {
            decisions: active.into_iter().map(Arc::new).collect(),
            patterns,
            trie,
            evaluator: Arc::new(RuleEvaluator::new(content)),
            config,
        }
    }

    /// Active decisions in declaration order.
    pub fn decisions(&self) -> &[Arc<Decision>] {
        &self.decisions
    }

    pub fn content_matchers(&self) -> &ContentMatchers {
        self.evaluator.content()
    }

    /// Glob-only matching of every active decision's `files` patterns.
    ///
    /// Used when diffs are unavailable; structured rules are not consulted.
    pub fn find_matches(&self, changed_files: &[String]) -> Vec<Match> {
        let mut hits = PatternHits::default();
        for chunk in changed_files.chunks(self.config.chunk_size.max(1)) {
            for file in chunk {
                self.collect_pattern_hits(&glob::normalize_path(file), false, &mut hits);
            }
        }
        self.pattern_matches(hits)
            .into_iter()
            .map(|(_, m)| m)
            .collect()
    }

    pub async fn find_matches_with_diffs(&self, file_diffs: &[FileDiff]) -> Vec<Match> {
        self.find_matches_with_diffs_report(file_diffs).await.matches
    }

    /// Evaluate pattern-only decisions by glob and rule-based decisions by their rule
    /// trees, then order all matches by decision declaration order.
    pub async fn find_matches_with_diffs_report(&self, file_diffs: &[FileDiff]) -> MatchReport {
        let diffs: Arc<Vec<FileDiff>> = Arc::new(
            file_diffs
                .iter()
                .map(|diff| FileDiff {
                    filename: glob::normalize_path(&diff.filename),
                    ..diff.clone()
                })
                .collect(),
        );

        let (pattern_decisions, rule_decisions): (Vec<usize>, Vec<usize>) =
            (0..self.decisions.len()).partition(|&idx| self.decisions[idx].rules.is_none());

        let mut hits = PatternHits::default();
        for diff in diffs.iter() {
            self.collect_pattern_hits(&diff.filename, true, &mut hits);
        }
        let mut ordered = self.pattern_matches(hits);

        let mut failures: Vec<(usize, DecisionFailure)> = pattern_decisions
            .iter()
            .filter_map(|&idx| {
                let error = self.patterns[idx].error()?;
                Some((
                    idx,
                    DecisionFailure {
                        decision_id: self.decisions[idx].id.clone(),
                        error,
                    },
                ))
            })
            .collect();

        let (rule_matches, rule_failures) =
            self.evaluate_rule_decisions(&rule_decisions, &diffs).await;
        ordered.extend(rule_matches);
        ordered.sort_by_key(|(idx, _)| *idx);
        failures.extend(rule_failures);
        failures.sort_by_key(|(idx, _)| *idx);
        let failures: Vec<DecisionFailure> = failures.into_iter().map(|(_, f)| f).collect();

        let matches: Vec<Match> = ordered.into_iter().map(|(_, m)| m).collect();
        let stats = MatchStats {
            active_decisions: self.decisions.len(),
            pattern_decisions: pattern_decisions.len(),
            rule_decisions: rule_decisions.len(),
            files_checked: diffs.len(),
            matches: matches.len(),
        };
        tracing::info!(
            matches = stats.matches,
            failures = failures.len(),
            files = stats.files_checked,
            "decision evaluation complete"
        );

        MatchReport {
            matches,
            failures,
            stats,
        }
    }

    fn collect_pattern_hits(&self, path: &str, pattern_only: bool, hits: &mut PatternHits) {
        for idx in self.trie.find_candidates(path) {
            if pattern_only && self.decisions[idx].rules.is_some() {
                continue;
            }
            for pattern_idx in self.patterns[idx].matching_includes(path) {
                hits.entry((idx, pattern_idx))
                    .or_default()
                    .insert(path.to_string());
            }
        }
    }

    /// One match per (decision, matched pattern), keyed by decision index.
    fn pattern_matches(&self, hits: PatternHits) -> Vec<(usize, Match)> {
        hits.into_iter()
            .filter_map(|((idx, pattern_idx), files)| {
                let files: Vec<String> = files.into_iter().collect();
                let pattern = self.patterns[idx].includes[pattern_idx].0.clone();
                let first = files.first()?.clone();
                Some((
                    idx,
                    Match {
                        file: first,
                        decision: Arc::clone(&self.decisions[idx]),
                        matched_pattern: pattern.clone(),
                        match_details: Some(MatchDetails {
                            matched_files: files,
                            matched_patterns: vec![pattern],
                            rule_depth: None,
                            error: None,
                        }),
                    },
                ))
            })
            .collect()
    }

    /// Evaluate rule-based decisions in sequential batches; decisions within a batch run
    /// concurrently. A failing or panicking decision never affects its siblings.
    async fn evaluate_rule_decisions(
        &self,
        indices: &[usize],
        diffs: &Arc<Vec<FileDiff>>,
    ) -> (Vec<(usize, Match)>, Vec<(usize, DecisionFailure)>) {
        let mut matches = Vec::new();
        let mut failures = Vec::new();

        for (batch_no, batch) in indices.chunks(self.config.batch_size.max(1)).enumerate() {
            tracing::debug!(batch = batch_no, size = batch.len(), "evaluating rule batch");

            let handles: Vec<_> = batch
                .iter()
                .map(|&idx| {
                    let evaluator = Arc::clone(&self.evaluator);
                    let decision = Arc::clone(&self.decisions[idx]);
                    let diffs = Arc::clone(diffs);
                    let handle = tokio::spawn(async move {
                        evaluator.evaluate_decision(&decision, &diffs).await
                    });
                    (idx, handle)
                })
                .collect();

            for (idx, handle) in handles {
                let decision = &self.decisions[idx];
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(decision = %decision.id, "rule evaluation aborted: {e}");
                        failures.push((
                            idx,
                            DecisionFailure {
                                decision_id: decision.id.clone(),
                                error: e.to_string(),
                            },
                        ));
                        continue;
                    }
                };

                if let Some(error) = &result.error {
                    tracing::warn!(decision = %decision.id, "decision partially evaluated: {error}");
                    failures.push((
                        idx,
                        DecisionFailure {
                            decision_id: decision.id.clone(),
                            error: error.clone(),
                        },
                    ));
                }
                if result.matched {
                    matches.push((idx, rule_match(decision, result)));
                }
            }
        }

        (matches, failures)
    }
}

type PatternHits = BTreeMap<(usize, usize), BTreeSet<String>>;

fn rule_match(decision: &Arc<Decision>, result: RuleResult) -> Match {
    Match {
        file: result.matched_files.first().cloned().unwrap_or_default(),
        decision: Arc::clone(decision),
        matched_pattern: result.matched_patterns.join(", "),
        match_details: Some(MatchDetails {
            matched_files: result.matched_files,
            matched_patterns: result.matched_patterns,
            rule_depth: Some(result.depth),
            error: result.error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(id: &str, severity: Severity, files: &[&str]) -> Decision {
        Decision {
            id: id.into(),
            title: format!("{id} title"),
            status: Default::default(),
            severity,
            files: files.iter().map(|f| f.to_string()).collect(),
            rules: None,
        }
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let compiled =
            CompiledPatterns::compile(&decision("A", Severity::Info, &["src/**", "!src/gen/**"]));
        assert_eq!(compiled.matching_includes("src/main.rs"), vec![0]);
        assert!(compiled.matching_includes("src/gen/x.rs").is_empty());
    }

    #[test]
    fn bad_include_disables_decision() {
        let compiled = CompiledPatterns::compile(&decision("A", Severity::Info, &["src/[", "*.md"]));
        assert!(compiled.matching_includes("README.md").is_empty());
        assert!(compiled.error().unwrap().contains("src/["));
    }

    #[test]
    fn bad_exclude_disables_decision() {
        let compiled =
            CompiledPatterns::compile(&decision("A", Severity::Info, &["src/**", "!src/gen/[x"]));
        assert!(compiled.matching_includes("src/gen/[x").is_empty());
        assert!(compiled.matching_includes("src/main.rs").is_empty());
        assert!(compiled.error().is_some());
    }

    #[test]
    fn find_matches_groups_files_per_pattern() {
        let matcher = FileMatcher::new(
            vec![decision("A", Severity::Warning, &["src/*.rs", "*.toml"])],
            EngineConfig::default(),
        );
        let files = vec![
            "src/b.rs".to_string(),
            "Cargo.toml".to_string(),
            "src/a.rs".to_string(),
        ];
        let matches = matcher.find_matches(&files);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].matched_pattern, "src/*.rs");
        assert_eq!(matches[0].file, "src/a.rs");
        assert_eq!(
            matches[0].match_details.as_ref().unwrap().matched_files,
            vec!["src/a.rs".to_string(), "src/b.rs".to_string()]
        );
        assert_eq!(matches[1].matched_pattern, "*.toml");
    }

    #[test]
    fn group_by_severity_preserves_order() {
        let matcher = FileMatcher::new(
            vec![
                decision("C1", Severity::Critical, &["a/*"]),
                decision("I1", Severity::Info, &["a/*"]),
                decision("C2", Severity::Critical, &["a/*"]),
            ],
            EngineConfig::default(),
        );
        let groups = group_by_severity(matcher.find_matches(&["a/x".to_string()]));
        let ids: Vec<&str> = groups.critical.iter().map(|m| m.decision.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2"]);
        assert_eq!(groups.info.len(), 1);
        assert!(groups.warning.is_empty());
        assert_eq!(groups.len(), 3);
    }
}
