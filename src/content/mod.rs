pub mod cache;
pub mod diff;
pub mod safety;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::config::{EngineConfig, RegexConfig, RegexErrorPolicy};
use crate::decision::{ContentRule, FileDiff};
use crate::error::{DecisionGuardError, Result};

pub use cache::{RegexCache, RegexCacheKey, RegexCacheStats};
pub use diff::AddedLine;

/// Outcome of one content rule against one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentMatch {
    pub matched: bool,
    /// Evidence strings, empty when not matched.
    pub evidence: Vec<String>,
    /// Set when the rule could not be fully evaluated and the verdict came from
    /// [`RegexErrorPolicy`].
    pub error: Option<String>,
}

impl ContentMatch {
    pub fn none() -> Self {
        Self::default()
    }

    fn with_evidence(evidence: Vec<String>) -> Self {
        Self {
            matched: !evidence.is_empty(),
            evidence,
            error: None,
        }
    }
}

/// Combined outcome of a file's content rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentVerdict {
    pub evidence: Vec<String>,
    /// Diagnostics from rules that could not be evaluated.
    pub errors: Vec<String>,
}

impl ContentVerdict {
    pub fn matched(&self) -> bool {
        !self.evidence.is_empty()
    }
}

/// Content-matching strategies over the added lines of a diff.
///
/// Owns the regex verdict cache. Construct one per run, or share one across runs
/// to keep the cache warm.
pub struct ContentMatchers {
    config: RegexConfig,
    cache: RegexCache,
    regex_executions: AtomicU64,
}

impl Default for ContentMatchers {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ContentMatchers {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.regex.clone(),
            cache: RegexCache::new(&config.cache),
            regex_executions: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &RegexCache {
        &self.cache
    }

    /// Number of regex executions actually performed (cache hits excluded).
    pub fn regex_executions(&self) -> u64 {
        self.regex_executions.load(Ordering::Relaxed)
    }

    /// Added lines of a diff. Unparseable patches yield no lines.
    pub fn added_lines(&self, file: &FileDiff) -> Vec<AddedLine> {
        let Some(patch) = file.patch.as_deref() else {
            return Vec::new();
        };
        match diff::parse_added_lines(patch) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(file = %file.filename, "ignoring unparseable patch: {e}");
                Vec::new()
            }
        }
    }

    /// Run every rule against the file. The file matches when any rule fires.
    pub async fn match_file(&self, rules: &[ContentRule], file: &FileDiff) -> ContentVerdict {
        let lines = self.added_lines(file);
        let mut verdict = ContentVerdict::default();

        for rule in rules {
            match self.match_lines(rule, &lines).await {
                Ok(outcome) => {
                    if let Some(e) = outcome.error {
                        verdict.errors.push(format!("{}: {e}", file.filename));
                    }
                    verdict.evidence.extend(outcome.evidence);
                }
                Err(e) => {
                    tracing::warn!(
                        file = %file.filename,
                        mode = rule.mode(),
                        "content rule skipped: {e}"
                    );
                    verdict.errors.push(format!("{}: {e}", file.filename));
                }
            }
        }

        verdict
    }

    /// Evaluate a single content rule against a file.
    pub async fn evaluate(&self, rule: &ContentRule, file: &FileDiff) -> Result<ContentMatch> {
        let lines = self.added_lines(file);
        self.match_lines(rule, &lines).await
    }

    pub async fn match_lines(
        &self,
        rule: &ContentRule,
        lines: &[AddedLine],
    ) -> Result<ContentMatch> {
        match rule {
            ContentRule::Substring { patterns } => self.match_substrings(patterns, lines),
            ContentRule::Regex { pattern, flags } => self.match_regex(pattern, flags, lines).await,
            ContentRule::LineRange { start, end } => self.match_line_range(*start, *end, lines),
            ContentRule::FullFile => Ok(self.match_full_file()),
            ContentRule::JsonPath { paths } => self.match_json_paths(paths, lines),
        }
    }

    /// Any configured substring contained in any added line.
    pub fn match_substrings(
        &self,
        patterns: &[String],
        lines: &[AddedLine],
    ) -> Result<ContentMatch> {
        let needles: Vec<&str> = patterns
            .iter()
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .collect();
        if needles.is_empty() || lines.is_empty() {
            return Ok(ContentMatch::none());
        }

        let automaton =
            AhoCorasick::new(&needles).map_err(|e| DecisionGuardError::InvalidRule {
                reason: format!("string patterns: {e}"),
            })?;

        let mut found = vec![false; needles.len()];
        for line in lines {
            for mat in automaton.find_overlapping_iter(&line.text) {
                found[mat.pattern().as_usize()] = true;
            }
        }

        let evidence = needles
            .iter()
            .zip(found)
            .filter(|(_, hit)| *hit)
            .map(|(needle, _)| needle.to_string())
            .collect();
        Ok(ContentMatch::with_evidence(evidence))
    }

    /// Any added line whose destination line number is in `[start, end]`.
    pub fn match_line_range(
        &self,
        start: usize,
        end: usize,
        lines: &[AddedLine],
    ) -> Result<ContentMatch> {
        if start > end {
            return Err(DecisionGuardError::InvalidRule {
                reason: format!("line_range start {start} is after end {end}"),
            });
        }
        if lines.iter().any(|l| (start..=end).contains(&l.number)) {
            Ok(ContentMatch::with_evidence(vec![format!(
                "lines:{start}-{end}"
            )]))
        } else {
            Ok(ContentMatch::none())
        }
    }

    /// Any change to a file in scope counts.
    pub fn match_full_file(&self) -> ContentMatch {
        ContentMatch::with_evidence(vec!["full_file".to_string()])
    }

    /// Dotted key paths whose `"key":` fragments appear in non-decreasing line order.
    ///
    /// This is a line-level heuristic, not a JSON parse: nesting is not checked.
    pub fn match_json_paths(
        &self,
        paths: &[String],
        lines: &[AddedLine],
    ) -> Result<ContentMatch> {
        let mut evidence = Vec::new();
        for path in paths {
            if json_path_present(path, lines)? {
                evidence.push(path.clone());
            }
        }
        Ok(ContentMatch::with_evidence(evidence))
    }

    /// Static gate, cache, then bounded execution against the joined added lines.
    pub async fn match_regex(
        &self,
        pattern: &str,
        flags: &str,
        lines: &[AddedLine],
    ) -> Result<ContentMatch> {
        safety::check_pattern(pattern, flags, &self.config)?;

        let text = diff::joined_text(lines);
        safety::check_content(pattern, &text, &self.config)?;

        let evidence = format!("/{pattern}/{flags}");
        let key = RegexCacheKey::new(pattern, flags, &text);
        if let Some(matched) = self.cache.get(&key) {
            tracing::debug!(pattern, "regex cache hit");
            return Ok(verdict(matched, evidence));
        }

        let regex = safety::compile(pattern, flags)?;
        match self.execute(regex, text).await {
            Ok(matched) => {
                self.cache.insert(key, matched);
                Ok(verdict(matched, evidence))
            }
            Err(e) => {
                tracing::warn!(
                    pattern,
                    policy = ?self.config.on_error,
                    "regex execution failed: {e}"
                );
                let outcome = match self.config.on_error {
                    RegexErrorPolicy::FailClosed => ContentMatch::none(),
                    RegexErrorPolicy::FailOpen => verdict(true, format!("{evidence} (unverified)")),
                };
                Ok(ContentMatch {
                    error: Some(e.to_string()),
                    ..outcome
                })
            }
        }
    }

    /// Run the compiled pattern on a blocking worker under the configured deadline.
    ///
    /// A worker that outlives the deadline is detached; the engine is linear-time, so
    /// it finishes on its own.
    async fn execute(&self, regex: Regex, text: String) -> Result<bool> {
        self.regex_executions.fetch_add(1, Ordering::Relaxed);
        let timeout_ms = self.config.timeout_ms;
        let pattern = regex.as_str().to_string();

        let worker = tokio::task::spawn_blocking(move || regex.is_match(&text));
        match tokio::time::timeout(Duration::from_millis(timeout_ms), worker).await {
            Ok(Ok(matched)) => Ok(matched),
            Ok(Err(e)) => Err(DecisionGuardError::RegexExecution {
                reason: e.to_string(),
            }),
            Err(_) => Err(DecisionGuardError::RegexTimeout {
                pattern,
                timeout_ms,
            }),
        }
    }
}

fn verdict(matched: bool, evidence: String) -> ContentMatch {
    if matched {
        ContentMatch::with_evidence(vec![evidence])
    } else {
        ContentMatch::none()
    }
}

fn json_path_present(path: &str, lines: &[AddedLine]) -> Result<bool> {
    let keys: Vec<&str> = path.split('.').filter(|k| !k.is_empty()).collect();
    if keys.is_empty() {
        return Ok(false);
    }

    let mut from_line = 0;
    for key in keys {
        let token = Regex::new(&format!(r#""{}"\s*:"#, regex::escape(key))).map_err(|e| {
            DecisionGuardError::InvalidRule {
                reason: format!("json_path key {key:?}: {e}"),
            }
        })?;
        match lines
            .iter()
            .find(|l| l.number >= from_line && token.is_match(&l.text))
        {
            Some(line) => from_line = line.number,
            None => return Ok(false),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[(usize, &str)]) -> Vec<AddedLine> {
        items
            .iter()
            .map(|(number, text)| AddedLine {
                number: *number,
                text: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn substring_reports_each_hit_once() {
        let m = ContentMatchers::default();
        let added = lines(&[(1, "api secret here"), (2, "another secret")]);
        let out = m
            .match_substrings(&["secret".into(), "token".into()], &added)
            .unwrap();
        assert!(out.matched);
        assert_eq!(out.evidence, vec!["secret".to_string()]);
    }

    #[test]
    fn substring_overlapping_needles() {
        let m = ContentMatchers::default();
        let added = lines(&[(1, "password")]);
        let out = m
            .match_substrings(&["pass".into(), "password".into()], &added)
            .unwrap();
        assert_eq!(out.evidence, vec!["pass".to_string(), "password".to_string()]);
    }

    #[test]
    fn line_range_inclusive_bounds() {
        let m = ContentMatchers::default();
        let added = lines(&[(10, "x"), (20, "y")]);
        assert!(m.match_line_range(20, 30, &added).unwrap().matched);
        assert!(m.match_line_range(1, 10, &added).unwrap().matched);
        assert!(!m.match_line_range(11, 19, &added).unwrap().matched);
        assert!(m.match_line_range(5, 4, &added).is_err());
    }

    #[test]
    fn full_file_always_matches() {
        let m = ContentMatchers::default();
        assert_eq!(m.match_full_file().evidence, vec!["full_file".to_string()]);
    }

    #[test]
    fn json_path_in_order_with_gap() {
        let m = ContentMatchers::default();
        let added = lines(&[
            (1, r#"  "database": {"#),
            (2, r#"    "port": 5432,"#),
            (3, r#"    "user": "app","#),
            (4, r#"    "host": "x""#),
        ]);
        let out = m.match_json_paths(&["database.host".into()], &added).unwrap();
        assert!(out.matched);
        assert_eq!(out.evidence, vec!["database.host".to_string()]);
    }

    #[test]
    fn json_path_reversed_order_fails() {
        let m = ContentMatchers::default();
        let added = lines(&[(1, r#"    "host": "x""#), (4, r#"  "database": {"#)]);
        assert!(!m
            .match_json_paths(&["database.host".into()], &added)
            .unwrap()
            .matched);
    }

    #[test]
    fn json_path_key_is_escaped() {
        let m = ContentMatchers::default();
        let added = lines(&[(1, r#""a+b": 1"#)]);
        assert!(m.match_json_paths(&["a+b".into()], &added).unwrap().matched);
        assert!(!m.match_json_paths(&["aab".into()], &added).unwrap().matched);
    }

    #[tokio::test]
    async fn regex_match_and_cache_hit() {
        let m = ContentMatchers::default();
        let added = lines(&[(1, "Password: hunter2")]);

        let first = m.match_regex(r"password\s*:", "i", &added).await.unwrap();
        assert!(first.matched);
        assert_eq!(first.evidence, vec![r"/password\s*:/i".to_string()]);
        assert_eq!(m.regex_executions(), 1);

        let second = m.match_regex(r"password\s*:", "i", &added).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(m.regex_executions(), 1);
        assert_eq!(m.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn regex_rejected_before_execution() {
        let m = ContentMatchers::default();
        let added = lines(&[(1, "aaaaaaaaaaaaaaaaaaaaaaaa!")]);
        let err = m.match_regex("(a+)+$", "", &added).await.unwrap_err();
        assert!(matches!(err, DecisionGuardError::UnsafeRegex { .. }));
        assert_eq!(m.regex_executions(), 0);
        assert!(m.cache().is_empty());
    }

    #[tokio::test]
    async fn regex_bad_flags_rejected() {
        let m = ContentMatchers::default();
        let added = lines(&[(1, "x")]);
        let err = m.match_regex("x", "q", &added).await.unwrap_err();
        assert!(matches!(err, DecisionGuardError::InvalidRegexFlags { .. }));
    }

    fn many_lines(count: usize) -> Vec<AddedLine> {
        (1..=count)
            .map(|n| AddedLine {
                number: n,
                text: format!("entry {n} value"),
            })
            .collect()
    }

    fn zero_timeout(on_error: RegexErrorPolicy) -> ContentMatchers {
        let mut config = EngineConfig::default();
        config.regex.timeout_ms = 0;
        config.regex.on_error = on_error;
        ContentMatchers::new(&config)
    }

    #[tokio::test]
    async fn regex_timeout_fail_closed_reports_error() {
        let m = zero_timeout(RegexErrorPolicy::FailClosed);
        let out = m
            .match_regex(r"\w+\s+\d+ zzz", "", &many_lines(20_000))
            .await
            .unwrap();
        assert!(!out.matched);
        assert!(out.error.unwrap().contains("timeout"));
        assert_eq!(m.regex_executions(), 1);
        assert!(m.cache().is_empty());
    }

    #[tokio::test]
    async fn regex_timeout_fail_open_matches_unverified() {
        let m = zero_timeout(RegexErrorPolicy::FailOpen);
        let out = m
            .match_regex(r"\w+\s+\d+ zzz", "", &many_lines(20_000))
            .await
            .unwrap();
        assert!(out.matched);
        assert_eq!(out.evidence, vec![r"/\w+\s+\d+ zzz/ (unverified)".to_string()]);
        assert!(out.error.is_some());
        assert!(m.cache().is_empty());
    }

    #[tokio::test]
    async fn overflowing_hunk_header_fails_soft() {
        let m = ContentMatchers::default();
        let file = FileDiff::new("a.txt", format!("@@ -1 +{},2 @@\n+a\n+b\n", usize::MAX));
        assert!(m.added_lines(&file).is_empty());
        let out = m.evaluate(&ContentRule::LineRange { start: 1, end: 10 }, &file).await;
        assert!(!out.unwrap().matched);
    }

    #[tokio::test]
    async fn unparseable_patch_yields_no_evidence() {
        let m = ContentMatchers::default();
        let file = FileDiff::new("a.txt", "not a diff at all");
        let rules = [ContentRule::Substring {
            patterns: vec!["not".into()],
        }];
        let verdict = m.match_file(&rules, &file).await;
        assert!(!verdict.matched());
        assert!(verdict.errors.is_empty());
    }
}
