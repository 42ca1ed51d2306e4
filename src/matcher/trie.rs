use std::collections::{BTreeSet, HashMap};

use crate::decision::Decision;

use super::glob::normalize_path;

const GLOB_META: [char; 6] = ['*', '?', '{', '}', '[', ']'];

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    /// Decisions whose pattern ends exactly at this node.
    exact: BTreeSet<usize>,
    /// Decisions that may match anything below this node.
    wildcard: BTreeSet<usize>,
}

/// Segment trie over the literal prefixes of glob patterns.
///
/// Decisions are identified by their index in the slice the trie was built from.
/// Queries over-approximate: every decision that could match a path is returned,
/// and callers confirm with an exact glob test.
#[derive(Debug, Default)]
pub struct PatternTrie {
    root: TrieNode,
    patterns: usize,
}

impl PatternTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the include patterns of every active decision.
    pub fn build(decisions: &[Decision]) -> Self {
        let mut trie = Self::new();
        for (idx, decision) in decisions.iter().enumerate() {
            if !decision.is_active() {
                continue;
            }
            for pattern in decision.include_patterns() {
                trie.insert(idx, pattern);
            }
        }
        trie
    }

    /// Index one pattern. Exclusion patterns (leading `!`) are ignored.
    pub fn insert(&mut self, decision: usize, pattern: &str) {
        if pattern.starts_with('!') {
            return;
        }
        let pattern = normalize_path(pattern);
        self.patterns += 1;

        let mut node = &mut self.root;
        for segment in pattern.split('/') {
            if segment == "**" {
                // Covers any depth below; the literal suffix is still indexed.
                node.wildcard.insert(decision);
                continue;
            }
            if segment.contains(GLOB_META) {
                node.wildcard.insert(decision);
                return;
            }
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.exact.insert(decision);
    }

    /// Decisions that might match `path`.
    pub fn find_candidates(&self, path: &str) -> BTreeSet<usize> {
        let path = normalize_path(path);
        let mut candidates: BTreeSet<usize> = self.root.wildcard.clone();

        let mut node = &self.root;
        for segment in path.split('/') {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    candidates.extend(&node.wildcard);
                }
                None => break,
            }
        }
        candidates.extend(&node.exact);
        candidates
    }

    /// Number of patterns indexed.
    pub fn len(&self) -> usize {
        self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::glob::compile_glob;

    fn trie(patterns: &[&str]) -> PatternTrie {
        let mut trie = PatternTrie::new();
        for (idx, pattern) in patterns.iter().enumerate() {
            trie.insert(idx, pattern);
        }
        trie
    }

    #[test]
    fn exact_pattern_found_only_at_its_path() {
        let t = trie(&["Cargo.toml", "src/main.rs"]);
        assert_eq!(t.find_candidates("Cargo.toml"), BTreeSet::from([0]));
        assert_eq!(t.find_candidates("src/main.rs"), BTreeSet::from([1]));
        assert!(t.find_candidates("docs/readme.md").is_empty());
    }

    #[test]
    fn double_star_covers_subtree() {
        let t = trie(&["src/**/*.go", "lib/**"]);
        assert_eq!(t.find_candidates("src/auth/login.go"), BTreeSet::from([0]));
        assert_eq!(t.find_candidates("lib/a/b/c.rs"), BTreeSet::from([1]));
        assert!(t.find_candidates("test/x.go").is_empty());
    }

    #[test]
    fn suffix_after_double_star_is_indexed() {
        let t = trie(&["src/**/auth/*.go"]);
        assert!(t.find_candidates("src/x/y/auth/login.go").contains(&0));
        assert!(t.find_candidates("src/auth/login.go").contains(&0));
    }

    #[test]
    fn metachar_segment_becomes_wildcard() {
        let t = trie(&["*.md", "config/{a,b}.yml", "docs/[abc]/x"]);
        assert!(t.find_candidates("README.md").contains(&0));
        assert!(t.find_candidates("config/a.yml").contains(&1));
        assert!(t.find_candidates("docs/a/x").contains(&2));
    }

    #[test]
    fn exclusions_not_indexed() {
        let t = trie(&["!src/generated/**"]);
        assert!(t.is_empty());
        assert!(t.find_candidates("src/generated/x.go").is_empty());
    }

    #[test]
    fn inactive_decisions_skipped() {
        let decisions: Vec<Decision> = serde_yaml::from_str(
            "- id: A\n  files: [\"src/**\"]\n- id: B\n  status: archived\n  files: [\"src/**\"]\n",
        )
        .unwrap();
        let t = PatternTrie::build(&decisions);
        assert_eq!(t.find_candidates("src/x.rs"), BTreeSet::from([0]));
    }

    #[test]
    fn no_false_negatives_against_glob() {
        let patterns = [
            "src/**/*.go",
            "src/*.rs",
            "**/Dockerfile",
            "*.md",
            "docs/**",
            "config/*.yml",
            "a/b/c.txt",
            "src/**/auth/*.go",
            "pkg/{x,y}/**",
            "deploy/k8s/*.yaml",
        ];
        let paths = [
            "src/auth/login.go",
            "src/main.rs",
            "src/a/b/c/d.go",
            "Dockerfile",
            "build/ci/Dockerfile",
            "README.md",
            "docs/guide/intro.md",
            "config/db.yml",
            "a/b/c.txt",
            "src/x/auth/token.go",
            "pkg/x/mod.go",
            "deploy/k8s/svc.yaml",
            "unrelated/file.txt",
        ];
        let t = trie(&patterns);
        for path in paths {
            let candidates = t.find_candidates(path);
            for (idx, pattern) in patterns.iter().enumerate() {
                if compile_glob(pattern).unwrap().is_match(path) {
                    assert!(
                        candidates.contains(&idx),
                        "trie missed {pattern} for {path}"
                    );
                }
            }
        }
    }
}
