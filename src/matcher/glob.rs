use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use unicode_normalization::UnicodeNormalization;

use crate::error::{DecisionGuardError, Result};

/// Normalize a path or pattern: forward slashes, NFC, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    let trimmed = slashed.strip_prefix("./").unwrap_or(&slashed);
    trimmed.nfc().collect()
}

/// Compile one glob. `*` and `?` never cross a `/`; `**` does.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| DecisionGuardError::GlobPattern {
            pattern: pattern.to_string(),
            reason: e.kind().to_string(),
        })
}

/// Compile a set of globs with the same options as [`compile_glob`].
pub fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| DecisionGuardError::GlobPattern {
                pattern: pattern.to_string(),
                reason: e.kind().to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DecisionGuardError::GlobPattern {
        pattern: String::new(),
        reason: e.to_string(),
    })
}
