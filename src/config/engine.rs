use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DecisionGuardError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Regex content-rule limits and failure policy.
    #[serde(default)]
    pub regex: RegexConfig,

    /// Regex verdict cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Rule-based decisions evaluated concurrently per batch. Default: 50.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Filenames processed per chunk on the glob-only path. Default: 500.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_batch_size() -> usize {
    50
}
fn default_chunk_size() -> usize {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            regex: RegexConfig::default(),
            cache: CacheConfig::default(),
            batch_size: 50,
            chunk_size: 500,
        }
    }
}

impl EngineConfig {
    /// Load config from a YAML file. Returns default if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| DecisionGuardError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load config from the project root. Checks `.decisions/engine.yml`.
    pub fn load_project(project_root: &Path) -> Result<Self> {
        let path = project_root.join(".decisions").join("engine.yml");
        Self::load_from(&path)
    }
}

/// What a regex content rule reports when execution fails (timeout or worker failure).
///
/// Statically rejected patterns never match, whatever this is set to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegexErrorPolicy {
    /// Treat the rule as not matched. Favors availability.
    #[default]
    FailClosed,
    /// Treat the rule as matched. Favors recall for security-oriented decisions.
    FailOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexConfig {
    /// Wall-clock bound on a single execution.
    #[serde(default = "default_regex_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_pattern_len")]
    pub max_pattern_len: usize,

    /// Largest candidate text, in bytes, a regex is run against.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    /// Maximum number of repetition operators in one pattern.
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: usize,

    /// Maximum nesting of repetition operators.
    #[serde(default = "default_max_star_height")]
    pub max_star_height: usize,

    #[serde(default)]
    pub on_error: RegexErrorPolicy,
}

fn default_regex_timeout_ms() -> u64 {
    5000
}
fn default_max_pattern_len() -> usize {
    1000
}
fn default_max_content_bytes() -> usize {
    1024 * 1024
}
fn default_max_repetitions() -> usize {
    25
}
fn default_max_star_height() -> usize {
    1
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_regex_timeout_ms(),
            max_pattern_len: default_max_pattern_len(),
            max_content_bytes: default_max_content_bytes(),
            max_repetitions: default_max_repetitions(),
            max_star_height: default_max_star_height(),
            on_error: RegexErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Fraction of entries dropped, oldest first, when the cache is full.
    #[serde(default = "default_eviction_ratio")]
    pub eviction_ratio: f64,
}

fn default_cache_capacity() -> usize {
    500
}
fn default_eviction_ratio() -> f64 {
    0.1
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            eviction_ratio: default_eviction_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::load_project(tmp.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.regex.timeout_ms, 5000);
        assert_eq!(config.cache.capacity, 500);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("engine.yml");
        std::fs::write(
            &path,
            "regex:\n  timeout_ms: 250\n  on_error: fail_open\nbatch_size: 8\n",
        )
        .unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.regex.timeout_ms, 250);
        assert_eq!(config.regex.on_error, RegexErrorPolicy::FailOpen);
        assert_eq!(config.regex.max_repetitions, 25);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.chunk_size, 500);
    }

    #[test]
    fn malformed_file_is_config_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("engine.yml");
        std::fs::write(&path, "batch_size: [not, a, number]\n").unwrap();

        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, DecisionGuardError::ConfigParse { .. }));
    }
}
