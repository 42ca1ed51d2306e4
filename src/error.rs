use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DecisionGuardError {
    #[error("invalid rule: {reason}")]
    InvalidRule { reason: String },

    #[error("unsafe regex rejected: {pattern}: {reason}")]
    UnsafeRegex { pattern: String, reason: String },

    #[error("invalid regex flags: {flags}")]
    InvalidRegexFlags { flags: String },

    #[error("glob pattern error: {pattern}: {reason}")]
    GlobPattern { pattern: String, reason: String },

    #[error("rule nesting depth {depth} exceeds maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("diff parse error: {reason}")]
    DiffParse { reason: String },

    #[error("regex timeout after {timeout_ms}ms: {pattern}")]
    RegexTimeout { pattern: String, timeout_ms: u64 },

    #[error("regex execution failed: {reason}")]
    RegexExecution { reason: String },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, DecisionGuardError>;
