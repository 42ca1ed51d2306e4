use regex::{Regex, RegexBuilder};
use regex_syntax::ast::{self, Ast};

use crate::config::RegexConfig;
use crate::error::{DecisionGuardError, Result};

/// Flags a regex content rule may carry. `g` and `y` are accepted and have no effect
/// on a yes/no test; `u` is always on.
pub const ACCEPTED_FLAGS: &str = "gimsuy";

/// Repetition structure of a parsed pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternShape {
    /// Deepest nesting of repetition operators.
    pub star_height: usize,
    /// Total number of repetition operators.
    pub repetitions: usize,
}

/// Parse `pattern` and measure its repetition structure.
pub fn analyze(pattern: &str) -> Result<PatternShape> {
    let parsed = ast::parse::Parser::new()
        .parse(pattern)
        .map_err(|e| DecisionGuardError::UnsafeRegex {
            pattern: pattern.to_string(),
            reason: format!("unparseable: {}", e.kind()),
        })?;
    Ok(shape_of(&parsed))
}

fn shape_of(node: &Ast) -> PatternShape {
    match node {
        Ast::Repetition(rep) => {
            let inner = shape_of(&rep.ast);
            PatternShape {
                star_height: inner.star_height + 1,
                repetitions: inner.repetitions + 1,
            }
        }
        Ast::Group(group) => shape_of(&group.ast),
        Ast::Alternation(alt) => combine(&alt.asts),
        Ast::Concat(concat) => combine(&concat.asts),
        _ => PatternShape::default(),
    }
}

fn combine(nodes: &[Ast]) -> PatternShape {
    nodes
        .iter()
        .map(shape_of)
        .fold(PatternShape::default(), |acc, s| PatternShape {
            star_height: acc.star_height.max(s.star_height),
            repetitions: acc.repetitions + s.repetitions,
        })
}

/// Reject flags outside [`ACCEPTED_FLAGS`].
pub fn check_flags(flags: &str) -> Result<()> {
    if flags.chars().all(|c| ACCEPTED_FLAGS.contains(c)) {
        Ok(())
    } else {
        Err(DecisionGuardError::InvalidRegexFlags {
            flags: flags.to_string(),
        })
    }
}

/// Static checks a pattern must pass before it is ever executed.
pub fn check_pattern(pattern: &str, flags: &str, config: &RegexConfig) -> Result<()> {
    check_flags(flags)?;

    let length = pattern.chars().count();
    if length > config.max_pattern_len {
        return Err(DecisionGuardError::UnsafeRegex {
            pattern: truncate(pattern),
            reason: format!(
                "pattern length {length} exceeds {}",
                config.max_pattern_len
            ),
        });
    }

    let shape = analyze(pattern)?;
    if shape.star_height > config.max_star_height {
        return Err(DecisionGuardError::UnsafeRegex {
            pattern: pattern.to_string(),
            reason: format!(
                "nested repetition (star height {}) exceeds {}",
                shape.star_height, config.max_star_height
            ),
        });
    }
    if shape.repetitions > config.max_repetitions {
        return Err(DecisionGuardError::UnsafeRegex {
            pattern: pattern.to_string(),
            reason: format!(
                "{} repetition operators exceeds {}",
                shape.repetitions, config.max_repetitions
            ),
        });
    }
    Ok(())
}

/// Reject candidate text larger than the configured limit.
pub fn check_content(pattern: &str, content: &str, config: &RegexConfig) -> Result<()> {
    if content.len() > config.max_content_bytes {
        return Err(DecisionGuardError::UnsafeRegex {
            pattern: truncate(pattern),
            reason: format!(
                "content size {} bytes exceeds {}",
                content.len(),
                config.max_content_bytes
            ),
        });
    }
    Ok(())
}

/// Compile a pattern with its flags applied.
pub fn compile(pattern: &str, flags: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| DecisionGuardError::UnsafeRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn truncate(pattern: &str) -> String {
    pattern.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_height_of_simple_patterns() {
        assert_eq!(analyze("abc").unwrap().star_height, 0);
        assert_eq!(analyze(r"password\s*:").unwrap().star_height, 1);
        assert_eq!(analyze("a+b*c?").unwrap().repetitions, 3);
    }

    #[test]
    fn nested_repetition_detected() {
        let shape = analyze("(a+)+$").unwrap();
        assert_eq!(shape.star_height, 2);
        assert_eq!(analyze("((ab)*c)*").unwrap().star_height, 2);
        assert_eq!(analyze("(x|(y+))*").unwrap().star_height, 2);
    }

    #[test]
    fn alternation_takes_max_height() {
        let shape = analyze("a+|b|(c*)").unwrap();
        assert_eq!(shape.star_height, 1);
        assert_eq!(shape.repetitions, 2);
    }

    #[test]
    fn rejects_nested_repetition() {
        let config = RegexConfig::default();
        let err = check_pattern("(a+)+$", "", &config).unwrap_err();
        assert!(matches!(err, DecisionGuardError::UnsafeRegex { .. }));
    }

    #[test]
    fn rejects_too_many_repetitions() {
        let config = RegexConfig::default();
        let pattern = "a*".repeat(26);
        assert!(check_pattern(&pattern, "", &config).is_err());
        let pattern = "a*".repeat(25);
        assert!(check_pattern(&pattern, "", &config).is_ok());
    }

    #[test]
    fn rejects_long_pattern() {
        let config = RegexConfig::default();
        let pattern = "a".repeat(1001);
        assert!(check_pattern(&pattern, "", &config).is_err());
    }

    #[test]
    fn pattern_length_counts_characters() {
        let config = RegexConfig::default();
        let at_limit = "é".repeat(1000);
        assert_eq!(at_limit.len(), 2000);
        assert!(check_pattern(&at_limit, "", &config).is_ok());
        assert!(check_pattern(&"é".repeat(1001), "", &config).is_err());
    }

    #[test]
    fn flag_validation() {
        assert!(check_flags("").is_ok());
        assert!(check_flags("gimsuy").is_ok());
        assert!(matches!(
            check_flags("ix"),
            Err(DecisionGuardError::InvalidRegexFlags { .. })
        ));
    }

    #[test]
    fn content_size_limit() {
        let config = RegexConfig {
            max_content_bytes: 4,
            ..RegexConfig::default()
        };
        assert!(check_content("a", "abcd", &config).is_ok());
        assert!(check_content("a", "abcde", &config).is_err());
    }

    #[test]
    fn compile_applies_flags() {
        let re = compile("^secret$", "im").unwrap();
        assert!(re.is_match("other\nSECRET\nline"));
        let re = compile("^secret$", "").unwrap();
        assert!(!re.is_match("other\nSECRET\nline"));
    }
}
