use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DecisionGuardError, Result};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
});

/// A line introduced by a patch, addressed by its line number in the new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedLine {
    pub number: usize,
    pub text: String,
}

/// Position inside the hunk currently being read.
#[derive(Debug, Default)]
struct HunkCursor {
    old_remaining: usize,
    new_remaining: usize,
    new_line: usize,
}

impl HunkCursor {
    fn open(header: &str) -> Result<Self> {
        let caps = HUNK_HEADER
            .captures(header)
            .ok_or_else(|| DecisionGuardError::DiffParse {
                reason: format!("malformed hunk header: {header}"),
            })?;
        let number = |idx: usize, default: usize| -> Result<usize> {
            match caps.get(idx) {
                Some(m) => m.as_str().parse().map_err(|_| DecisionGuardError::DiffParse {
                    reason: format!("bad line count in hunk header: {header}"),
                }),
                None => Ok(default),
            }
        };
        Ok(Self {
            old_remaining: number(2, 1)?,
            new_line: number(3, 0)?,
            new_remaining: number(4, 1)?,
        })
    }

    fn advance(&mut self) -> Result<()> {
        self.new_line = self
            .new_line
            .checked_add(1)
            .ok_or_else(|| DecisionGuardError::DiffParse {
                reason: "line number overflow".to_string(),
            })?;
        Ok(())
    }

    fn in_hunk(&self) -> bool {
        self.old_remaining > 0 || self.new_remaining > 0
    }
}

/// Extract the added lines from unified-diff hunks.
///
/// File headers (`diff --git`, `index`, `---`, `+++`) are skipped when they appear
/// between hunks, so both bare hunk bodies and full per-file diffs are accepted.
pub fn parse_added_lines(patch: &str) -> Result<Vec<AddedLine>> {
    let mut added = Vec::new();
    let mut cursor = HunkCursor::default();

    for raw in patch.lines() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if !cursor.in_hunk() {
            if line.starts_with("@@") {
                cursor = HunkCursor::open(line)?;
                continue;
            }
            if line.is_empty() || line.starts_with('\\') || is_file_header(line) {
                continue;
            }
            return Err(DecisionGuardError::DiffParse {
                reason: format!("unexpected line outside hunk: {line}"),
            });
        }

        match line.as_bytes().first() {
            Some(b'+') => {
                added.push(AddedLine {
                    number: cursor.new_line,
                    text: line[1..].to_string(),
                });
                cursor.advance()?;
                cursor.new_remaining = cursor.new_remaining.saturating_sub(1);
            }
            Some(b'-') => {
                cursor.old_remaining = cursor.old_remaining.saturating_sub(1);
            }
            // "\ No newline at end of file"
            Some(b'\\') => {}
            Some(b' ') | None => {
                cursor.advance()?;
                cursor.old_remaining = cursor.old_remaining.saturating_sub(1);
                cursor.new_remaining = cursor.new_remaining.saturating_sub(1);
            }
            Some(_) if line.starts_with("@@") => {
                cursor = HunkCursor::open(line)?;
            }
            Some(_) => {
                return Err(DecisionGuardError::DiffParse {
                    reason: format!("unexpected line inside hunk: {line}"),
                });
            }
        }
    }

    Ok(added)
}

fn is_file_header(line: &str) -> bool {
    line.starts_with("diff ")
        || line.starts_with("index ")
        || line.starts_with("--- ")
        || line.starts_with("+++ ")
        || line.starts_with("new file mode")
        || line.starts_with("deleted file mode")
        || line.starts_with("similarity index")
        || line.starts_with("rename ")
        || line.starts_with("Binary files")
}

/// Join added lines into the candidate text for regex matching.
pub fn joined_text(lines: &[AddedLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
