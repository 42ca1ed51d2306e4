use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::decision::{Decision, FileDiff, Match, MatchDetails, Severity};
use crate::error::{DecisionGuardError, Result};
use crate::matcher::{group_by_severity, DecisionFailure, FileMatcher, MatchStats};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Inputs for a `check` run.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub decisions: PathBuf,
    pub diffs: Option<PathBuf>,
    pub files: Vec<String>,
    pub config: Option<PathBuf>,
    pub format: OutputFormat,
    pub fail_on_critical: bool,
}

/// On-disk shape of a decisions file.
#[derive(Debug, Deserialize)]
struct DecisionsFile {
    decisions: Vec<Decision>,
}

#[derive(Debug, Serialize)]
struct MatchRecord<'a> {
    decision_id: &'a str,
    title: &'a str,
    severity: Severity,
    file: &'a str,
    matched_pattern: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a MatchDetails>,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    matches: Vec<MatchRecord<'a>>,
    failures: &'a [DecisionFailure],
    stats: &'a MatchStats,
}

/// Evaluate decisions against changes and print the result. Returns the exit code.
pub async fn run(opts: &CheckOptions) -> Result<i32> {
    let config = match &opts.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            EngineConfig::load_project(&cwd)?
        }
    };

    let decisions = load_decisions(&opts.decisions)?;
    eprintln!(
        "decision-guard: loaded {} decision(s) from {}",
        decisions.len(),
        opts.decisions.display()
    );
    let matcher = FileMatcher::new(decisions, config);

    let (matches, failures, stats) = if let Some(path) = &opts.diffs {
        let diffs = load_diffs(path)?;
        let report = matcher.find_matches_with_diffs_report(&diffs).await;
        (report.matches, report.failures, report.stats)
    } else if !opts.files.is_empty() {
        let matches = matcher.find_matches(&opts.files);
        let stats = MatchStats {
            active_decisions: matcher.decisions().len(),
            pattern_decisions: matcher.decisions().len(),
            rule_decisions: 0,
            files_checked: opts.files.len(),
            matches: matches.len(),
        };
        (matches, Vec::new(), stats)
    } else {
        eprintln!("decision-guard: nothing to check. Use --diffs or --files.");
        return Ok(2);
    };

    match opts.format {
        OutputFormat::Text => print_text(&matches, &failures),
        OutputFormat::Json => print_json(&matches, &failures, &stats)?,
    }

    let critical = matches
        .iter()
        .filter(|m| m.decision.severity == Severity::Critical)
        .count();
    if opts.fail_on_critical && critical > 0 {
        eprintln!("decision-guard: {critical} critical match(es). Failing.");
        return Ok(1);
    }
    Ok(0)
}

fn load_decisions(path: &Path) -> Result<Vec<Decision>> {
    let contents = std::fs::read_to_string(path)?;
    let file: DecisionsFile =
        serde_yaml::from_str(&contents).map_err(|e| DecisionGuardError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(file.decisions)
}

fn load_diffs(path: &Path) -> Result<Vec<FileDiff>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn print_text(matches: &[Match], failures: &[DecisionFailure]) {
    if matches.is_empty() {
        println!("No decisions triggered.");
    } else {
        let groups = group_by_severity(matches.to_vec());
        for (label, group) in [
            ("critical", &groups.critical),
            ("warning", &groups.warning),
            ("info", &groups.info),
        ] {
            if group.is_empty() {
                continue;
            }
            println!("{label} ({}):", group.len());
            for m in group {
                println!("  {} {}", m.decision.id, m.decision.title);
                println!("    {}  [{}]", m.file, m.matched_pattern);
            }
        }
    }

    for failure in failures {
        eprintln!(
            "decision-guard: {} not fully evaluated: {}",
            failure.decision_id, failure.error
        );
    }
}

fn print_json(matches: &[Match], failures: &[DecisionFailure], stats: &MatchStats) -> Result<()> {
    let report = JsonReport {
        matches: matches
            .iter()
            .map(|m| MatchRecord {
                decision_id: &m.decision.id,
                title: &m.decision.title,
                severity: m.decision.severity,
                file: &m.file,
                matched_pattern: &m.matched_pattern,
                details: m.match_details.as_ref(),
            })
            .collect(),
        failures,
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
