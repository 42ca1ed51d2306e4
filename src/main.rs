use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use decision_guard::cli::check::{self, CheckOptions, OutputFormat};

#[derive(Parser)]
#[command(name = "decision-guard", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate decisions against changed files.
    Check {
        /// YAML file with a top-level `decisions` list.
        #[arg(long)]
        decisions: PathBuf,

        /// JSON array of file diffs. Enables rule-based evaluation.
        #[arg(long)]
        diffs: Option<PathBuf>,

        /// Changed file names for glob-only matching.
        #[arg(long, num_args = 1..)]
        files: Vec<String>,

        /// Engine config. Defaults to `.decisions/engine.yml` if present.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Exit non-zero when any critical decision is triggered.
        #[arg(long)]
        fail_on_critical: bool,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Check {
            decisions,
            diffs,
            files,
            config,
            format,
            fail_on_critical,
        } => {
            let opts = CheckOptions {
                decisions,
                diffs,
                files,
                config,
                format,
                fail_on_critical,
            };
            let code = match check::run(&opts).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("decision-guard: {e}");
                    2
                }
            };
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
