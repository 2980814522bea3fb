pub mod commands;
pub mod files;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use aduana_core::config::{AppConfig, LogFormat};
use commands::run::RunArgs;
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "aduana",
    about = "Aduana compliance reconciliation CLI",
    long_about = "Reconcile declared import entry summaries against extracted supplier invoices and produce per-ESN compliance verdicts.",
    after_help = "Examples:\n  aduana run --declared entries.json --session candidates.json --out report.json\n  aduana config\n  aduana doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Reconcile a declared-entry export against a recorded extraction session")]
    Run {
        #[arg(long, help = "JSON file with the declared entries")]
        declared: PathBuf,
        #[arg(long, help = "JSON file with the recorded extraction candidates")]
        session: PathBuf,
        #[arg(long, help = "JSON file with currency-rate quotes for the run snapshot")]
        rates: Option<PathBuf>,
        #[arg(long, help = "Write the full batch report to this path as JSON")]
        out: Option<PathBuf>,
        #[arg(long, help = "Path to aduana.toml (defaults to ./aduana.toml)")]
        config: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate configuration and report the tolerance and extractor budgets")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { declared, session, rates, out, config } => {
            let args = RunArgs { declared, session, rates, out, config_path: config };
            match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime.block_on(commands::run::run(args)),
                Err(error) => CommandResult::failure(
                    "run",
                    "runtime",
                    format!("failed to start async runtime: {error}"),
                    3,
                ),
            }
        }
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run() },
        Command::Doctor { json } => {
            CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub(crate) fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // try_init so repeated command invocations in one process stay quiet
    let _ = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
}
