use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod output;

use commands::analyze::AnalyzeArgs;
use commands::export::ExportArgs;
use commands::parse::ParseArgs;
use commands::search::SearchArgs;
use commands::triage::TriageArgs;
use config::Config;

/// Alertscope - Triage CloudWatch alert logs of the game backend
#[derive(Parser, Debug)]
#[command(name = "alertscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.alertscope/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log more (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, group and classify the failed requests behind an alert
    Triage(TriageArgs),

    /// Classify a previously saved CSV of log records
    Analyze(AnalyzeArgs),

    /// Search log groups across regions
    Search(SearchArgs),

    /// Export a log group to S3
    Export(ExportArgs),

    /// Time the start-up stages and gateway requests of game client logs
    Parse(ParseArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let verbose = args.verbose > 1;

    match args.command {
        Command::Triage(cmd) => commands::triage::run(cmd, &config, verbose).await,
        Command::Analyze(cmd) => commands::analyze::run(cmd, &config),
        Command::Search(cmd) => commands::search::run(cmd, &config).await,
        Command::Export(cmd) => commands::export::run(cmd, &config).await,
        Command::Parse(cmd) => commands::parse::run(cmd, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "alertscope",
            "analyze",
            "--csv",
            "x.csv",
            "-vv",
            "--config",
            "c.toml",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(args.command, Command::Analyze(_)));
    }
}
