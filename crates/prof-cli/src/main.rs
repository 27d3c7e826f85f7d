use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use prof_cli::commands::{combine, inspect, record};
use prof_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    match &cli.command {
        Some(Commands::Combine(args)) => {
            let report = combine::run(args, &config)?;
            for failure in &report.failures {
                eprintln!("error: {failure}");
            }
            for diagnostic in &report.diagnostics {
                eprintln!("warning: {diagnostic}");
            }
            tracing::debug!(
                profiles = report.profiles,
                records = report.records,
                "combined profiles"
            );
        }
        Some(Commands::Record(args)) => {
            record::run(args, &config)?;
        }
        Some(Commands::Inspect(args)) => {
            inspect::run(args, &config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
