// ABOUTME: Entry point for the edgeswap CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use edgeswap::config::{self, Config};
use edgeswap::error::Result;
use edgeswap::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(OutputMode::from_flags(cli.quiet, cli.json));

    if let Err(e) = run(cli, output).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init {
            service,
            repository,
            force,
        } => {
            config::init_config(&cwd, service.as_deref(), repository.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Bootstrap {
            version,
            artifact,
            force,
        } => {
            let config = Config::discover(&cwd)?;
            commands::bootstrap(&config, &version, artifact.as_deref(), force, output).await
        }
        Commands::Run {
            commit,
            branch,
            decision,
            force,
        } => {
            let config = Config::discover(&cwd)?;
            commands::run(&config, commit, branch, decision, force, output).await
        }
        Commands::Status { runs } => {
            let config = Config::discover(&cwd)?;
            commands::status(&config, runs, output).await
        }
        Commands::Purge { run_id } => {
            let config = Config::discover(&cwd)?;
            commands::purge(&config, &run_id, output).await
        }
        Commands::Route {
            path,
            headers,
            body,
        } => {
            let config = Config::discover(&cwd)?;
            commands::route(&config, &path, &headers, body, output).await
        }
        Commands::Orphans { cleanup } => {
            let config = Config::discover(&cwd)?;
            commands::orphans(&config, cleanup, output).await
        }
    }
}
