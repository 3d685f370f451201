// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use edgeswap::events::Decision;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "edgeswap")]
#[command(about = "Staged blue/green rollouts of static frontends onto edge distributions")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new edgeswap.yml configuration file
    Init {
        /// Service name
        #[arg(short, long)]
        service: Option<String>,

        /// Source repository to watch
        #[arg(short, long)]
        repository: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Create the production distribution and seed deployment parameters
    Bootstrap {
        /// Version production serves initially
        #[arg(long = "initial-version", value_name = "VERSION")]
        version: String,

        /// Directory to publish as the initial version
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Re-seed even if the service is already bootstrapped
        #[arg(long)]
        force: bool,
    },

    /// Run the pipeline for one source change
    Run {
        /// Commit that triggered the run
        #[arg(short, long)]
        commit: Option<String>,

        /// Branch that changed (defaults to the configured branch)
        #[arg(short, long)]
        branch: Option<String>,

        /// Decide the approval without prompting (accept or reject)
        #[arg(long)]
        decision: Option<Decision>,

        /// Break an existing run lock
        #[arg(long)]
        force: bool,
    },

    /// Show deployment parameters, distributions, and recent runs
    Status {
        /// Number of runs to show
        #[arg(short = 'n', long, default_value_t = 5)]
        runs: usize,
    },

    /// Redeliver the purge of a rejected run
    Purge {
        /// Run whose staging resources should be removed
        run_id: String,
    },

    /// Show which distribution and content serves a request
    Route {
        /// Request path
        #[arg(default_value = "/")]
        path: String,

        /// Request header as "name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Print the response body
        #[arg(long)]
        body: bool,
    },

    /// List staging distributions no run tracks
    Orphans {
        /// Remove them
        #[arg(long)]
        cleanup: bool,
    },
}
