use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "conveyor")]
#[command(version, about = "Run prioritised task pipelines from a TOML plan", long_about = None)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every pipeline of a plan and report the outcomes
    Run {
        /// Plan file
        #[arg(short, long, env = "CONVEYOR_PLAN")]
        plan: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a plan without running it
    Check {
        /// Plan file
        #[arg(short, long, env = "CONVEYOR_PLAN")]
        plan: PathBuf,
    },

    /// Configuration helpers
    Config {
        /// Print an example plan
        #[arg(long)]
        show: bool,
    },
}

impl Args {
    /// Whether the command reports on stdout as JSON.
    pub fn json_output(&self) -> bool {
        matches!(self.command, Commands::Run { json: true, .. })
    }
}
