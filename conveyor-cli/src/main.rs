mod cli;
mod plan;
mod runner;
mod sim;

use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    plan::Plan,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let json = args.json_output();

    match run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            if json {
                let error_json = serde_json::json!({
                    "status": "error",
                    "message": format!("{e:#}"),
                });
                println!("{error_json}");
            } else {
                error!("Application error: {e:#}");
                eprintln!("Error: {e:#}");
            }
            process::exit(1);
        }
    }
}

/// Returns whether everything the command ran succeeded.
async fn run(args: Args) -> Result<bool> {
    init_logging(args.verbose, args.quiet, args.log_json);

    match args.command {
        Commands::Run { plan, json } => {
            let plan = Plan::load(&plan)?;
            let report = runner::run_plan(&plan).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.summary());
            }
            Ok(report.failures() == 0)
        }

        Commands::Check { plan: path } => {
            let plan = Plan::load(&path)?;
            let steps: usize = plan.pipelines.iter().map(|p| p.steps.len()).sum();
            println!(
                "✓ {}: {} managers, {} pipelines, {} steps",
                path.display(),
                plan.managers.len(),
                plan.pipelines.len(),
                steps
            );
            Ok(true)
        }

        Commands::Config { show } => {
            if show {
                print!("{}", Plan::example().to_toml()?);
            } else {
                println!("Use --show to print an example plan");
            }
            Ok(true)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
