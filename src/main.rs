use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use humantime_serde::re::humantime;
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use dte_router::config_loader;
use dte_router::orchestrator::{active_flows, build_hash_function, build_path_calculator, run_iteration};
use dte_router::topology::HashWeights;

/// Compute loop-free multipath routes for the configured flows
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the router configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Route only the flows active at this offset, e.g. "90s" or "1h 5m"
    #[arg(long, value_parser = parse_offset)]
    at: Option<Duration>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_offset(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // The log level can come from the config file, so load it before the logger
    let config = config_loader::load_config(&args.config)?;
    let default_level = config.general.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("Starting DTE router");
    info!("Configuration file: {:?}", args.config);

    let mut topology = config_loader::load_topology(&config, &args.config)?;
    let hash_weights = HashWeights::from_topology(&topology);
    let flows = active_flows(&config.flows, args.at);
    if let Some(at) = args.at {
        info!(
            "{} of {} flows active at {}",
            flows.len(),
            config.flows.len(),
            humantime::format_duration(at)
        );
    }

    let mut calculator = build_path_calculator(&config.routing);
    let mut hash_fn = build_hash_function(&config.routing);
    let report = run_iteration(
        calculator.as_mut(),
        hash_fn.as_mut(),
        &mut topology,
        &flows,
        &hash_weights,
        config.routing.depth_limit,
    )?;

    let json = serde_json::to_string_pretty(&report).wrap_err("Failed to serialize routing report")?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).wrap_err_with(|| format!("Failed to write report to {:?}", path))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
