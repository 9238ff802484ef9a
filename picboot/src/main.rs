mod cli;
mod config;
mod progress;
mod runner;
mod serial;

use anyhow::Result;
use clap::Parser;
use std::process;

use crate::cli::{Cli, Commands, merge_config};
use crate::config::DevicesConfig;

fn main() {
    // Initialize tracing, set log level from environment variable
    // Log level can be controlled by setting the RUST_LOG environment variable, e.g.:
    // RUST_LOG=debug, RUST_LOG=picboot_lib=trace, RUST_LOG=info
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let config = DevicesConfig::from_file(&args.devices)?;
    if let Commands::Devices = args.command {
        return runner::list_devices(&config);
    }

    let mut settings = merge_config(&args, &config)?;
    settings.port = serial::resolve_port(&settings.port)?;
    runner::run_command(settings, args.command.clone())
}
