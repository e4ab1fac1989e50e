//! `ehminer` binary entry point: parses CLI arguments, wires up structured
//! logging, and dispatches to [`eh_miner::cli::Cli::run`].

use std::error::Error as _;
use std::process;

use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::{fmt, EnvFilter};

use eh_miner::cli::Cli;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let env_filter =
        EnvFilter::from_default_env().add_directive(format!("eh_miner={log_level}").parse().unwrap());

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .init();

    if let Err(e) = cli.run() {
        error!("{e}");

        let mut cause = e.source();
        while let Some(err) = cause {
            error!("  caused by: {err}");
            cause = err.source();
        }

        process::exit(1);
    }
}
