//! Hearth CLI - extension installation and management
//!
//! This is the main entry point for the Hearth command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let home = cli.home.as_deref();
    match cli.command {
        Commands::Install(args) => commands::install::run(args, home).await,
        Commands::List(args) => commands::list::run(args, home).await,
        Commands::Remove(args) => commands::remove::run(args, home).await,
        Commands::Enable(args) => commands::toggle::run(args, true, home).await,
        Commands::Disable(args) => commands::toggle::run(args, false, home).await,
        Commands::Scan(args) => commands::scan::run(args, home).await,
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
