//! Lattice CLI - evaluate configuration-aware build graphs

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("lattice=debug")
    } else {
        EnvFilter::new("lattice=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let color = !cli.no_color;

    // Execute command
    match cli.command {
        Commands::Eval(args) => commands::eval::execute(args, cli.verbose, color),
        Commands::Targets(args) => commands::targets::execute(args, cli.verbose),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
