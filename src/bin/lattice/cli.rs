//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Lattice - evaluate configuration-aware build graphs
#[derive(Parser)]
#[command(name = "lattice")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate targets and show what they would build
    Eval(EvalArgs),

    /// List the packages and targets of the project
    Targets(TargetsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct EvalArgs {
    /// Targets to evaluate (`//path[:name]`, or `:name` in the current package)
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Set a configuration value (KEY=VALUE), may be repeated
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print each root's ranked entries
    #[arg(long)]
    pub map: bool,
}

#[derive(Args)]
pub struct TargetsArgs {
    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
