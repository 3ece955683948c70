//! CLI argument parsing and command dispatch

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub use commands::execute;

#[derive(Parser)]
#[command(name = "loadpace")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load records into the store
    Load(RunArgs),
    /// Run transactions against the store
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Load `recordcount` records before running, into the same store
        #[arg(long)]
        load_first: bool,
    },
    /// Validate a configuration and print the derived parameters
    Validate(RunArgs),
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Set a property, overriding the configuration file (repeatable)
    #[arg(short = 'p', long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Data store to drive
    #[arg(long, default_value = "memory")]
    pub db: String,

    /// Workload to run
    #[arg(long, default_value = "core")]
    pub workload: String,

    /// Print measurements and the final summary as JSON lines
    #[arg(long)]
    pub json: bool,
}
