//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ReportEx - structured information extraction from text reports
#[derive(Parser)]
#[command(
    name = "rex",
    about = "Extract structured fields from text reports via an LLM endpoint",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run extraction over a directory of text reports
    Extract {
        /// Directory containing .txt reports
        #[arg(short, long, value_name = "DIR")]
        reports: PathBuf,

        /// Write combined results as JSON
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Also write results as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List the models available to the configured provider
    Models,

    /// Check that the configured API credentials are accepted
    Validate,
}
