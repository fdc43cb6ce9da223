use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "newslabel")]
#[command(
    author,
    version,
    about = "Multi-label classification of Vietnamese news with an LLM service"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "newslabel.yaml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify credentials and reachability of the model service
    Test,

    /// Estimate the cost of classifying a dataset
    Estimate {
        /// Dataset CSV path
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Classify a dataset, resuming from any checkpoint
    Process(ProcessArgs),

    /// Clear the checkpoint so the next run starts over
    Reset {
        /// Output directory holding the checkpoint
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

/// Overrides for a processing run
#[derive(Args, Debug, Default, Clone)]
pub struct ProcessArgs {
    /// Dataset CSV path
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Records classified concurrently
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// First record index to process
    #[arg(short, long)]
    pub start_from: Option<usize>,

    /// Maximum number of records to process
    #[arg(short, long)]
    pub max_records: Option<usize>,

    /// Output directory for checkpoint and results
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}
