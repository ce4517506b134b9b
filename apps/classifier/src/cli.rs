use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "judgment-classifier",
    version,
    about = "Classify court judgments by asking an LLM a fixed set of prompts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Runtime configuration file.
    #[arg(global = true, long, value_name = "FILE", default_value = "config.json")]
    pub config: PathBuf,
    /// Increase logging verbosity (-v, -vv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
    /// Only log warnings and errors.
    #[arg(global = true, short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run every prompt against each case and print one row per case.
    Classify(ClassifyArgs),
    /// Print the column headers of the tabular output.
    Headers,
    /// Bulk mode through the provider's batch API.
    Batch(BatchArgs),
    /// Report whether any response is cached for each case.
    CacheStatus(CasesArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One flat JSON object per case.
    Jsonl,
    /// Header line followed by one tab-separated row per case.
    Tsv,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Case files to classify.
    #[arg(value_name = "CASE")]
    pub cases: Vec<PathBuf>,
    /// Also classify every `.json` file in this directory.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
    /// Only run the named prompt (repeatable).
    #[arg(long = "prompt", value_name = "NAME")]
    pub prompts: Vec<String>,
    /// Use mock responses instead of calling the LLM.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,
    /// Ignore cached responses (fresh answers still overwrite the cache).
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_cache: bool,
    /// Write results here instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Jsonl)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct CasesArgs {
    #[arg(value_name = "CASE", required = true)]
    pub cases: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[command(subcommand)]
    pub command: BatchCommands,
}

#[derive(Debug, Subcommand)]
pub enum BatchCommands {
    /// Submit each case's uncached prompts as one batch.
    Submit(BatchSubmitArgs),
    /// Check on the latest batch of each case.
    Poll(BatchPollArgs),
    /// Write the responses of finished batches into the cache.
    Retrieve(CasesArgs),
}

#[derive(Debug, Args)]
pub struct BatchSubmitArgs {
    #[command(flatten)]
    pub cases: CasesArgs,
    /// Only submit the named prompt (repeatable).
    #[arg(long = "prompt", value_name = "NAME")]
    pub prompts: Vec<String>,
}

#[derive(Debug, Args)]
pub struct BatchPollArgs {
    #[command(flatten)]
    pub cases: CasesArgs,
    /// Keep polling until each batch has ended.
    #[arg(long, action = ArgAction::SetTrue)]
    pub wait: bool,
}
