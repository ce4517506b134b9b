mod batch;
mod cache;
mod case;
mod cli;
mod config;
mod errors;
mod llm_client;
mod prompt;
mod runner;
mod session;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::batch::BatchRunner;
use crate::cache::ResponseCache;
use crate::case::case_id;
use crate::cli::{BatchCommands, Cli, ClassifyArgs, Commands, OutputFormat};
use crate::config::Config;
use crate::llm_client::{ChatModel, LlmClient};
use crate::prompt::PromptSet;
use crate::runner::{ClassificationRunner, RunnerOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the results.
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={level}", env!("CARGO_CRATE_NAME")))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    info!("Starting judgment classifier v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli.config)?;
    let prompts = PromptSet::load(&config.prompts).await?;

    match cli.command {
        Commands::Classify(args) => classify(&config, prompts, args).await,
        Commands::Headers => {
            let runner = build_runner(&config, prompts, None, dry_run_options(&config))?;
            println!("{}", runner.headers().join("\t"));
            Ok(())
        }
        Commands::Batch(args) => run_batch(&config, prompts, args.command).await,
        Commands::CacheStatus(args) => {
            let cache = response_cache(&config)?;
            for path in &args.cases {
                let id = case_id(path)
                    .with_context(|| format!("No case id in '{}'", path.display()))?;
                let cached = cache.exists(&id).await?;
                println!("{}\t{}", path.display(), if cached { "cached" } else { "missing" });
            }
            Ok(())
        }
    }
}

async fn classify(config: &Config, prompts: PromptSet, args: ClassifyArgs) -> Result<()> {
    let paths = collect_cases(&args.cases, args.dir.as_deref())?;
    let options = RunnerOptions {
        dry_run: args.dry_run,
        bypass_cache: args.no_cache,
        rate_limit: config.rate_limit(),
        error_cache: config.error_cache_policy(),
        only: args.prompts,
    };
    let model = if args.dry_run {
        None
    } else {
        Some(build_client(config)?)
    };
    let runner = build_runner(config, prompts, model, options)?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create '{}'", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if args.format == OutputFormat::Tsv {
        writeln!(out, "{}", runner.headers().join("\t"))?;
    }
    let format = args.format;
    let classified = runner
        .classify_all(&paths, |result| {
            match format {
                OutputFormat::Jsonl => {
                    writeln!(out, "{}", serde_json::to_string(&runner.as_dict(&result))?)?
                }
                OutputFormat::Tsv => {
                    let row: Vec<String> =
                        runner.as_columns(&result).iter().map(tsv_cell).collect();
                    writeln!(out, "{}", row.join("\t"))?
                }
            }
            // Each row is durable before the next case starts.
            out.flush()?;
            Ok(())
        })
        .await?;
    info!("Classified {classified} of {} cases", paths.len());
    Ok(())
}

async fn run_batch(config: &Config, prompts: PromptSet, command: BatchCommands) -> Result<()> {
    let client = build_client(config)?;
    let only = match &command {
        BatchCommands::Submit(args) => args.prompts.clone(),
        _ => Vec::new(),
    };
    let options = RunnerOptions {
        only,
        ..live_options(config)
    };
    let runner = build_runner(config, prompts, Some(client.clone()), options)?;
    let batch = BatchRunner::new(runner, client)?;

    match command {
        BatchCommands::Submit(args) => {
            for path in &args.cases.cases {
                match batch.submit_case(path).await {
                    Ok(Some(record)) => println!(
                        "{}\t{}\t{}",
                        record.case_id,
                        record.provider_batch_id,
                        record.prompts.join(",")
                    ),
                    Ok(None) => println!("{}\tcached", path.display()),
                    Err(e) if e.is_case_local() => warn!("Skipping case: {e}"),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        BatchCommands::Poll(args) => {
            for path in &args.cases.cases {
                let id = case_id(path)
                    .with_context(|| format!("No case id in '{}'", path.display()))?;
                if args.wait {
                    batch.wait_case(&id, config.poll_interval()).await?;
                }
                match batch.poll_case(&id).await? {
                    Some(status) => println!("{id}\t{}", serde_json::to_string(&status)?.trim_matches('"')),
                    None => println!("{id}\tnot submitted"),
                }
            }
        }
        BatchCommands::Retrieve(args) => {
            for path in &args.cases {
                let id = case_id(path)
                    .with_context(|| format!("No case id in '{}'", path.display()))?;
                let written = batch.retrieve_case(&id).await?;
                println!("{id}\t{written}");
            }
        }
    }
    Ok(())
}

fn build_client(config: &Config) -> Result<Arc<LlmClient>> {
    let provider = config.provider_config(true)?;
    let client = LlmClient::new(provider, config.temperature);
    info!("LLM client initialized (model: {})", client.model());
    Ok(Arc::new(client))
}

fn response_cache(config: &Config) -> Result<ResponseCache> {
    match &config.cache {
        Some(root) => Ok(ResponseCache::new(root)),
        None => bail!("No response cache configured (set \"cache\" in the config file)"),
    }
}

fn build_runner(
    config: &Config,
    prompts: PromptSet,
    model: Option<Arc<LlmClient>>,
    options: RunnerOptions,
) -> Result<ClassificationRunner> {
    let cache = config.cache.as_ref().map(ResponseCache::new);
    let model = model.map(|m| m as Arc<dyn ChatModel>);
    Ok(ClassificationRunner::new(prompts, model, cache, options)?)
}

fn live_options(config: &Config) -> RunnerOptions {
    RunnerOptions {
        dry_run: false,
        bypass_cache: false,
        rate_limit: config.rate_limit(),
        error_cache: config.error_cache_policy(),
        only: Vec::new(),
    }
}

fn dry_run_options(config: &Config) -> RunnerOptions {
    RunnerOptions {
        dry_run: true,
        ..live_options(config)
    }
}

/// Explicit case files first, then the directory's `.json` files in name order.
fn collect_cases(cases: &[PathBuf], dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut paths = cases.to_vec();
    if let Some(dir) = dir {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Cannot read case directory '{}'", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                found.push(path);
            }
        }
        found.sort();
        paths.extend(found);
    }
    if paths.is_empty() {
        bail!("No cases given: pass case files or --dir");
    }
    Ok(paths)
}

/// One TSV cell. Strings are written bare, everything else as JSON; tabs and line
/// breaks are flattened to spaces so a row stays on one line.
fn tsv_cell(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.replace(['\t', '\r', '\n'], " ")
}
