//! precis CLI - summarize long documents and compare summaries.
//!
//! ```text
//! precis summarize FILE [--neighbor FILE]...
//!   read -> PipelineCoordinator::run_document -> stdout
//!                     |
//!                     v (with neighbors)
//!             Comparator::compare -> EmailNotifier
//! ```
//!
//! Logs go to `~/.precis/logs/precis.log` so stdout carries only results.

mod assets;

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use precis_config::PrecisConfig;
use precis_context::{Chunker, FallbackDecoder, TextDecoder, Tokenizer};
use precis_core::{Comparator, PipelineCoordinator, Summarizer};
use precis_notify::EmailNotifier;
use precis_providers::ChatClient;
use precis_types::{CombinePolicy, DocumentId};

#[derive(Parser)]
#[command(name = "precis")]
#[command(about = "Summarize documents that exceed a model's context window")]
struct Cli {
    /// Config file (default: ~/.precis/config.toml)
    #[arg(long, global = true, env = "PRECIS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a document and print the final summary
    Summarize {
        /// Document to summarize
        file: PathBuf,
        /// Neighbor summary to compare against (repeatable)
        #[arg(long = "neighbor", value_name = "FILE")]
        neighbors: Vec<PathBuf>,
        /// Maximum tokens per chunk
        #[arg(long)]
        max_tokens: Option<usize>,
        /// How chunk summaries are combined
        #[arg(long, value_parser = parse_combine)]
        combine: Option<CombinePolicy>,
    },
    /// Compare an existing summary against neighbor summaries
    Compare {
        /// Summary to compare
        summary: PathBuf,
        /// Neighbor summaries
        #[arg(required = true)]
        neighbors: Vec<PathBuf>,
    },
    /// Print chunk boundaries without calling the model
    Chunk {
        /// Document to split
        file: PathBuf,
        /// Maximum tokens per chunk
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

fn parse_combine(value: &str) -> Result<CombinePolicy, String> {
    CombinePolicy::parse(value)
        .ok_or_else(|| format!("unknown combine policy {value:?} (concatenate or resummarize)"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Before parsing so `.env` can supply PRECIS_CONFIG.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing();
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env"),
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Run failed");
            eprintln!("precis: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (config, config_dir) = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Summarize {
            file,
            neighbors,
            max_tokens,
            combine,
        } => {
            summarize(
                &config,
                config_dir.as_deref(),
                &file,
                &neighbors,
                max_tokens,
                combine,
            )
            .await
        }
        Commands::Compare { summary, neighbors } => {
            compare(&config, config_dir.as_deref(), &summary, &neighbors).await
        }
        Commands::Chunk { file, max_tokens } => chunk(&config, &file, max_tokens),
    }
}

/// Explicit path must exist; the default path is optional.
fn load_config(explicit: Option<&Path>) -> Result<(PrecisConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = PrecisConfig::load_from(path).context("failed to load configuration")?;
        return Ok((config, path.parent().map(Path::to_path_buf)));
    }

    let config = PrecisConfig::load()
        .context("failed to load configuration")?
        .unwrap_or_default();
    let dir = PrecisConfig::path().and_then(|p| p.parent().map(Path::to_path_buf));
    Ok((config, dir))
}

fn build_chunker(config: &PrecisConfig, max_tokens: Option<usize>) -> Result<Chunker> {
    let settings = config.chunk_settings()?;
    let tokenizer = Tokenizer::for_model(&settings.tokenizer_model)?;
    let chunker = Chunker::new(tokenizer, max_tokens.unwrap_or(settings.max_tokens))?;
    Ok(chunker)
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = FallbackDecoder::default()
        .decode(&bytes)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(text)
}

async fn summarize(
    config: &PrecisConfig,
    config_dir: Option<&Path>,
    file: &Path,
    neighbors: &[PathBuf],
    max_tokens: Option<usize>,
    combine: Option<CombinePolicy>,
) -> Result<()> {
    let instructions = assets::instructions(config, config_dir)?;
    let settings = config.pipeline_settings()?;
    let chunker = build_chunker(config, max_tokens)?;
    let client = Arc::new(ChatClient::new(config.api_config()?)?);

    // Neighbors are read up front so a bad path fails before any model call.
    let neighbor_texts = neighbors
        .iter()
        .map(|path| read_text(path))
        .collect::<Result<Vec<_>>>()?;
    let raw = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let summarizer = Summarizer::new(Arc::clone(&client))
        .with_max_response_tokens(settings.max_response_tokens)
        .with_concurrency(settings.concurrency);
    let mut coordinator = PipelineCoordinator::new(chunker, summarizer)
        .with_policy(combine.unwrap_or(settings.combine));

    let summary = coordinator
        .run_document(
            DocumentId::new(file.display().to_string()),
            &raw,
            &instructions.summarization,
            &instructions.final_combination,
        )
        .await
        .context("summarization failed")?;

    println!("{summary}");
    if summary.failed_chunks() > 0 {
        tracing::warn!(
            failed = summary.failed_chunks(),
            chunks = summary.chunk_count(),
            "Some chunks were not summarized"
        );
    }

    if neighbor_texts.is_empty() {
        return Ok(());
    }

    let comparator = Comparator::new(client, EmailNotifier::new(config.email_config()))
        .with_instruction(instructions.comparison)
        .with_max_response_tokens(settings.max_response_tokens);
    let report = comparator.compare(summary.as_str(), &neighbor_texts).await;
    println!("\n{report}");
    Ok(())
}

async fn compare(
    config: &PrecisConfig,
    config_dir: Option<&Path>,
    summary: &Path,
    neighbors: &[PathBuf],
) -> Result<()> {
    let instructions = assets::instructions(config, config_dir)?;
    let settings = config.pipeline_settings()?;
    let client = ChatClient::new(config.api_config()?)?;

    let original = read_text(summary)?;
    let neighbor_texts = neighbors
        .iter()
        .map(|path| read_text(path))
        .collect::<Result<Vec<_>>>()?;

    let comparator = Comparator::new(client, EmailNotifier::new(config.email_config()))
        .with_instruction(instructions.comparison)
        .with_max_response_tokens(settings.max_response_tokens);
    let report = comparator.compare(&original, &neighbor_texts).await;
    println!("{report}");
    Ok(())
}

fn chunk(config: &PrecisConfig, file: &Path, max_tokens: Option<usize>) -> Result<()> {
    let chunker = build_chunker(config, max_tokens)?;
    let text = read_text(file)?;
    let chunks = chunker.chunk(&text)?;

    for chunk in &chunks {
        println!(
            "{}\t{} tokens\t{} bytes",
            chunk.index(),
            chunk.token_count(),
            chunk.text().len()
        );
    }
    tracing::info!(
        chunks = chunks.len(),
        max_tokens = chunker.max_tokens(),
        "Dry run complete"
    );
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, warnings) = open_log_file();
    match log_file {
        Some((path, file)) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            tracing::info!(path = %path.display(), "Logging initialized");
            for warning in warnings {
                tracing::warn!("{warning}");
            }
        }
        // stdout carries the summary; logs only ever go to stderr.
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
            for warning in warnings {
                tracing::warn!("{warning}");
            }
        }
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log directory {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.precis/logs/precis.log
    if let Some(config_path) = PrecisConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("precis.log"));
    }

    // Fallback: ./.precis/logs/precis.log
    candidates.push(PathBuf::from(".precis").join("logs").join("precis.log"));

    candidates
}
