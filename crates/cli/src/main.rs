//! Lexis CLI entry point.
//!
//! This binary is the composition root for the workspace. It:
//!
//! 1. Parses arguments and environment with `clap`.
//! 2. Installs the tracing subscriber (see [`observability`]).
//! 3. Loads `agents.yaml` / `tasks.yaml` into descriptors (see [`config`]).
//! 4. Builds the OpenAI-compatible provider wrapped in retries and injects it
//!    into [`ExtractionPipeline`].
//!
//! Only the JSON result is written to stdout. Exit status is `0` on success,
//! `1` when the extraction fails and `2` when configuration is unusable.

mod config;
mod observability;

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use llm::{
    OpenAiConfig, OpenAiProvider, ProviderError, RetryConfig, RetryingProvider, DEFAULT_BASE_URL,
    DEFAULT_TIMEOUT,
};
use pipeline::{CefrLevel, ExtractionError, ExtractionPipeline};

use crate::config::{ConfigError, ExtractionConfig};
use crate::observability::LogFormat;

/// Consulted when `--api-key` / `LEXIS_API_KEY` are absent.
const FALLBACK_API_KEY_VAR: &str = "OPENAI_API_KEY";

const EXIT_EXTRACTION_FAILURE: u8 = 1;
const EXIT_CONFIGURATION_FAILURE: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "lexis",
    version,
    about = "Extract vocabulary worth learning from a text with an LLM agent"
)]
struct Cli {
    /// Log line format written to stderr.
    #[arg(long, global = true, value_enum, env = "LEXIS_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one extraction and print the result as JSON.
    Extract(ExtractArgs),
    /// Validate the agent and task configuration without calling a model.
    CheckConfig(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Directory holding agents.yaml and tasks.yaml.
    #[arg(long, env = "LEXIS_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Agent key in agents.yaml.
    #[arg(long, default_value = "word_extractor")]
    agent: String,

    /// Task key in tasks.yaml.
    #[arg(long, default_value = "word_extraction_task")]
    task: String,

    /// Overrides the agent's configured model.
    #[arg(long, env = "LEXIS_MODEL")]
    model: Option<String>,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Text to analyse. Read from stdin when neither --text nor --file is given.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    /// File containing the text to analyse.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Target CEFR level (A1..C2); defaults to the task's configured level.
    #[arg(long)]
    level: Option<CefrLevel>,

    /// Print the full run record instead of just the result.
    #[arg(long)]
    report: bool,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Args)]
struct ProviderArgs {
    /// API key for the chat-completions endpoint (falls back to OPENAI_API_KEY).
    #[arg(long, env = "LEXIS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "LEXIS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "LEXIS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Attempts per request, including the first.
    #[arg(
        long,
        env = "LEXIS_MAX_ATTEMPTS",
        default_value_t = RetryConfig::default().max_attempts,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_attempts: u32,

    /// Ask for a plain JSON object instead of a strict JSON schema.
    #[arg(long)]
    no_structured_output: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _telemetry = match observability::init(cli.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(EXIT_CONFIGURATION_FAILURE);
        }
    };

    let outcome = match cli.command {
        Command::Extract(args) => extract(args).await,
        Command::CheckConfig(args) => check_config(&args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    let config = ExtractionConfig::load(&args.config.config_dir)?;
    let (agent, task) = config.descriptors(
        &args.config.agent,
        &args.config.task,
        args.config.model.as_deref(),
    )?;
    let provider = Arc::new(build_provider(&args.provider)?);
    let text = read_input(&args)?;

    let pipeline = ExtractionPipeline::new(agent, task, provider.clone());
    let record = pipeline.run(&text, args.level).await;
    if let Some(budget) = provider.inner().last_rate_limit() {
        debug!(
            remaining_requests = ?budget.remaining_requests,
            remaining_tokens = ?budget.remaining_tokens,
            "provider rate-limit budget"
        );
    }

    if args.report {
        print_json(&record)?;
        record.into_result()?;
    } else {
        print_json(&record.into_result()?)?;
    }
    Ok(())
}

fn check_config(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = ExtractionConfig::load(&args.config_dir)?;
    let (agent, task) = config.descriptors(&args.agent, &args.task, args.model.as_deref())?;

    info!(
        config_dir = %args.config_dir.display(),
        agents = config.agents.len(),
        tasks = config.tasks.len(),
        "configuration is valid"
    );
    println!("agent: {} (model {})", agent.role(), agent.model());
    println!(
        "task:  {} (default level {}, max {} input words)",
        task.name(),
        task.default_level()
            .map(|level| level.to_string())
            .unwrap_or_else(|| "none".to_string()),
        task.max_input_words()
    );
    Ok(())
}

fn build_provider(args: &ProviderArgs) -> Result<RetryingProvider<OpenAiProvider>, ProviderError> {
    let api_key = args
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| std::env::var(FALLBACK_API_KEY_VAR).ok())
        .unwrap_or_default();

    let provider = OpenAiProvider::new(
        OpenAiConfig::new(api_key)
            .with_base_url(args.base_url.as_str())
            .with_timeout(Duration::from_secs(args.timeout_secs))
            .with_structured_output(!args.no_structured_output),
    )?;
    let retry = RetryConfig {
        max_attempts: args.max_attempts,
        ..RetryConfig::default()
    };
    Ok(RetryingProvider::new(provider, retry))
}

fn read_input(args: &ExtractArgs) -> anyhow::Result<String> {
    match (&args.text, &args.file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input text from {}", path.display())),
        (None, None) => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read input text from stdin")?;
            Ok(text)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Maps a failure onto the process exit status.
fn exit_code(err: &anyhow::Error) -> u8 {
    let configuration = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || cause.is::<ProviderError>()
            || matches!(
                cause.downcast_ref::<ExtractionError>(),
                Some(ExtractionError::Configuration { .. })
            )
    });
    if configuration {
        EXIT_CONFIGURATION_FAILURE
    } else {
        EXIT_EXTRACTION_FAILURE
    }
}
