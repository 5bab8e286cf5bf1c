//! SDLC Server
//!
//! Axum server for the SDLC dashboard API, plus headless `run` and `check`
//! commands against the same pipeline.

mod api;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sdlc_core::agents::SdlcCrew;
use sdlc_core::config::PipelineConfig;
use sdlc_core::llm::OllamaClient;
use sdlc_core::state::io::resolve_output_root;
use sdlc_core::state::RunHistory;
use sdlc_core::swarm::{PipelineEvent, RunRegistry};

use api::AppState;

#[derive(Parser, Clone)]
#[command(author, version, about = "SDLC - Multi-agent software pipeline on local Ollama models")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the dashboard API server (default)
    Serve {
        /// Interface to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "5000")]
        port: u16,
    },
    /// Run the pipeline once in the terminal
    Run {
        /// Requirement text
        #[arg(short, long)]
        requirement: Option<String>,
        /// Read the requirement from a file
        #[arg(short, long, conflicts_with = "requirement")]
        file: Option<PathBuf>,
        /// Output directory for run folders
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that Ollama is reachable and every configured model is installed
    Check,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sdlc_core=info,sdlc_server=info"));
    let json = std::env::var("SDLC_LOG_JSON").map(|v| v == "1").unwrap_or(false);

    // Through the stderr router so a run's own log lines reach its stream
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| sdlc_core::console::stderr().writer());
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Build the Ollama-backed crew off the async runtime
async fn build_crew(config: PipelineConfig) -> anyhow::Result<SdlcCrew> {
    tokio::task::spawn_blocking(move || SdlcCrew::from_config(config))
        .await
        .context("Crew construction panicked")?
}

async fn serve(config: PipelineConfig, host: String, port: u16) -> anyhow::Result<()> {
    let output_root = resolve_output_root(&config.output_dir);
    let crew = build_crew(config.clone()).await?;

    let state = Arc::new(AppState {
        registry: Arc::new(RunRegistry::new(Arc::new(crew), config.clone())),
        history: RunHistory::new(output_root.clone()),
    });
    let app = api::app(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    println!("SDLC server running at http://{}", addr);
    println!("   Ollama:  {}", config.ollama_base_url);
    println!("   Output:  {}", output_root.display());
    println!("   Runs:    POST /start, GET /stream/:run_id");
    println!("   History: /api/history, /api/run/:run_id, /api/artifact/:run_id/:filename");
    println!("   Docs:    /api/openapi.json");
    info!(%addr, "Listening");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Requirement lines from stdin until a line reading `END`
fn read_requirement_interactive() -> anyhow::Result<String> {
    println!("Enter your software requirement (finish with a line containing only END):");
    let stdin = std::io::stdin();
    let mut lines = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim() == "END" {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

async fn read_requirement(
    requirement: Option<String>,
    file: Option<PathBuf>,
) -> anyhow::Result<String> {
    let text = match (requirement, file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read requirement file {:?}", path))?,
        (None, None) => tokio::task::spawn_blocking(read_requirement_interactive).await??,
    };
    Ok(text.trim().to_string())
}

async fn run_once(
    mut config: PipelineConfig,
    requirement: Option<String>,
    file: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(dir) = output {
        config.output_dir = dir;
    }

    let base_url = config.ollama_base_url.clone();
    let probe = config.clone();
    let reachable = tokio::task::spawn_blocking(move || {
        OllamaClient::from_config(&probe).map(|client| client.is_available())
    })
    .await??;
    if !reachable {
        anyhow::bail!("Ollama is not reachable at {}. Start it with `ollama serve`.", base_url);
    }

    let requirement = read_requirement(requirement, file).await?;
    if requirement.is_empty() {
        anyhow::bail!("Requirement is required");
    }

    let crew = build_crew(config.clone()).await?;
    let registry = Arc::new(RunRegistry::new(Arc::new(crew), config));
    let (run_id, mut events) = registry.start_and_stream(requirement)?;
    println!("Run {} started", run_id);

    let mut failed = false;
    while let Some(event) = events.next().await {
        if let PipelineEvent::Error { message } = &event {
            failed = true;
            eprintln!("Pipeline failed: {}", message);
        } else if let Some(line) = progress_line(&event) {
            println!("{}", line);
        }
    }

    if failed {
        anyhow::bail!("Run {} failed", run_id);
    }
    Ok(())
}

/// Terminal line for a run event.
///
/// Agent text is not repeated here: the run thread's console writes already
/// reach the real stdout before they are turned into `agent_output` events.
fn progress_line(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::Status { message } => Some(message.clone()),
        PipelineEvent::PhaseStart {
            phase_index,
            phase,
            agent,
            model,
            icon,
            ..
        } => Some(format!(
            "\n{} Phase {}: {} ({} / {})",
            icon,
            phase_index + 1,
            phase,
            agent,
            model
        )),
        PipelineEvent::PhaseComplete {
            phase,
            file,
            content_length,
            ..
        } => Some(format!("\n{} complete: {} ({} chars)", phase, file, content_length)),
        PipelineEvent::PipelineComplete {
            run_id,
            elapsed_display,
            files_count,
            ..
        } => Some(format!(
            "\nPipeline complete in {}: {} files in run {}",
            elapsed_display, files_count, run_id
        )),
        PipelineEvent::Error { message } => Some(format!("Pipeline failed: {}", message)),
        PipelineEvent::PipelineStart { .. }
        | PipelineEvent::AgentOutput { .. }
        | PipelineEvent::Heartbeat
        | PipelineEvent::Done => None,
    }
}

/// Installed tags match exactly or through the implicit `:latest`
fn is_installed(installed: &[String], model: &str) -> bool {
    installed
        .iter()
        .any(|tag| tag == model || tag.strip_suffix(":latest") == Some(model))
}

async fn check(config: PipelineConfig) -> anyhow::Result<()> {
    let required = config.required_models();
    let base_url = config.ollama_base_url.clone();

    let installed = tokio::task::spawn_blocking(move || {
        let client = OllamaClient::from_config(&config)?;
        client.list_models()
    })
    .await?
    .with_context(|| format!("Ollama is not reachable at {}", base_url))?;

    println!("Ollama reachable at {}", base_url);
    let mut missing = Vec::new();
    for model in &required {
        if is_installed(&installed, model) {
            println!("   [ok]      {}", model);
        } else {
            println!("   [missing] {}  (ollama pull {})", model, model);
            missing.push(model.clone());
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("{} of {} models missing", missing.len(), required.len());
    }
    println!("All {} models installed", required.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = PipelineConfig::load()?;

    match args.command {
        Some(CliCommand::Serve { host, port }) => serve(config, host, port).await,
        None => serve(config, "0.0.0.0".to_string(), 5000).await,
        Some(CliCommand::Run {
            requirement,
            file,
            output,
        }) => run_once(config, requirement, file, output).await,
        Some(CliCommand::Check) => check(config).await,
    }
}
