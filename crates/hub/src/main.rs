//! `agent-hub` - CLI entry point.
//!
//! Wires the core services together (graph client, usage tracker, context
//! injector, provider registry, runner, orchestration) and exposes local
//! operational commands. The HTTP transport lives elsewhere; this binary is
//! the operator's toolbox.

mod bootstrap;
mod cli;
mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agent-hub", about = "Provider-agnostic LLM orchestration hub")]
struct Cli {
    /// Config file path (default: ~/.agent-hub/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check provider and backend connectivity.
    Doctor,
    /// Run one tier-optimization cycle.
    Optimize {
        /// Additional project scopes to optimize (global always included).
        #[arg(long)]
        project: Vec<String>,
    },
    /// Ingest a golden standard through the funnel (with clustering).
    Ingest {
        /// Episode content; reads stdin when omitted.
        content: Option<String>,
        /// Episode name (slug).
        #[arg(long, default_value = "golden_standard")]
        name: String,
        /// Project scope id (global scope when omitted).
        #[arg(long)]
        project: Option<String>,
    },
    /// Run an agent on a task with first-turn memory injection.
    Run {
        task: String,
        #[arg(long, default_value = "claude")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        project: Option<String>,
        /// Extended thinking level (minimal/low/medium/high/ultrathink).
        #[arg(long)]
        thinking: Option<String>,
    },
    /// Stream a one-shot completion to stdout (Ctrl-C cancels cleanly).
    Stream {
        prompt: String,
        #[arg(long, default_value = "claude")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Extract learnings from a session transcript file.
    Extract {
        transcript: PathBuf,
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Consolidate a completed task's memories.
    Consolidate {
        task_id: String,
        #[arg(long)]
        success: bool,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Show memory statistics.
    Stats {
        #[arg(long)]
        project: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    bootstrap::init_tracing();

    let config_path = cli
        .config
        .unwrap_or_else(ah_domain::config::HubConfig::default_path);
    let state = bootstrap::build_state(&config_path)?;

    let exit = match cli.command {
        Command::Doctor => cli::doctor::run(&state).await,
        Command::Optimize { project } => cli::optimize::run(&state, &project).await,
        Command::Ingest {
            content,
            name,
            project,
        } => cli::ingest::run(&state, content, &name, project.as_deref()).await,
        Command::Run {
            task,
            provider,
            model,
            project,
            thinking,
        } => cli::run_agent::run(&state, &task, &provider, model, project, thinking).await,
        Command::Stream {
            prompt,
            provider,
            model,
        } => cli::stream_cmd::run(&state, &prompt, &provider, model).await,
        Command::Extract {
            transcript,
            session_id,
        } => cli::extract::run(&state, &transcript, session_id).await,
        Command::Consolidate {
            task_id,
            success,
            project,
            summary,
        } => {
            cli::consolidate::run(&state, &task_id, success, project.as_deref(), summary.as_deref())
                .await
        }
        Command::Stats { project } => cli::stats::run(&state, &project).await,
    };

    // Background counters drain before the process exits.
    state.usage.shutdown().await;

    exit
}
