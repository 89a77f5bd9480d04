use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webpilot::browser::scout::SearchScout;
use webpilot::browser::ChromeFactory;
use webpilot::channel::ClientChannel;
use webpilot::config::Config;
use webpilot::llm::{OfflineLlm, OpenAiConfig, OpenAiLlmClient};
use webpilot::orchestrator::Orchestrator;
use webpilot::screenshots::ArtifactStore;
use webpilot::server;
use webpilot::storage::Storage;
use webpilot_agent_core::{LlmClient, ScoutSearch};

/// Webpilot - natural-language web task agent
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level filter (e.g. info, debug, webpilot=debug)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator server (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("default filter is valid");
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve().await,
    }
}

async fn run_serve() -> Result<()> {
    let config = Config::from_env();

    let storage = Arc::new(
        Storage::connect(&config.db_path)
            .await
            .context("failed to open database")?,
    );
    let artifacts = Arc::new(ArtifactStore::new(config.artifacts_dir.clone()));
    let channel = ClientChannel::new();

    let llm: Arc<dyn LlmClient> = match OpenAiConfig::from_config(&config) {
        Some(llm_config) => Arc::new(OpenAiLlmClient::new(llm_config)),
        None => {
            warn!("WEBPILOT_LLM_API_KEY not set; planner and decider degrade to heuristics");
            Arc::new(OfflineLlm)
        }
    };
    let scout: Arc<dyn ScoutSearch> = Arc::new(SearchScout::new(channel.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        storage,
        llm,
        scout,
        channel,
        artifacts,
        Arc::new(ChromeFactory::new(config.clone())),
    ));

    server::serve(&config, orchestrator).await
}
