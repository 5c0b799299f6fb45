//! Strata - command-line client for the Strata knowledge platform
//!
//! Main entry point for the Strata CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ask, contents, conversations, feeds, specifications, workflows};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Strata - command-line client for the Strata knowledge platform
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding config.toml (default: platform config dir)
    #[arg(long, global = true, env = "STRATA_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingested content
    Contents(contents::ContentsArgs),

    /// Content feeds
    Feeds(feeds::FeedsArgs),

    /// Processing workflows
    Workflows(workflows::WorkflowsArgs),

    /// Model specifications
    Specifications(specifications::SpecificationsArgs),

    /// Conversations
    Conversations(conversations::ConversationsArgs),

    /// Ask a question, streaming the agent's answer
    Ask(ask::AskArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "strata=debug,strata_agent=debug,strata_llm=debug,strata_client=debug,strata_config=debug,info"
    } else {
        "strata=info,strata_agent=info,strata_llm=info,strata_client=info,warn"
    };

    let log_dir = dirs::data_dir()
        .map(|d| d.join("strata").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "strata.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "strata=trace,strata_agent=trace,strata_llm=trace,strata_client=trace,strata_config=trace,info",
                )),
        )
        .init();

    let loaded = strata_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    tracing::debug!(sources = ?loaded.loaded_from(), "Configuration loaded");

    let ctx = commands::Context {
        config: loaded.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Contents(args) => contents::run(args, &ctx).await,
        Commands::Feeds(args) => feeds::run(args, &ctx).await,
        Commands::Workflows(args) => workflows::run(args, &ctx).await,
        Commands::Specifications(args) => specifications::run(args, &ctx).await,
        Commands::Conversations(args) => conversations::run(args, &ctx).await,
        Commands::Ask(args) => ask::run(args, &ctx).await,
    }
}
