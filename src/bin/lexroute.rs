// Lexroute - serve the legal assistant, or run one query locally

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use lexroute::AppConfig;
use lexroute::orchestration::InteractionState;
use lexroute::server::{self, Components};
use lexroute::streaming::{ConnectionHandle, StreamUnit, Transport, TransportError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Listen address, overrides [server] host and port
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one query through the workflow and print what a session would receive
    Ask {
        text: String,

        #[arg(long)]
        voice: bool,

        /// Tenant whose company documents are searched
        #[arg(long, default_value = "local")]
        tenant: String,
    },
}

/// Prints delivery units as they arrive
struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, unit: &StreamUnit) -> Result<(), TransportError> {
        let mut stdout = std::io::stdout().lock();
        let written = match unit {
            StreamUnit::Text { data } => write!(stdout, "{}", data),
            StreamUnit::Audio { text, audio_data } => {
                writeln!(stdout, "[audio {} bytes] {}", audio_data.len(), text)
            }
            StreamUnit::Start => writeln!(stdout, "[START]"),
            StreamUnit::End => writeln!(stdout, "\n[END]"),
        };
        written
            .and_then(|_| stdout.flush())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command {
        Command::Serve { bind } => server::serve(config, bind).await?,
        Command::Ask {
            text,
            voice,
            tenant,
        } => ask(&config, text, voice, tenant).await?,
    }

    Ok(())
}

async fn ask(config: &AppConfig, text: String, voice: bool, tenant: String) -> anyhow::Result<()> {
    let components = Components::from_config(config)?;
    let session_id = "local";
    components
        .registry
        .register(session_id, ConnectionHandle::new(Arc::new(StdoutTransport)))
        .await;

    let state = InteractionState::new(session_id, tenant, text).with_voice(voice);
    let report = components.workflow.run_traced(state).await?;

    if !voice {
        println!();
    }
    let stages: Vec<&str> = report.executed.iter().map(|s| s.as_str()).collect();
    eprintln!("stages: {}", stages.join(" -> "));

    Ok(())
}
