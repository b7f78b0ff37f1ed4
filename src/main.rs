//! SafeScrub - Local PII anonymization with reversible, encrypted sessions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use safescrub::{
    api::build_app,
    config::SafeScrubConfig,
    privacy::DetectorMode,
    proxy::ProxyState,
    session::SessionManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "safescrub")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Local PII anonymization with reversible, encrypted sessions")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SAFESCRUB_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and model proxy
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Anonymize a file (or stdin) and print the result
    Scrub {
        /// Enable NER detection (downloads model assets on first use)
        #[arg(long)]
        ner: bool,

        /// Also print the rehydrated text
        #[arg(long)]
        reveal: bool,

        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; logs go to stderr so scrub output stays clean
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("safescrub={},tower_http={}", log_level, log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = match &cli.config {
        Some(path) => SafeScrubConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SafeScrubConfig::default(),
    };

    match cli.command {
        Commands::Serve { host, port } => run_server(config, host, port).await,
        Commands::Scrub { ner, reveal, file } => run_scrub(config, ner, reveal, file).await,
        Commands::Config { default } => show_config(if default { None } else { Some(&config) }),
    }
}

async fn run_server(mut config: SafeScrubConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let manager = Arc::new(SessionManager::from_config(&config)?);
    manager.initialize().await?;
    if config.detector.initial_mode.requires_model() {
        // Falls back to regex on failure; the server still starts
        if let Err(e) = manager.set_detector_mode(DetectorMode::RegexPlusNer).await {
            tracing::warn!(error = %e, "NER unavailable at startup");
        }
    }

    let proxy = config
        .proxy
        .enabled
        .then(|| ProxyState::new(config.proxy.clone()));
    let app = build_app(manager.clone(), proxy, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("SafeScrub listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await?;

    manager.shutdown().await;
    Ok(())
}

async fn run_scrub(config: SafeScrubConfig, ner: bool, reveal: bool, file: Option<PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let manager = SessionManager::from_config(&config)?;

    let mut status_rx = manager.subscribe();
    let reporter = tokio::spawn(async move {
        let mut last = String::new();
        while status_rx.changed().await.is_ok() {
            let line = {
                let s = status_rx.borrow_and_update();
                if s.download_progress.is_empty() {
                    s.status.clone()
                } else {
                    format!("{} ({})", s.status, s.download_progress)
                }
            };
            if line != last {
                eprintln!("{}", line);
                last = line;
            }
        }
    });

    manager.initialize().await?;
    if ner {
        if let Err(e) = manager.set_detector_mode(DetectorMode::RegexPlusNer).await {
            eprintln!("warning: {}", e.user_message());
        }
    }

    let outcome = manager
        .anonymize(&text)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{}", outcome.anonymized_text);

    if let Some(stats) = manager.session_stats().await {
        eprintln!();
        eprintln!("{} entities replaced", stats.total_entities);
        for (entity_type, count) in &stats.counts_by_type {
            eprintln!("  {:<12} {}", entity_type, count);
        }
    }

    if reveal {
        let restored = manager
            .deanonymize(&outcome.anonymized_text)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!();
        println!("{}", restored);
    }

    manager.shutdown().await;
    reporter.abort();
    Ok(())
}

fn show_config(config: Option<&SafeScrubConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
