//! Bookshelf Server
//!
//! HTTP tool server for audited book storage

use anyhow::Context;
use bookshelf::config::{Config, ConfigOverrides};
use bookshelf::server::Server;
use bookshelf::store::BookStore;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bookshelf-server")]
#[command(about = "Audited storage, search and export for book content")]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long, env = "BOOKSHELF_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    args.overrides.apply(&mut config);

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    config.validate()?;

    info!("Starting Bookshelf Server");
    info!("Storage backend: {:?}", config.storage_backend);
    info!(
        "Auth: {}",
        if config.api_key.is_some() {
            "enabled (API key)"
        } else {
            "disabled"
        }
    );

    let store = BookStore::from_config(&config)
        .await
        .context("failed to initialize book store")?;

    // Parse bind address
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr()))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let server = Arc::new(Server::new(Arc::new(store), config.api_key.clone()));
    server
        .serve(listener, async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler; run until killed
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
