mod api;
mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::RwLock;
use tracing::{info, warn};

use webcrawler_core::AppConfig;
use webcrawler_index::SearchEngine;
use webcrawler_runtime::JobRegistry;

use crate::api::{build_app, AppState};
use crate::cli::Cli;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(16)
        .thread_stack_size(8 * 1024 * 1024)
        .max_blocking_threads(256)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        eprintln!("config file {} not found, using embedded defaults", cli.config);
        include_str!("../config/default.toml").to_string()
    });
    let config: AppConfig = toml::from_str(&config_str)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.general.log_filter.clone())),
        )
        .init();

    let data_dir = config.general.data_dir.clone();
    let registry = JobRegistry::new(&data_dir).await?;
    let search = SearchEngine::new(&data_dir);

    let state = AppState {
        config: Arc::new(config.clone()),
        registry: Arc::new(RwLock::new(registry)),
        search: Arc::new(search),
    };

    let app = build_app(state.clone());
    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    warn!("shutdown signal received, stopping all crawlers");
    let registry = state.registry.read().await;
    registry.stop_all().await;
}
