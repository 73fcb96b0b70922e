mod api;
mod config;
mod error;
mod models;
mod sandbox;
mod toolchain;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    api::AppState,
    config::{EXECUTION_DEADLINE, ServiceConfig, ToolchainConfig, WorkspaceConfig},
    sandbox::{ExecutionService, ProcessSupervisor},
    toolchain::{HttpInstallerFetcher, ToolchainProvisioner, platform::Platform},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ServiceConfig::from_env().context("failed to build service config")?;
    init_tracing(&cfg);

    let toolchain = Arc::new(ToolchainConfig::resolve(
        &cfg.workspace_root,
        Platform::current(),
    ));
    tracing::info!(
        platform = %toolchain.platform,
        workspace = %cfg.workspace_root.display(),
        "initializing toolchain"
    );
    let fetcher = HttpInstallerFetcher::new(cfg.download_timeout)
        .context("failed to build installer client")?;
    ToolchainProvisioner::new(toolchain.clone(), Arc::new(fetcher))
        .ensure_installed()
        .await
        .context("failed to initialize toolchain")?;

    let service = ExecutionService::new(
        toolchain.clone(),
        WorkspaceConfig::new(&cfg.workspace_root),
        ProcessSupervisor::new(EXECUTION_DEADLINE, cfg.max_output_bytes),
    );
    let app = api::routes(AppState::new(Arc::new(service), toolchain.clone()));

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .context("failed to bind listener")?;
    tracing::info!(
        addr = %cfg.bind_addr,
        rustup_home = %toolchain.rustup_home.display(),
        "playground server listening"
    );

    axum::serve(listener, app)
        .await
        .context("playground server error")?;
    Ok(())
}

fn init_tracing(cfg: &ServiceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
