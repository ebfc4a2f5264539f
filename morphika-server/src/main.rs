//! Morphika Server - Headless Daemon
//!
//! A Rust HTTP server that:
//! - Exposes the model studio (plans, usage, models, assets, training) on /api/*
//! - Receives training backend and billing callbacks on /api/webhooks, /api/billing
//! - Sweeps in-flight training jobs in the background
//!
//! Access via: http://localhost:8046

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

mod api;
mod cli;
mod commands;
mod router;
mod scheduler;
mod server_utils;
mod state;
#[cfg(test)]
mod test_helpers;

use cli::{Cli, Commands};
use morphika_core::modules::{config as core_config, logger, paths};
use morphika_core::{Collaborators, JsonRepository, StateRepository, Studio};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Plans { json }) => commands::handle_plans(json),
        Some(Commands::Config(cmd)) => commands::handle_config_command(cmd),
        Some(Commands::Serve { port }) => run_server(port.or(cli.port)).await,
        None => run_server(cli.port).await,
    }
}

async fn run_server(port_override: Option<u16>) -> Result<()> {
    let mut config = core_config::load_config().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let log_dir = if config.logging.to_file {
        Some(paths::get_log_dir().map_err(|e| anyhow::anyhow!(e))?)
    } else {
        None
    };
    let _log_guard =
        logger::init_logger(&config.logging, log_dir.as_deref()).map_err(|e| anyhow::anyhow!(e))?;

    info!("🚀 Morphika Server starting on port {}...", config.server.port);

    let collaborators = Collaborators::from_config(&config).map_err(|e| anyhow::anyhow!(e))?;
    if !config.supabase.is_enabled() {
        warn!("⚠️ Supabase not configured, using in-memory identity, storage and billing");
    }
    if !config.replicate.enabled {
        warn!("⚠️ Replicate disabled, using in-memory training backend");
    }

    let repository: Option<Arc<dyn StateRepository>> = if config.persist_state {
        let state_dir = paths::get_state_dir().map_err(|e| anyhow::anyhow!(e))?;
        info!("💾 Persisting state under {}", state_dir.display());
        Some(Arc::new(JsonRepository::new(state_dir)))
    } else {
        None
    };

    let studio = Arc::new(Studio::new(collaborators, &config, repository));
    match studio.restore().await {
        Ok(report) => info!(
            "📊 Restored {} accounts, {} models, {} assets, {} jobs",
            report.accounts, report.models, report.assets, report.jobs
        ),
        Err(e) => warn!("⚠️ Could not restore persisted state: {}", e),
    }

    let billing_secret = std::env::var(&config.billing.webhook_secret_env).ok();
    let state = AppState::new(studio, billing_secret);
    info!("✅ Application state initialized");

    scheduler::start_training_poll(state.clone());

    let app = router::build_router(state);
    let listener = server_utils::create_listener(&config.server.host, config.server.port).await?;

    info!("🌐 Server listening on http://{}:{}", config.server.host, config.server.port);
    info!("🔌 API available at http://{}:{}/api/", config.server.host, config.server.port);

    axum::serve(listener, app).with_graceful_shutdown(server_utils::shutdown_signal()).await?;

    info!("👋 Morphika Server stopped");
    Ok(())
}
