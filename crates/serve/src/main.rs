//! `serve`: persistent event-driven control plane dispatching webhook/timer/
//! RPC events to a single backing agent runtime, one turn at a time per
//! session.

mod config;
mod http;
mod rpc_dispatch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serve_dispatcher::Dispatcher;
use serve_executor::ExecutorConfig;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServeConfig;
use crate::http::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher and HTTP ingress/RPC server.
    Run {
        /// Directory for NDJSON logs and snapshot files.
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// HTTP bind address, overriding config/env.
        #[arg(long)]
        bind_addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Commands::Run { state_dir, config, bind_addr } = cli.command;

    let mut serve_config = ServeConfig::load(config.as_deref())?;
    if let Some(state_dir) = state_dir {
        serve_config.state_dir = state_dir;
    }
    if let Some(bind_addr) = bind_addr {
        serve_config.bind_addr = bind_addr;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(serve_config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    std::fs::create_dir_all(&serve_config.state_dir)?;

    let executor_config = ExecutorConfig::new(serve_config.executor_base_url.clone());
    let dispatcher = Dispatcher::new(
        serve_config.dispatcher.clone(),
        &serve_config.state_dir,
        executor_config,
    )
    .await?;

    let shutdown = CancellationToken::new();
    spawn_snapshot_task(dispatcher.clone(), shutdown.clone());

    let state = AppState {
        dispatcher: dispatcher.clone(),
        keepalive: serve_config.dispatcher.keepalive,
        max_body_bytes: serve_config.dispatcher.max_body_bytes,
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&serve_config.bind_addr).await?;
    info!(addr = %serve_config.bind_addr, "serve listening");

    let shutdown_for_serve = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown_for_serve.cancelled() => {}
            }
            info!("shutdown signal received, draining lanes");
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = dispatcher.persist_dedupe().await {
        warn!(error = %err, "failed to persist dedupe snapshot on shutdown");
    }
    Ok(())
}

/// Periodically rewrites `state.json`, write-temp-then-rename, so a crash
/// between writes never leaves a half-written snapshot on disk.
fn spawn_snapshot_task(dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = dispatcher.persist_dedupe().await {
                        warn!(error = %err, "periodic snapshot persist failed");
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }
    });
}
