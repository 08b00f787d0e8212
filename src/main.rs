#![forbid(unsafe_code)]

//! `fl-participant`: federated-learning participant node binary.
//!
//! Bootstraps configuration and the record store, resets sessions left
//! live by a previous run, serves the HTTP binding, and tears every live
//! worker session down on shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use fl_participant::config::GlobalConfig;
use fl_participant::http;
use fl_participant::persistence::db;
use fl_participant::rpc::ServiceContext;
use fl_participant::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "fl-participant", about = "Federated-learning participant node", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Lower the default log level to debug.
    #[arg(long)]
    debug: bool,

    /// Override the node id from the configuration file.
    #[arg(long)]
    id: Option<String>,

    /// Keep file-system paths out of the logs.
    #[arg(long)]
    censored: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format, args.debug)?;
    info!("fl-participant bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(id) = args.id {
        if id.trim().is_empty() {
            return Err(AppError::Config("--id must not be empty".into()));
        }
        config.node_id = id;
    }
    config.censored |= args.censored;
    let config = Arc::new(config);
    info!(node_id = config.node_id.as_str(), out_dir = %config.log_path(&config.out_dir), "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    let ctx = ServiceContext::new(Arc::clone(&config), db);

    // ── Restore lock-step after a crash ─────────────────
    let reset = ctx.lifecycle.reconcile_on_startup(&ctx.locks).await?;
    if reset > 0 {
        warn!(count = reset, "reset stale live sessions on startup");
    }

    // ── Start transport ─────────────────────────────────
    let bind = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;

    let ct = CancellationToken::new();
    let http_ct = ct.clone();
    let http_ctx = ctx.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve_http(listener, http_ctx, http_ct).await {
            error!(%err, "http transport failed");
        }
    });

    info!("participant node ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();
    if let Err(err) = http_handle.await {
        error!(%err, "http transport task did not finish cleanly");
    }

    // ── Graceful shutdown: tear down live sessions ──────
    let live = ctx.registry.len();
    let terminated = ctx.lifecycle.terminate_all(&ctx.locks).await;
    info!(live, terminated, "fl-participant shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
