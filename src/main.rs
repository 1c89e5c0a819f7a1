#![forbid(unsafe_code)]

//! `interview-proctor` server binary.
//!
//! Bootstraps configuration, the `SQLite` store, the generation client,
//! and the session coordinator, recovers interviews that were in progress
//! when the server last stopped, then serves the session API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use interview_proctor::audit::{AuditLogger, JsonlAuditWriter};
use interview_proctor::config::GlobalConfig;
use interview_proctor::generation::HttpReplyGenerator;
use interview_proctor::http::{self, AppState};
use interview_proctor::orchestrator::{CoordinatorSettings, SessionCoordinator};
use interview_proctor::persistence::interview_repo::InterviewRepo;
use interview_proctor::persistence::{db, retention};
use interview_proctor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "interview-proctor", about = "Proctored interview session server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("interview-proctor server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_credentials().await?;
    info!(
        threshold = config.risk.threshold,
        deadline_secs = config.deadline.duration_seconds,
        "configuration loaded"
    );

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(path = %config.db_path.display(), "database connected");

    // ── Start retention service ──────────────────────────
    let ct = CancellationToken::new();
    let retention_handle =
        retention::spawn_retention_task(Arc::clone(&db), config.retention_days, ct.clone());
    info!(retention_days = config.retention_days, "retention service started");

    // ── Build coordinator ───────────────────────────────
    let generator = Arc::new(HttpReplyGenerator::new(&config.generation)?);
    let mut coordinator = SessionCoordinator::new(
        InterviewRepo::new(Arc::clone(&db)),
        generator,
        CoordinatorSettings::from(&config),
    );
    if let Some(ref dir) = config.audit_log_dir {
        let writer: Arc<dyn AuditLogger> = Arc::new(JsonlAuditWriter::new(dir.clone())?);
        coordinator = coordinator.with_audit(writer);
        info!(dir = %dir.display(), "audit log enabled");
    }
    let coordinator = Arc::new(coordinator);

    // ── Recover sessions interrupted by the last shutdown ──
    match coordinator.recover_in_progress().await {
        Ok(0) => info!("no in-progress sessions to recover"),
        Ok(count) => info!(count, "recovered in-progress sessions"),
        Err(err) => error!(%err, "session recovery failed"),
    }

    // ── Start HTTP API ──────────────────────────────────
    let state = Arc::new(AppState {
        coordinator: Arc::clone(&coordinator),
        risk: config.risk.clone(),
    });
    let http_ct = ct.clone();
    let port = config.http_port;
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(state, port, http_ct).await {
            error!(%err, "session API failed");
        }
    });

    info!("interview-proctor ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // Live sessions stay in progress in the store and are recovered on
    // the next start.
    info!(
        live_sessions = coordinator.live_count(),
        "leaving live sessions for recovery"
    );

    let _ = tokio::join!(http_handle, retention_handle);
    db.close().await;
    info!("interview-proctor shut down");

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
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
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
