#![forbid(unsafe_code)]

//! `kerbside` — bin collection reminder daemon.
//!
//! Bootstraps configuration, opens the `SQLite` store, restores the window
//! offsets and completion flags, then runs the poller, the scheduling
//! engine, the IPC server for `kerbside-ctl` and the HTTP status surface.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use kerbside::config::GlobalConfig;
use kerbside::ipc::server::spawn_ipc_server;
use kerbside::persistence::db::{self, Database};
use kerbside::persistence::override_repo::OverrideRepo;
use kerbside::persistence::parameter_repo::ParameterRepo;
use kerbside::poll::{check, spawn_poller, CheckOutcome, HttpCollectionClient, PollCoordinator};
use kerbside::schedule::observers::{spawn_override_writer, LogObserver, OverridePersister};
use kerbside::schedule::{Engine, Observer, ParameterStore, SystemClock};
use kerbside::{http, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "kerbside", about = "Bin collection reminder daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Fetch once for the configured address, report the outcome and exit.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("kerbside bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    let client = HttpCollectionClient::new(config.api_url.clone(), config.request_timeout())?;
    info!(address = %config.address, "configuration loaded");

    if args.check {
        return run_check(&client, &config.address).await;
    }

    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!(path = %config.db_path().display(), "database connected");

    match config.zone()? {
        Some(tz) => {
            info!(timezone = %tz, "using configured timezone");
            serve(config, db, client, tz).await
        }
        None => {
            info!("using host local timezone");
            serve(config, db, client, Local).await
        }
    }
}

async fn run_check(client: &HttpCollectionClient, address: &str) -> Result<()> {
    let (outcome, dates) = check(client, address).await;
    println!("{}", outcome.as_str());
    if let Some(dates) = dates {
        info!(red = ?dates.red, yellow = ?dates.yellow, "validation fetch succeeded");
    }
    if outcome == CheckOutcome::Success {
        Ok(())
    } else {
        Err(AppError::Fetch(format!(
            "validation fetch failed: {}",
            outcome.as_str()
        )))
    }
}

async fn serve<Tz>(
    config: GlobalConfig,
    db: Arc<Database>,
    client: HttpCollectionClient,
    tz: Tz,
) -> Result<()>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    let ct = CancellationToken::new();

    // ── Restore persisted state ─────────────────────────
    let mut parameters = ParameterStore::persistent(ParameterRepo::new(Arc::clone(&db)));
    parameters.load().await?;
    let override_repo = Arc::new(OverrideRepo::new(Arc::clone(&db)));
    let saved_overrides = override_repo.load_all().await?;
    info!(overrides = saved_overrides.len(), "persisted state restored");

    let mut engine = Engine::new(tz, Arc::new(SystemClock), parameters);
    engine.restore_overrides(&saved_overrides);

    let (persister, override_rx) = OverridePersister::channel();
    let writer_handle = spawn_override_writer(override_rx, override_repo);
    let log_observer: Arc<dyn Observer> = Arc::new(LogObserver);
    let persister: Arc<dyn Observer> = Arc::new(persister);
    engine.subscribe_all(&log_observer);
    engine.subscribe_all(&persister);
    // The engine now holds the only persister handles.
    drop(persister);

    // ── Start poller and engine ─────────────────────────
    let coordinator = Arc::new(PollCoordinator::new(
        Arc::new(client),
        config.address.clone(),
        config.request_timeout(),
    ));
    let (handle, engine_handle) =
        engine.spawn(Arc::clone(&coordinator), config.tick_interval(), ct.clone());
    let poller_handle = spawn_poller(coordinator, config.update_interval(), ct.clone());

    // ── Start command surfaces ──────────────────────────
    let ipc_handle = spawn_ipc_server(&config.ipc_name, handle.clone(), ct.clone())?;

    let http_handle = if config.http_port == 0 {
        info!("http status server disabled");
        None
    } else {
        let http_ct = ct.clone();
        let port = config.http_port;
        let http_engine = handle.clone();
        Some(tokio::spawn(async move {
            if let Err(err) = http::serve(port, http_engine, http_ct).await {
                error!(%err, "http status server failed");
            }
        }))
    };

    info!("kerbside ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(poller_handle, ipc_handle);
    if let Some(http_handle) = http_handle {
        let _ = http_handle.await;
    }
    // The writer exits once the engine has dropped its persisters.
    let _ = engine_handle.await;
    let _ = writer_handle.await;
    info!("kerbside shut down");

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
