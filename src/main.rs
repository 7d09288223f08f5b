#![forbid(unsafe_code)]

//! `aseprite-dap` — debug adapter for Aseprite Lua scripts and extensions.
//!
//! Speaks DAP with the client over stdin/stdout, runs one debugging session
//! and exits when the session ends. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use aseprite_dap::config::ProjectKind;
use aseprite_dap::dap::{reader, writer};
use aseprite_dap::install::FsInstaller;
use aseprite_dap::runtime::process::ProcessLauncher;
use aseprite_dap::session::{run_session, SessionController, SessionInput};
use aseprite_dap::{AppError, BridgeConfig, Result};

/// Capacity of the session input and client output queues.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "aseprite-dap", about = "Aseprite Lua debug adapter", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Override the debugged script file or extension folder.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Override the project kind (script or extension).
    #[arg(long)]
    project_kind: Option<ProjectKind>,

    /// Override the agent endpoint port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the agent endpoint path.
    #[arg(long)]
    path: Option<String>,

    /// Override the runtime executable.
    #[arg(long)]
    runtime_exe: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("aseprite-dap bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    let result = runtime.block_on(run(args));

    // The stdin reader parks a blocking thread that never wakes on its own.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = BridgeConfig::load_from_path(&args.config)?;
    apply_overrides(&mut config, args);
    config.revalidate()?;
    let session = config.session();
    info!(endpoint = %session.endpoint_url(), "configuration loaded");

    // ── Client transport ────────────────────────────────
    let ct = CancellationToken::new();
    let (input_tx, input_rx) = mpsc::channel::<SessionInput>(CHANNEL_CAPACITY);
    let (client_tx, client_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let reader_handle = tokio::spawn(reader::run_reader(
        tokio::io::stdin(),
        input_tx.clone(),
        ct.clone(),
    ));
    let writer_ct = ct.clone();
    let writer_handle = tokio::spawn(async move {
        if let Err(err) = writer::run_writer(tokio::io::stdout(), client_rx, writer_ct).await {
            error!(%err, "client writer failed");
        }
    });

    // ── Signals ─────────────────────────────────────────
    let signal_tx = input_tx.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(SessionInput::Shutdown).await;
    });

    // ── Session ─────────────────────────────────────────
    let controller = SessionController::new(
        session.clone(),
        Arc::new(FsInstaller::new(session)),
        Arc::new(ProcessLauncher),
        client_tx,
        input_tx,
    );

    let controller = run_session(controller, input_rx)
        .instrument(info_span!("session"))
        .await;

    // Dropping the controller closes the client queue; the writer flushes
    // what is left and stops.
    drop(controller);
    let _ = writer_handle.await;

    ct.cancel();
    signal_handle.abort();
    reader_handle.abort();
    info!("aseprite-dap shut down");

    Ok(())
}

fn apply_overrides(config: &mut BridgeConfig, args: Cli) {
    if let Some(workspace) = args.workspace {
        config.workspace_root = workspace;
    }
    if let Some(source) = args.source {
        config.source = source;
    }
    if let Some(kind) = args.project_kind {
        config.project_kind = kind;
    }
    if let Some(port) = args.port {
        config.ws_port = port;
    }
    if let Some(path) = args.path {
        config.ws_path = path;
    }
    if let Some(exe) = args.runtime_exe {
        config.runtime_exe = exe;
    }
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
    // stdout carries the protocol.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

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
