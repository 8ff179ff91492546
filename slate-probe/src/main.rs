//! Slate probe — entry point.
//!
//! ```text
//! slate-probe <session-id>               Launch a kernel and watch it
//! slate-probe <session-id> --attach      Attach to a running kernel
//! slate-probe <session-id> --seconds 10  Watch window length
//! slate-probe --gen-config               Dump default config and exit
//! ```
//!
//! The terminal rendition of the "UI layer" caller: it launches (or
//! attaches to) a session, shows the connecting phase, polls frames
//! and state once per tick, and reports transport statistics on exit.

mod config;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slate_core::{KernelBridge, RemoteKernel};

use crate::config::ProbeConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "slate-probe", about = "Slate bridge diagnostic tool")]
struct Cli {
    /// Session identifier.
    #[arg(default_value = "default")]
    session_id: String,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "slate-probe.toml")]
    config: PathBuf,

    /// Attach to an already-running kernel instead of launching one.
    #[arg(long)]
    attach: bool,

    /// How long to watch the session, in seconds.
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ProbeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ProbeConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("slate-probe v{}", env!("CARGO_PKG_VERSION"));

    if cli.attach {
        attach(&cli).await
    } else {
        launch(&cli, &config).await
    }
}

/// Launch a kernel through the bridge and watch the session.
async fn launch(cli: &Cli, config: &ProbeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut bridge = KernelBridge::new(config.bridge_config(), config.supervisor_config());

    info!(session = %cli.session_id, "connecting…");
    if !bridge.initialize(&cli.session_id).await {
        error!(phase = %bridge.phase(), "connection failed — try `slate-probe --attach` or restart");
        std::process::exit(1);
    }

    {
        let remote = bridge.remote().expect("bridge is ready");
        remote.wake();
        watch(remote, Duration::from_secs(cli.seconds)).await;
    }

    bridge.shutdown().await;
    Ok(())
}

/// Attach to a kernel some other host already launched.
async fn attach(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut remote = RemoteKernel::new(&cli.session_id);
    if !remote.connect() {
        error!(session = %cli.session_id, "no kernel region to attach to");
        std::process::exit(1);
    }
    if !remote.is_server_ready() {
        error!("kernel region exists but the server is not ready");
        std::process::exit(1);
    }

    watch(&mut remote, Duration::from_secs(cli.seconds)).await;
    // Attach mode leaves the session running; just detach cleanly.
    Ok(())
}

/// Poll the session once per tick and report once per second.
async fn watch(remote: &mut RemoteKernel, window: Duration) {
    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut last_frame_count = 0u32;

    while started.elapsed() < window {
        remote.update();
        let _ = remote.pixels();

        if last_report.elapsed() >= Duration::from_secs(1) {
            let frame_count = remote.frame_count();
            info!(
                frames = frame_count,
                fps = frame_count.wrapping_sub(last_frame_count),
                sleeping = remote.is_sleeping(),
                overlay = remote
                    .top_dismissible_overlay()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "-".into()),
                "tick"
            );
            last_frame_count = frame_count;
            last_report = Instant::now();
        }

        tokio::time::sleep(Duration::from_millis(16)).await;
    }

    let stats = remote.stats();
    info!(
        frames_copied = stats.frames_copied,
        events_dropped = stats.events_dropped,
        commands_sent = stats.commands_sent,
        "session statistics"
    );
}
