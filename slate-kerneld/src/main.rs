//! Slate reference kernel daemon — entry point.
//!
//! ```text
//! slate-kerneld <session-id>             Serve a session until stopped
//! slate-kerneld <session-id> --fps 60    Override the render rate
//! slate-kerneld <session-id> --run-for 5 Exit after N seconds (dev)
//! ```
//!
//! Implements the kernel side of the bridge contract with a synthetic
//! frame source: create the backing store, publish frames and state at
//! the render cadence, drain the input ring, poll and clear the
//! command slot, and raise `SERVER_READY` once up. The production
//! shell (launcher, apps, web views) lives elsewhere; this daemon is
//! what development hosts and integration setups launch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use slate_core::wire::PIXEL_COUNT;
use slate_core::{
    Command, CommandKind, KernelState, KernelTransport, OverlayLayer, SCREEN_HEIGHT, SCREEN_WIDTH,
    SlateError,
};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "slate-kerneld", about = "Slate reference kernel daemon")]
struct Cli {
    /// Session identifier; determines the backing-store name.
    session_id: String,

    /// Target render rate in frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Start with the debug flag raised.
    #[arg(long)]
    debug: bool,

    /// Exit after this many seconds (development convenience).
    #[arg(long)]
    run_for: Option<u64>,
}

// ── Kernel ───────────────────────────────────────────────────────

/// Mutable kernel-side session state mirrored into the region.
struct Kernel {
    transport: KernelTransport,
    state: KernelState,
    overlays: Vec<OverlayLayer>,
    pixels: Vec<u32>,
    running: bool,
}

impl Kernel {
    fn new(session_id: &str, fps: u32, debug: bool) -> Result<Self, SlateError> {
        let transport = KernelTransport::create(session_id)?;
        let state = KernelState {
            frame_rate: fps.clamp(1, 120),
            debug,
            ..KernelState::default()
        };
        Ok(Self {
            transport,
            state,
            overlays: Vec::new(),
            pixels: vec![0u32; PIXEL_COUNT],
            running: true,
        })
    }

    fn handle_command(&mut self, cmd: Command) {
        debug!(kind = %cmd.kind, arg1 = cmd.arg1, arg2 = cmd.arg2, "command");
        match cmd.kind {
            CommandKind::Init => {
                info!(session = %cmd.text, width = cmd.arg1, height = cmd.arg2, "init");
            }
            CommandKind::Shutdown => {
                info!("shutdown requested by host");
                self.running = false;
            }
            CommandKind::Sleep => self.state.sleeping = true,
            CommandKind::Wake => self.state.sleeping = false,
            CommandKind::GoHome | CommandKind::HomeButton => {
                // Dismiss the top-most dismissible overlay, if any.
                if let Some(pos) = self.overlays.iter().rposition(|l| l.is_dismissible()) {
                    let layer = self.overlays.remove(pos);
                    info!(%layer, "dismissed overlay");
                }
            }
            CommandKind::AddOverlay => match OverlayLayer::from_wire(cmd.arg1) {
                Ok(Some(layer)) => self.overlays.push(layer),
                Ok(None) => {}
                Err(e) => warn!("add_overlay: {e}"),
            },
            CommandKind::RemoveOverlay => match OverlayLayer::from_wire(cmd.arg1) {
                Ok(Some(layer)) => {
                    if let Some(pos) = self.overlays.iter().rposition(|l| *l == layer) {
                        self.overlays.remove(pos);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("remove_overlay: {e}"),
            },
            CommandKind::SetFrameRate => {
                self.state.frame_rate = (cmd.arg1.max(1) as u32).clamp(1, 120);
                info!(fps = self.state.frame_rate, "frame rate changed");
            }
            CommandKind::Resize => {
                warn!(
                    width = cmd.arg1,
                    height = cmd.arg2,
                    "resize unsupported: geometry is fixed at {SCREEN_WIDTH}x{SCREEN_HEIGHT}"
                );
            }
        }
    }

    /// One kernel tick: drain host traffic, render, publish.
    fn tick(&mut self) {
        if let Some(cmd) = self.transport.take_command() {
            self.handle_command(cmd);
        }
        for event in self.transport.drain_input_events() {
            debug!(?event, "input");
        }

        if !self.state.sleeping {
            let frame = self.transport.frame_count().wrapping_add(1);
            render_test_pattern(&mut self.pixels, frame);
            self.transport.publish_frame(&self.pixels);
        }

        self.state.top_overlay = self.overlays.iter().rev().copied().find(|l| l.is_dismissible());
        self.transport.publish_state(&self.state);
    }
}

/// Animated gradient so hosts can see frames advancing.
fn render_test_pattern(pixels: &mut [u32], frame: u32) {
    for y in 0..SCREEN_HEIGHT {
        for x in 0..SCREEN_WIDTH {
            let r = (x * 255 / SCREEN_WIDTH) as u32;
            let g = (y * 255 / SCREEN_HEIGHT) as u32;
            let b = frame & 0xFF;
            pixels[(y * SCREEN_WIDTH + x) as usize] = 0xFF00_0000 | (r << 16) | (g << 8) | b;
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        session = %cli.session_id,
        fps = cli.fps,
        "slate-kerneld v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut kernel = Kernel::new(&cli.session_id, cli.fps, cli.debug)?;

    // Region is initialized and the render loop is about to run: the
    // handshake bit goes up now, not at process start.
    kernel.transport.set_ready(true);
    info!("kernel ready");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let started = Instant::now();
    while kernel.running && !stop.load(Ordering::SeqCst) {
        let tick_start = Instant::now();

        kernel.tick();

        if let Some(secs) = cli.run_for {
            if started.elapsed() >= Duration::from_secs(secs) {
                info!("run window elapsed");
                break;
            }
        }

        // Frame pacing at the current (possibly host-adjusted) rate.
        let interval = Duration::from_secs_f64(1.0 / kernel.state.frame_rate as f64);
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }

    kernel.transport.set_ready(false);
    info!(
        frames = kernel.transport.frame_count(),
        uptime_ms = started.elapsed().as_millis() as u64,
        "kernel stopped"
    );
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_fills_every_pixel() {
        let mut pixels = vec![0u32; PIXEL_COUNT];
        render_test_pattern(&mut pixels, 1);
        assert!(pixels.iter().all(|p| p & 0xFF00_0000 == 0xFF00_0000));
        // Gradient varies across the buffer.
        assert_ne!(pixels[0], pixels[PIXEL_COUNT - 1]);
    }

    #[test]
    fn test_pattern_varies_by_frame() {
        let mut a = vec![0u32; PIXEL_COUNT];
        let mut b = vec![0u32; PIXEL_COUNT];
        render_test_pattern(&mut a, 1);
        render_test_pattern(&mut b, 2);
        assert_ne!(a, b);
    }
}
