//! Connection bridge: supervisor + transport orchestration.
//!
//! ```text
//!  Uninitialized ──► Launching ──► WaitingForHandshake ──► Ready
//!                        │                  │                │
//!                        ▼                  ▼                ▼
//!                     [Failed] ◄────────────┘           [Shutdown]
//! ```
//!
//! The two processes share no synchronization primitive beyond the
//! mapped memory itself, so readiness is a bounded poll: check the
//! child is alive, try to attach, test the `SERVER_READY` bit, sleep,
//! repeat — until the configured timeout. `Failed` is absorbing and
//! requires an explicit [`restart`](KernelBridge::restart).

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::SlateError;
use crate::remote::RemoteKernel;
use crate::supervisor::{KernelSupervisor, SupervisorConfig};

// ── BridgePhase ──────────────────────────────────────────────────

/// Lifecycle phase of a kernel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgePhase {
    /// No session yet. Initial state.
    #[default]
    Uninitialized,

    /// Resolving and spawning the kernel executable.
    Launching,

    /// Kernel process is up; polling for the handshake flags.
    WaitingForHandshake,

    /// Handshake complete; the remote kernel is usable.
    Ready,

    /// Launch or handshake failed. Absorbing until `restart()`.
    Failed,

    /// Session torn down. Terminal until `initialize()`.
    Shutdown,
}

impl BridgePhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, BridgePhase::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BridgePhase::Failed)
    }
}

impl fmt::Display for BridgePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgePhase::Uninitialized => "Uninitialized",
            BridgePhase::Launching => "Launching",
            BridgePhase::WaitingForHandshake => "WaitingForHandshake",
            BridgePhase::Ready => "Ready",
            BridgePhase::Failed => "Failed",
            BridgePhase::Shutdown => "Shutdown",
        };
        write!(f, "{name}")
    }
}

// ── BridgeConfig ─────────────────────────────────────────────────

/// Timing knobs for the handshake poll loop.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Total window for launch-to-ready before giving up.
    pub connect_timeout: Duration,
    /// Delay between handshake poll attempts.
    pub poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

// ── KernelBridge ─────────────────────────────────────────────────

/// One kernel session: owns the supervisor and the remote kernel.
///
/// An explicit owned object — embedders hold one per session (keyed by
/// session id) inside whatever owns their UI lifecycle; there are no
/// process-wide singletons.
pub struct KernelBridge {
    config: BridgeConfig,
    supervisor_config: SupervisorConfig,
    phase: BridgePhase,
    session_id: Option<String>,
    supervisor: Option<KernelSupervisor>,
    remote: Option<RemoteKernel>,
    last_error: Option<SlateError>,
}

impl KernelBridge {
    pub fn new(config: BridgeConfig, supervisor_config: SupervisorConfig) -> Self {
        Self {
            config,
            supervisor_config,
            phase: BridgePhase::Uninitialized,
            session_id: None,
            supervisor: None,
            remote: None,
            last_error: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BridgeConfig::default(), SupervisorConfig::default())
    }

    pub fn phase(&self) -> BridgePhase {
        self.phase
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.phase.is_ready()
    }

    /// The failure that put the bridge into `Failed`, if any.
    pub fn last_error(&self) -> Option<&SlateError> {
        self.last_error.as_ref()
    }

    /// The live remote kernel, once `Ready`.
    pub fn remote(&mut self) -> Option<&mut RemoteKernel> {
        if self.phase.is_ready() {
            self.remote.as_mut()
        } else {
            None
        }
    }

    /// Bring up a session: launch the kernel process and poll until the
    /// handshake completes or the window expires.
    ///
    /// A no-op success when already `Ready` for the same session id.
    /// Blocks the calling task for at most the configured timeout.
    pub async fn initialize(&mut self, session_id: &str) -> bool {
        if self.phase.is_ready() && self.session_id.as_deref() == Some(session_id) {
            info!(session = session_id, "bridge already initialized");
            return true;
        }

        self.shutdown().await;
        self.session_id = Some(session_id.to_string());
        self.last_error = None;
        info!(session = session_id, "initializing kernel bridge");

        self.phase = BridgePhase::Launching;
        let mut supervisor = KernelSupervisor::new(session_id, self.supervisor_config.clone());
        if !supervisor.find_executable() {
            return self.fail(SlateError::ExecutableNotFound);
        }
        if !supervisor.launch() {
            return self.fail(SlateError::LaunchFailed);
        }
        self.supervisor = Some(supervisor);

        self.phase = BridgePhase::WaitingForHandshake;
        let mut remote = RemoteKernel::new(session_id);
        let started = Instant::now();
        if let Err(e) = self.wait_for_handshake(&mut remote, started).await {
            return self.fail(e);
        }

        info!(
            session = session_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "kernel bridge ready"
        );
        self.remote = Some(remote);
        self.phase = BridgePhase::Ready;
        true
    }

    fn fail(&mut self, error: SlateError) -> bool {
        error!(session = self.session_id.as_deref().unwrap_or(""), "{error}");
        self.last_error = Some(error);
        self.phase = BridgePhase::Failed;
        false
    }

    async fn wait_for_handshake(
        &mut self,
        remote: &mut RemoteKernel,
        started: Instant,
    ) -> Result<(), SlateError> {
        while started.elapsed() < self.config.connect_timeout {
            // A dead kernel fails the session now, not at the timeout.
            if let Some(supervisor) = &mut self.supervisor {
                if !supervisor.is_running() {
                    return Err(SlateError::ProcessExited);
                }
            }

            if remote.connect() && remote.is_server_ready() {
                return Ok(());
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        Err(SlateError::HandshakeTimeout(self.config.connect_timeout))
    }

    /// Tear down and re-initialize with the current session id.
    pub async fn restart(&mut self) -> bool {
        let Some(session_id) = self.session_id.clone() else {
            error!("restart without a prior session");
            return false;
        };
        info!(session = %session_id, "restarting kernel bridge");
        self.shutdown().await;
        self.initialize(&session_id).await
    }

    /// Best-effort teardown: notify the kernel, close the transport,
    /// stop the process. Safe to call from any phase, repeatedly.
    pub async fn shutdown(&mut self) {
        if let Some(mut remote) = self.remote.take() {
            remote.shutdown();
        }
        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.stop().await;
        }
        self.session_id = None;
        self.phase = BridgePhase::Shutdown;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_and_predicates() {
        assert_eq!(BridgePhase::WaitingForHandshake.to_string(), "WaitingForHandshake");
        assert!(BridgePhase::Ready.is_ready());
        assert!(BridgePhase::Failed.is_failed());
        assert!(!BridgePhase::Uninitialized.is_ready());
    }

    #[test]
    fn default_phase_is_uninitialized() {
        let bridge = KernelBridge::with_defaults();
        assert_eq!(bridge.phase(), BridgePhase::Uninitialized);
        assert!(bridge.session_id().is_none());
    }

    #[tokio::test]
    async fn restart_without_session_fails() {
        let mut bridge = KernelBridge::with_defaults();
        assert!(!bridge.restart().await);
    }

    #[tokio::test]
    async fn shutdown_from_uninitialized_is_safe() {
        let mut bridge = KernelBridge::with_defaults();
        bridge.shutdown().await;
        bridge.shutdown().await;
        assert_eq!(bridge.phase(), BridgePhase::Shutdown);
    }

    #[tokio::test]
    async fn initialize_fails_without_executable() {
        let scratch = std::env::temp_dir()
            .join("slate")
            .join(format!("test_bridge_noexe_{}", std::process::id()));
        std::fs::create_dir_all(&scratch).unwrap();
        let supervisor_config = SupervisorConfig {
            data_dir: scratch.clone(),
            cache_dir: scratch.join("cache"),
            search_dirs: vec![],
            ..SupervisorConfig::default()
        };
        let mut bridge = KernelBridge::new(BridgeConfig::default(), supervisor_config);
        assert!(!bridge.initialize("no-exe").await);
        assert_eq!(bridge.phase(), BridgePhase::Failed);
        assert!(matches!(
            bridge.last_error(),
            Some(crate::error::SlateError::ExecutableNotFound)
        ));
        assert!(bridge.remote().is_none());
    }
}
