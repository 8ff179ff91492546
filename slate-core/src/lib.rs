//! # slate-core
//!
//! Cross-process bridge for the Slate device shell. A host client
//! embeds the simulated device inside a larger interactive
//! application; a supervised kernel server process owns the OS state
//! and renders frames. This crate is everything between the two:
//!
//! - **Wire format**: fixed layout of the shared-memory region —
//!   header, frame block, state snapshot, command slot, input ring
//! - **Shm**: memory-mapped backing store with deterministic,
//!   session-derived naming
//! - **Transport**: `HostTransport` (poll frames/state, push commands
//!   and input) and `KernelTransport` (the server half)
//! - **Supervisor**: `KernelSupervisor` — find/extract, spawn, drain,
//!   stop the kernel process
//! - **Bridge**: `KernelBridge` — launch-and-handshake state machine
//! - **Remote**: `RemoteKernel` — kernel-shaped facade for UI code
//! - **Error**: `SlateError` — typed, `thiserror`-based hierarchy

pub mod bridge;
pub mod error;
pub mod remote;
pub mod shm;
pub mod supervisor;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::{BridgeConfig, BridgePhase, KernelBridge};
pub use error::SlateError;
pub use remote::RemoteKernel;
pub use shm::{ShmRegion, region_path};
pub use supervisor::{KernelSupervisor, SupervisorConfig};
pub use transport::{HostTransport, KernelTransport, TransportStats};
pub use wire::command::{Command, CommandKind};
pub use wire::event::{InputEvent, InputEventKind, Modifiers};
pub use wire::layer::OverlayLayer;
pub use wire::state::KernelState;
pub use wire::{REGION_SIZE, SCREEN_HEIGHT, SCREEN_WIDTH, StateFlags};
