//! Shared-memory transports for the host/kernel process pair.
//!
//! Each direction is single-producer/single-consumer:
//!
//! - kernel → host: frame block and state snapshot ([`KernelTransport`]
//!   writes, [`HostTransport`] polls)
//! - host → kernel: command slot and input-event ring
//!   ([`HostTransport`] writes, [`KernelTransport`] drains)
//!
//! No cross-process locks exist; correctness rests on commit-last
//! ordering for the command slot, the head/tail invariant of the ring,
//! and tolerance of torn pixel reads.

mod host;
mod kernel;

pub use host::{HostTransport, TransportStats};
pub use kernel::KernelTransport;
