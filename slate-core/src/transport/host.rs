//! Host-side (client) shared-memory transport.
//!
//! Connection is polled, not evented: [`connect`](HostTransport::connect)
//! returns `false` while the kernel has not created the backing store
//! yet, and a magic mismatch is treated identically — a stale or
//! foreign region is indistinguishable from "not initialized yet".
//! Once connected, reads always succeed (returning the last snapshot)
//! and writes are best-effort; nothing here may take down the caller's
//! render loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use tracing::{debug, info, trace, warn};

use crate::error::SlateError;
use crate::shm::{ShmRegion, region_path};
use crate::wire::command::{Command, encode_text};
use crate::wire::event::InputEvent;
use crate::wire::state::KernelState;
use crate::wire::{
    MAGIC, OFFSET_COMMAND_ARG1, OFFSET_COMMAND_ARG2, OFFSET_COMMAND_KIND, OFFSET_COMMAND_TEXT,
    OFFSET_FRAME_COUNT, OFFSET_FRAME_RATE, OFFSET_HEIGHT, OFFSET_MAGIC, OFFSET_PIXELS,
    OFFSET_RING_HEAD, OFFSET_RING_TAIL, OFFSET_STATE_FLAGS, OFFSET_TOP_OVERLAY, OFFSET_VERSION,
    OFFSET_WIDTH, PIXEL_COUNT, RING_SLOTS, SCREEN_HEIGHT, SCREEN_WIDTH, StateFlags, VERSION,
    ring_slot_offset,
};

// ── TransportStats ───────────────────────────────────────────────

/// Best-effort counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    /// Pixel-block copies performed (one per observed frame change).
    pub frames_copied: u64,
    /// Input events dropped because the ring was full.
    pub events_dropped: u64,
    /// Commands written into the slot.
    pub commands_sent: u64,
}

// ── HostTransport ────────────────────────────────────────────────

/// Client end of the shared-memory bridge.
///
/// Owns a pixel cache so repeated [`read_pixels`](Self::read_pixels)
/// calls at render rate only copy from the mapping when the kernel has
/// actually published a new frame.
pub struct HostTransport {
    path: PathBuf,
    region: Option<ShmRegion>,
    pixels: Vec<u32>,
    last_frame_id: Option<u32>,
    state: KernelState,
    stats: TransportStats,
}

impl HostTransport {
    /// Transport for the region derived from `session_id`.
    pub fn new(session_id: &str) -> Self {
        Self::for_path(region_path(session_id))
    }

    /// Transport for an explicit backing-store path.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            region: None,
            pixels: vec![0u32; PIXEL_COUNT],
            last_frame_id: None,
            state: KernelState::default(),
            stats: TransportStats::default(),
        }
    }

    /// The backing-store path this transport attaches to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt to attach to the backing store.
    ///
    /// Returns `false` (never an error) while the store is missing,
    /// unmappable, or carries a wrong magic/version/geometry — all of
    /// which read as "kernel not up yet" from this side. On success the
    /// `CLIENT_CONNECTED` flag bit is set. Idempotent once connected.
    pub fn connect(&mut self) -> bool {
        if self.region.is_some() {
            return true;
        }
        match self.try_attach() {
            Ok(()) => true,
            Err(e) => {
                trace!(path = %self.path.display(), "not connected: {e}");
                false
            }
        }
    }

    /// The fallible half of [`connect`](Self::connect): validates the
    /// mapped header and reports the typed reason for a refusal. A
    /// failed attach drops the trial mapping again.
    fn try_attach(&mut self) -> Result<(), SlateError> {
        let region = ShmRegion::open(&self.path)?;

        let magic = region.atomic_u32(OFFSET_MAGIC).load(Ordering::Acquire);
        if magic != MAGIC {
            return Err(SlateError::InvalidMagic { found: magic });
        }
        let version = region.atomic_u32(OFFSET_VERSION).load(Ordering::Relaxed);
        if version != VERSION {
            return Err(SlateError::UnsupportedVersion(version));
        }
        let width = region.atomic_u32(OFFSET_WIDTH).load(Ordering::Relaxed);
        let height = region.atomic_u32(OFFSET_HEIGHT).load(Ordering::Relaxed);
        if (width, height) != (SCREEN_WIDTH, SCREEN_HEIGHT) {
            return Err(SlateError::GeometryMismatch { width, height });
        }

        region
            .atomic_u32(OFFSET_STATE_FLAGS)
            .fetch_or(StateFlags::CLIENT_CONNECTED.bits(), Ordering::AcqRel);

        info!(path = %self.path.display(), "connected to kernel region");
        self.region = Some(region);
        Ok(())
    }

    /// Whether the transport currently holds a mapping.
    pub fn is_connected(&self) -> bool {
        self.region.is_some()
    }

    /// Whether the kernel has set `SERVER_READY`. Non-blocking,
    /// callable every tick.
    pub fn is_server_ready(&self) -> bool {
        match &self.region {
            Some(region) => {
                let bits = region.atomic_u32(OFFSET_STATE_FLAGS).load(Ordering::Acquire);
                StateFlags::from_bits_truncate(bits).contains(StateFlags::SERVER_READY)
            }
            None => false,
        }
    }

    /// Poll the kernel state snapshot.
    ///
    /// Returns the last snapshot unchanged when not connected or
    /// before the kernel's first publish.
    pub fn read_state(&mut self) -> KernelState {
        if let Some(region) = &self.region {
            self.state = KernelState::from_raw(
                region.atomic_u32(OFFSET_FRAME_COUNT).load(Ordering::Acquire),
                region.atomic_u32(OFFSET_FRAME_RATE).load(Ordering::Relaxed),
                region.atomic_u32(OFFSET_STATE_FLAGS).load(Ordering::Relaxed),
                region.atomic_i32(OFFSET_TOP_OVERLAY).load(Ordering::Relaxed),
            );
        }
        self.state
    }

    /// The latest frame, copied out of the mapping only when the
    /// published frame id has advanced since the previous call.
    ///
    /// The copy is a best-effort snapshot: the kernel may be mid-write,
    /// and a torn frame simply self-heals on the next poll.
    pub fn read_pixels(&mut self) -> &[u32] {
        if let Some(region) = &self.region {
            let frame_id = region.atomic_u32(OFFSET_FRAME_COUNT).load(Ordering::Acquire);
            if self.last_frame_id != Some(frame_id) {
                region.read_words(OFFSET_PIXELS, &mut self.pixels);
                self.last_frame_id = Some(frame_id);
                self.stats.frames_copied += 1;
            }
        }
        &self.pixels
    }

    /// Write a command into the slot.
    ///
    /// Payload fields land first, the kind word last (Release), so a
    /// kernel that polls only the kind word never sees a stale payload.
    /// The slot is one deep: issuing a second command before the kernel
    /// polls silently replaces the first — an accepted design property,
    /// not a defect.
    pub fn send_command(&mut self, command: &Command) {
        let Some(region) = &self.region else {
            debug!(kind = %command.kind, "send_command while disconnected; dropped");
            return;
        };

        region
            .atomic_i32(OFFSET_COMMAND_ARG1)
            .store(command.arg1, Ordering::Relaxed);
        region
            .atomic_i32(OFFSET_COMMAND_ARG2)
            .store(command.arg2, Ordering::Relaxed);
        region.write_bytes(OFFSET_COMMAND_TEXT, &encode_text(&command.text));

        // Commit: the kind word makes the payload visible.
        region
            .atomic_i32(OFFSET_COMMAND_KIND)
            .store(command.kind as i32, Ordering::Release);
        self.stats.commands_sent += 1;
    }

    /// Enqueue an input event.
    ///
    /// Returns `false` (and logs) when the ring is full; events are
    /// never overwritten in place.
    pub fn write_input_event(&mut self, event: &InputEvent) -> bool {
        let Some(region) = &self.region else {
            debug!("write_input_event while disconnected; dropped");
            return false;
        };

        let head = region.atomic_i32(OFFSET_RING_HEAD).load(Ordering::Acquire);
        // This side is the sole writer of tail.
        let tail = region.atomic_i32(OFFSET_RING_TAIL).load(Ordering::Relaxed);

        if !(0..RING_SLOTS as i32).contains(&head) || !(0..RING_SLOTS as i32).contains(&tail) {
            warn!(head, tail, "input ring indices corrupt; dropping event");
            return false;
        }

        let next_tail = (tail + 1) % RING_SLOTS as i32;
        if next_tail == head {
            warn!("input ring full; dropping event");
            self.stats.events_dropped += 1;
            return false;
        }

        region.write_bytes(ring_slot_offset(tail as usize), &event.encode());
        region
            .atomic_i32(OFFSET_RING_TAIL)
            .store(next_tail, Ordering::Release);
        true
    }

    /// Detach from the region, clearing `CLIENT_CONNECTED`. Idempotent.
    pub fn close(&mut self) {
        if let Some(region) = self.region.take() {
            region
                .atomic_u32(OFFSET_STATE_FLAGS)
                .fetch_and(!StateFlags::CLIENT_CONNECTED.bits(), Ordering::AcqRel);
            info!(path = %self.path.display(), "closed kernel region");
        }
        self.last_frame_id = None;
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> TransportStats {
        self.stats
    }
}

impl Drop for HostTransport {
    fn drop(&mut self) {
        self.close();
    }
}
