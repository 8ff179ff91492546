//! Kernel-side (server) shared-memory transport.
//!
//! The kernel creates the backing store before the host ever attempts
//! to connect, publishes frames and state at its own render cadence,
//! and drains the command slot and input ring at its own tick cadence.
//! It is the sole writer of the frame block, the state snapshot and
//! the ring head, and the sole reader of the command slot and ring
//! tail.

use std::path::Path;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::error::SlateError;
use crate::shm::{ShmRegion, region_path};
use crate::wire::command::{Command, CommandKind, decode_text};
use crate::wire::event::InputEvent;
use crate::wire::layer::NO_OVERLAY;
use crate::wire::state::KernelState;
use crate::wire::{
    COMMAND_TEXT_SIZE, EVENT_SIZE, MAGIC, OFFSET_COMMAND_ARG1, OFFSET_COMMAND_ARG2,
    OFFSET_COMMAND_KIND, OFFSET_COMMAND_TEXT, OFFSET_FRAME_COUNT, OFFSET_FRAME_RATE,
    OFFSET_HEIGHT, OFFSET_MAGIC, OFFSET_PIXELS, OFFSET_RING_HEAD, OFFSET_RING_TAIL,
    OFFSET_STATE_FLAGS, OFFSET_TOP_OVERLAY, OFFSET_VERSION, OFFSET_WIDTH, PIXEL_COUNT,
    RING_SLOTS, SCREEN_HEIGHT, SCREEN_WIDTH, StateFlags, VERSION, ring_slot_offset,
};

// ── KernelTransport ──────────────────────────────────────────────

/// Server end of the shared-memory bridge.
///
/// Creating it creates the backing store; dropping it tears the store
/// down (the kernel process owns the region's lifetime).
pub struct KernelTransport {
    region: ShmRegion,
}

impl KernelTransport {
    /// Create the backing store for `session_id` and initialize the
    /// header. `SERVER_READY` starts cleared; call
    /// [`set_ready`](Self::set_ready) once the kernel is fully up.
    pub fn create(session_id: &str) -> Result<Self, SlateError> {
        Self::create_at(&region_path(session_id))
    }

    /// As [`create`](Self::create), at an explicit path.
    pub fn create_at(path: &Path) -> Result<Self, SlateError> {
        let region = ShmRegion::create(path)?;

        region.atomic_u32(OFFSET_VERSION).store(VERSION, Ordering::Relaxed);
        region.atomic_u32(OFFSET_WIDTH).store(SCREEN_WIDTH, Ordering::Relaxed);
        region.atomic_u32(OFFSET_HEIGHT).store(SCREEN_HEIGHT, Ordering::Relaxed);
        region.atomic_u32(OFFSET_FRAME_COUNT).store(0, Ordering::Relaxed);
        region.atomic_u32(OFFSET_FRAME_RATE).store(60, Ordering::Relaxed);
        region.atomic_u32(OFFSET_STATE_FLAGS).store(0, Ordering::Relaxed);
        region
            .atomic_i32(OFFSET_TOP_OVERLAY)
            .store(NO_OVERLAY, Ordering::Relaxed);
        region.atomic_i32(OFFSET_RING_HEAD).store(0, Ordering::Relaxed);
        region.atomic_i32(OFFSET_RING_TAIL).store(0, Ordering::Relaxed);
        region.atomic_i32(OFFSET_COMMAND_KIND).store(0, Ordering::Relaxed);

        // Magic last: a connecting host validates it before anything else.
        region.atomic_u32(OFFSET_MAGIC).store(MAGIC, Ordering::Release);

        info!(path = %path.display(), "kernel region initialized");
        Ok(Self { region })
    }

    /// The backing-store path.
    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Publish or clear the `SERVER_READY` handshake bit.
    pub fn set_ready(&self, ready: bool) {
        let flags = self.region.atomic_u32(OFFSET_STATE_FLAGS);
        if ready {
            flags.fetch_or(StateFlags::SERVER_READY.bits(), Ordering::AcqRel);
        } else {
            flags.fetch_and(!StateFlags::SERVER_READY.bits(), Ordering::AcqRel);
        }
    }

    /// Whether a host currently holds the region open.
    pub fn is_client_connected(&self) -> bool {
        let bits = self.region.atomic_u32(OFFSET_STATE_FLAGS).load(Ordering::Acquire);
        StateFlags::from_bits_truncate(bits).contains(StateFlags::CLIENT_CONNECTED)
    }

    /// Publish a frame: copy the pixel block, then advance the frame
    /// counter so pollers notice. The host tolerates reading the block
    /// mid-copy.
    pub fn publish_frame(&self, pixels: &[u32]) {
        if pixels.len() != PIXEL_COUNT {
            warn!(len = pixels.len(), "publish_frame with wrong pixel count; ignored");
            return;
        }
        self.region.write_words(OFFSET_PIXELS, pixels);
        self.region
            .atomic_u32(OFFSET_FRAME_COUNT)
            .fetch_add(1, Ordering::AcqRel);
    }

    /// Frames published so far.
    pub fn frame_count(&self) -> u32 {
        self.region.atomic_u32(OFFSET_FRAME_COUNT).load(Ordering::Acquire)
    }

    /// Overwrite the kernel-owned state fields from a snapshot.
    ///
    /// `state.frame_count` is ignored — the counter is advanced by
    /// [`publish_frame`](Self::publish_frame) alone. The host-owned
    /// `CLIENT_CONNECTED` bit and the `SERVER_READY` lifecycle bit are
    /// preserved.
    pub fn publish_state(&self, state: &KernelState) {
        self.region
            .atomic_u32(OFFSET_FRAME_RATE)
            .store(state.frame_rate, Ordering::Relaxed);
        self.region
            .atomic_i32(OFFSET_TOP_OVERLAY)
            .store(state.top_overlay_wire(), Ordering::Relaxed);

        let lifecycle = StateFlags::SERVER_READY.bits() | StateFlags::CLIENT_CONNECTED.bits();
        let snapshot_bits = state.flag_bits();
        let _ = self
            .region
            .atomic_u32(OFFSET_STATE_FLAGS)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((bits & lifecycle) | snapshot_bits)
            });
    }

    /// Take the pending command out of the slot, if any.
    ///
    /// Reads the kind word first (Acquire, pairing with the host's
    /// commit store), then the payload, then clears the slot. A second
    /// host command issued meanwhile simply wins the slot again.
    pub fn take_command(&self) -> Option<Command> {
        let kind_raw = self.region.atomic_i32(OFFSET_COMMAND_KIND).load(Ordering::Acquire);
        if kind_raw == 0 {
            return None;
        }

        let arg1 = self.region.atomic_i32(OFFSET_COMMAND_ARG1).load(Ordering::Relaxed);
        let arg2 = self.region.atomic_i32(OFFSET_COMMAND_ARG2).load(Ordering::Relaxed);
        let mut text = [0u8; COMMAND_TEXT_SIZE];
        self.region.read_bytes(OFFSET_COMMAND_TEXT, &mut text);

        self.region.atomic_i32(OFFSET_COMMAND_KIND).store(0, Ordering::Release);

        match CommandKind::try_from(kind_raw) {
            Ok(kind) => Some(Command {
                kind,
                arg1,
                arg2,
                text: decode_text(&text),
            }),
            Err(e) => {
                warn!("discarding unknown command: {e}");
                None
            }
        }
    }

    /// Dequeue the next input event, advancing the ring head.
    ///
    /// Returns `None` when the ring is empty. A slot that fails to
    /// decode is skipped (head still advances) so one corrupt record
    /// cannot wedge the ring.
    pub fn poll_input_event(&self) -> Option<InputEvent> {
        // This side is the sole writer of head.
        let head = self.region.atomic_i32(OFFSET_RING_HEAD).load(Ordering::Relaxed);
        let tail = self.region.atomic_i32(OFFSET_RING_TAIL).load(Ordering::Acquire);

        if !(0..RING_SLOTS as i32).contains(&head) || !(0..RING_SLOTS as i32).contains(&tail) {
            warn!(head, tail, "input ring indices corrupt; resetting");
            self.region.atomic_i32(OFFSET_RING_HEAD).store(0, Ordering::Release);
            return None;
        }
        if head == tail {
            return None;
        }

        let mut slot = [0u8; EVENT_SIZE];
        self.region.read_bytes(ring_slot_offset(head as usize), &mut slot);

        let next_head = (head + 1) % RING_SLOTS as i32;
        self.region
            .atomic_i32(OFFSET_RING_HEAD)
            .store(next_head, Ordering::Release);

        match InputEvent::decode(&slot) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("skipping undecodable input event: {e}");
                None
            }
        }
    }

    /// Drain every queued input event.
    pub fn drain_input_events(&self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        // Bounded: one lap of the ring at most per call.
        for _ in 0..RING_SLOTS {
            match self.poll_input_event() {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::region_dir;
    use crate::transport::HostTransport;
    use crate::wire::event::Modifiers;
    use std::path::PathBuf;

    fn test_path(tag: &str) -> PathBuf {
        region_dir().join(format!("test_kt_{tag}_{}.shm", std::process::id()))
    }

    fn pair(tag: &str) -> (KernelTransport, HostTransport) {
        let path = test_path(tag);
        let kernel = KernelTransport::create_at(&path).unwrap();
        let mut host = HostTransport::for_path(&path);
        assert!(host.connect());
        (kernel, host)
    }

    #[test]
    fn handshake_flags() {
        let (kernel, mut host) = pair("handshake");
        assert!(kernel.is_client_connected());
        assert!(!host.is_server_ready());
        kernel.set_ready(true);
        assert!(host.is_server_ready());
        host.close();
        assert!(!kernel.is_client_connected());
    }

    #[test]
    fn command_roundtrip() {
        let (kernel, mut host) = pair("cmd");
        host.send_command(&Command::with_text(CommandKind::Init, 400, 600, "world-42"));

        let cmd = kernel.take_command().unwrap();
        assert_eq!(cmd.kind, CommandKind::Init);
        assert_eq!(cmd.arg1, 400);
        assert_eq!(cmd.arg2, 600);
        assert_eq!(cmd.text, "world-42");

        // Slot is cleared after the take.
        assert!(kernel.take_command().is_none());
    }

    #[test]
    fn fast_reissue_overwrites_slot() {
        let (kernel, mut host) = pair("overwrite");
        host.send_command(&Command::plain(CommandKind::Sleep));
        host.send_command(&Command::plain(CommandKind::Wake));

        // Only the second command survives; the first was overwritten
        // before any kernel poll, which is the documented semantics.
        let cmd = kernel.take_command().unwrap();
        assert_eq!(cmd.kind, CommandKind::Wake);
        assert!(kernel.take_command().is_none());
    }

    #[test]
    fn ring_capacity_and_recovery() {
        let (kernel, mut host) = pair("ring");
        let ev = InputEvent::pointer_move(1, 2, Modifiers::empty(), 0);

        for i in 0..RING_SLOTS - 1 {
            assert!(host.write_input_event(&ev), "event {i} should fit");
        }
        // Ring is now full: the next write is dropped, indices intact.
        assert!(!host.write_input_event(&ev));
        assert_eq!(host.stats().events_dropped, 1);

        for _ in 0..5 {
            assert!(kernel.poll_input_event().is_some());
        }
        for _ in 0..5 {
            assert!(host.write_input_event(&ev));
        }
        assert!(!host.write_input_event(&ev));
    }

    #[test]
    fn ring_preserves_order_and_payload() {
        let (kernel, mut host) = pair("order");
        for i in 0..10i16 {
            let ev = InputEvent::pointer_down(i, i * 2, Modifiers::SHIFT, i as u64);
            assert!(host.write_input_event(&ev));
        }
        let events = kernel.drain_input_events();
        assert_eq!(events.len(), 10);
        for (i, ev) in events.iter().enumerate() {
            assert_eq!(ev.x, i as i16);
            assert_eq!(ev.y, (i * 2) as i16);
            assert_eq!(ev.modifiers, Modifiers::SHIFT);
        }
        assert!(kernel.poll_input_event().is_none());
    }

    #[test]
    fn frame_dedup_copies_once_per_publish() {
        let (kernel, mut host) = pair("dedup");
        let frame = vec![0xFF00FF00u32; PIXEL_COUNT];
        kernel.publish_frame(&frame);

        assert_eq!(host.read_pixels()[0], 0xFF00FF00);
        let copies = host.stats().frames_copied;
        // No new publish: the cache is served without another copy.
        let _ = host.read_pixels();
        let _ = host.read_pixels();
        assert_eq!(host.stats().frames_copied, copies);

        let frame2 = vec![0x11223344u32; PIXEL_COUNT];
        kernel.publish_frame(&frame2);
        assert_eq!(host.read_pixels()[123], 0x11223344);
        assert_eq!(host.stats().frames_copied, copies + 1);
    }

    #[test]
    fn state_publish_preserves_lifecycle_bits() {
        let (kernel, mut host) = pair("state");
        kernel.set_ready(true);

        let state = KernelState {
            sleeping: true,
            frame_rate: 24,
            top_overlay: Some(crate::wire::layer::OverlayLayer::Popup),
            ..KernelState::default()
        };
        kernel.publish_state(&state);

        assert!(host.is_server_ready());
        assert!(kernel.is_client_connected());
        let snap = host.read_state();
        assert!(snap.sleeping);
        assert_eq!(snap.frame_rate, 24);
        assert_eq!(
            snap.top_overlay,
            Some(crate::wire::layer::OverlayLayer::Popup)
        );
    }

    #[test]
    fn host_rejects_bad_magic() {
        let path = test_path("badmagic");
        let kernel = KernelTransport::create_at(&path).unwrap();
        kernel
            .region
            .atomic_u32(OFFSET_MAGIC)
            .store(0xDEAD_BEEF, Ordering::Release);

        let mut host = HostTransport::for_path(&path);
        assert!(!host.connect());
        assert!(!host.is_connected());
    }
}
