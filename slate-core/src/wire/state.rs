//! Kernel state snapshot.
//!
//! The kernel overwrites its half of the header wholesale each publish
//! cycle; the host polls it into this plain struct. There is no
//! history — a snapshot is only ever the latest published values.

use crate::wire::layer::{NO_OVERLAY, OverlayLayer};
use crate::wire::StateFlags;

/// A decoded snapshot of the kernel-owned header fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelState {
    /// Frames published since kernel start.
    pub frame_count: u32,
    /// Current target render rate.
    pub frame_rate: u32,
    /// Device is asleep (screen off, input ignored).
    pub sleeping: bool,
    /// Kernel debug overlay enabled.
    pub debug: bool,
    /// A text field currently has input focus.
    pub text_input_focus: bool,
    /// Top-most overlay a home-button press may dismiss.
    pub top_overlay: Option<OverlayLayer>,
}

impl Default for KernelState {
    fn default() -> Self {
        Self {
            frame_count: 0,
            frame_rate: 60,
            sleeping: false,
            debug: false,
            text_input_focus: false,
            top_overlay: None,
        }
    }
}

impl KernelState {
    /// Rebuild a snapshot from raw header words.
    ///
    /// An unrecognized overlay id decodes as `None` rather than failing:
    /// a stale value must not take down the host's poll loop.
    pub fn from_raw(frame_count: u32, frame_rate: u32, flag_bits: u32, top_overlay: i32) -> Self {
        let flags = StateFlags::from_bits_truncate(flag_bits);
        Self {
            frame_count,
            frame_rate,
            sleeping: flags.contains(StateFlags::SLEEPING),
            debug: flags.contains(StateFlags::DEBUG),
            text_input_focus: flags.contains(StateFlags::TEXT_INPUT_FOCUS),
            top_overlay: OverlayLayer::from_wire(top_overlay).unwrap_or_else(|_| {
                tracing::debug!(top_overlay, "unknown overlay id in kernel state");
                None
            }),
        }
    }

    /// The kernel-owned flag bits of this snapshot.
    ///
    /// `SERVER_READY` and `CLIENT_CONNECTED` are lifecycle bits managed
    /// outside the snapshot and are never part of the result.
    pub fn flag_bits(&self) -> u32 {
        let mut flags = StateFlags::empty();
        flags.set(StateFlags::SLEEPING, self.sleeping);
        flags.set(StateFlags::DEBUG, self.debug);
        flags.set(StateFlags::TEXT_INPUT_FOCUS, self.text_input_focus);
        flags.bits()
    }

    /// The overlay field as it appears on the wire.
    pub fn top_overlay_wire(&self) -> i32 {
        self.top_overlay.map_or(NO_OVERLAY, |l| l.wire_id())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        let state = KernelState {
            frame_count: 42,
            frame_rate: 30,
            sleeping: true,
            debug: false,
            text_input_focus: true,
            top_overlay: Some(OverlayLayer::ControlCenter),
        };
        let back = KernelState::from_raw(
            state.frame_count,
            state.frame_rate,
            state.flag_bits(),
            state.top_overlay_wire(),
        );
        assert_eq!(back, state);
    }

    #[test]
    fn lifecycle_bits_not_in_snapshot() {
        let bits = StateFlags::SERVER_READY.bits() | StateFlags::CLIENT_CONNECTED.bits();
        let state = KernelState::from_raw(0, 60, bits, NO_OVERLAY);
        assert_eq!(state.flag_bits(), 0);
    }

    #[test]
    fn unknown_overlay_decodes_as_none() {
        let state = KernelState::from_raw(0, 60, 0, 99);
        assert_eq!(state.top_overlay, None);
    }
}
