//! Fixed byte layout of the shared-memory region.
//!
//! Both processes compile against these constants; any disagreement is
//! a fatal configuration error, so nothing here is negotiated at
//! runtime. All multi-byte fields are little-endian and 4-byte aligned.
//!
//! ## Region layout
//!
//! ```text
//! offset  size    field
//! 0       4       magic           "SLT0"
//! 4       4       version
//! 8       4       width           (400)
//! 12      4       height          (600)
//! 16      4       frame_count     written by kernel per publish
//! 20      4       frame_rate      current target fps
//! 24      4       state_flags     see StateFlags
//! 28      4       top_overlay     overlay wire id, -1 = none
//! 32      4       ring head       consumer index (kernel)
//! 36      4       ring tail       producer index (host)
//! 40      4       command kind    commit-last, 0 = empty
//! 44      4       command arg1
//! 48      4       command arg2
//! 52      64      command text    NUL-padded UTF-8
//! 116     12      reserved
//! 128     3072    input ring      128 slots x 24 bytes
//! 3200    960000  pixels          400*600 u32 ARGB
//! ```
//!
//! Ownership is single-writer per field: the kernel writes frames,
//! state and the ring head; the host writes the command slot, the ring
//! tail and its `CLIENT_CONNECTED` flag bit. Each side only reads the
//! fields it does not own.

pub mod command;
pub mod event;
pub mod layer;
pub mod state;

use bitflags::bitflags;

// ── Identity ─────────────────────────────────────────────────────

/// Region signature; a mapping without it is stale or foreign.
pub const MAGIC: u32 = u32::from_le_bytes(*b"SLT0");

/// Protocol version. Bump on any layout or wire-table change.
pub const VERSION: u32 = 1;

// ── Screen geometry ──────────────────────────────────────────────

pub const SCREEN_WIDTH: u32 = 400;
pub const SCREEN_HEIGHT: u32 = 600;
pub const PIXEL_COUNT: usize = (SCREEN_WIDTH * SCREEN_HEIGHT) as usize;
pub const PIXEL_BYTES: usize = PIXEL_COUNT * 4;

// ── Field offsets ────────────────────────────────────────────────

pub const OFFSET_MAGIC: usize = 0;
pub const OFFSET_VERSION: usize = 4;
pub const OFFSET_WIDTH: usize = 8;
pub const OFFSET_HEIGHT: usize = 12;
pub const OFFSET_FRAME_COUNT: usize = 16;
pub const OFFSET_FRAME_RATE: usize = 20;
pub const OFFSET_STATE_FLAGS: usize = 24;
pub const OFFSET_TOP_OVERLAY: usize = 28;
pub const OFFSET_RING_HEAD: usize = 32;
pub const OFFSET_RING_TAIL: usize = 36;
pub const OFFSET_COMMAND_KIND: usize = 40;
pub const OFFSET_COMMAND_ARG1: usize = 44;
pub const OFFSET_COMMAND_ARG2: usize = 48;
pub const OFFSET_COMMAND_TEXT: usize = 52;
pub const COMMAND_TEXT_SIZE: usize = 64;
pub const OFFSET_RESERVED: usize = 116;
pub const OFFSET_RING: usize = 128;

/// Size of one encoded input event record.
pub const EVENT_SIZE: usize = 24;

/// Slot count of the input ring. One slot is sacrificed to tell
/// "full" from "empty", so usable capacity is `RING_SLOTS - 1`.
pub const RING_SLOTS: usize = 128;
pub const RING_CAPACITY: usize = RING_SLOTS - 1;

pub const OFFSET_PIXELS: usize = OFFSET_RING + RING_SLOTS * EVENT_SIZE;

/// Total byte size of the shared region.
pub const REGION_SIZE: usize = OFFSET_PIXELS + PIXEL_BYTES;

/// Byte offset of ring slot `index`.
///
/// # Panics
///
/// Panics if `index >= RING_SLOTS`.
pub const fn ring_slot_offset(index: usize) -> usize {
    assert!(index < RING_SLOTS);
    OFFSET_RING + index * EVENT_SIZE
}

// ── StateFlags ───────────────────────────────────────────────────

bitflags! {
    /// Bitmask stored at [`OFFSET_STATE_FLAGS`].
    ///
    /// The kernel owns every bit except `CLIENT_CONNECTED`, which the
    /// host sets on connect and clears on close. Both sides mutate the
    /// word only through atomic read-modify-write so neither can
    /// clobber the other's bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateFlags: u32 {
        const SLEEPING         = 0x01;
        const DEBUG            = 0x02;
        const TEXT_INPUT_FOCUS = 0x04;
        const SERVER_READY     = 0x08;
        const CLIENT_CONNECTED = 0x10;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_contiguous() {
        assert_eq!(OFFSET_COMMAND_TEXT + COMMAND_TEXT_SIZE, OFFSET_RESERVED);
        assert_eq!(OFFSET_RESERVED + 12, OFFSET_RING);
        assert_eq!(OFFSET_RING + RING_SLOTS * EVENT_SIZE, OFFSET_PIXELS);
        assert_eq!(REGION_SIZE, OFFSET_PIXELS + PIXEL_BYTES);
    }

    #[test]
    fn word_fields_are_aligned() {
        for off in [
            OFFSET_MAGIC,
            OFFSET_VERSION,
            OFFSET_WIDTH,
            OFFSET_HEIGHT,
            OFFSET_FRAME_COUNT,
            OFFSET_FRAME_RATE,
            OFFSET_STATE_FLAGS,
            OFFSET_TOP_OVERLAY,
            OFFSET_RING_HEAD,
            OFFSET_RING_TAIL,
            OFFSET_COMMAND_KIND,
            OFFSET_COMMAND_ARG1,
            OFFSET_COMMAND_ARG2,
        ] {
            assert_eq!(off % 4, 0, "offset {off} is not word aligned");
        }
    }

    #[test]
    fn ring_slot_offsets() {
        assert_eq!(ring_slot_offset(0), OFFSET_RING);
        assert_eq!(
            ring_slot_offset(RING_SLOTS - 1),
            OFFSET_RING + (RING_SLOTS - 1) * EVENT_SIZE
        );
    }

    #[test]
    fn magic_is_ascii() {
        assert_eq!(&MAGIC.to_le_bytes(), b"SLT0");
    }
}
