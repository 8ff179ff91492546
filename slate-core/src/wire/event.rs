//! Input event records for the shared-memory ring buffer.
//!
//! Every event occupies one fixed 24-byte slot:
//!
//! ```text
//! offset  size  field
//! 0       4     kind          i32, see InputEventKind
//! 4       2     word0         mouse: x          key: key-code high
//! 6       2     word1         mouse: y          key: key-code low
//! 8       2     word2         mouse: button     key: key char (UTF-16 unit)
//! 10      1     modifiers     see Modifiers
//! 11      1     reserved
//! 12      4     wheel_delta   f32, zero unless kind == Wheel
//! 16      8     timestamp_ms  u64, Unix millis at enqueue time
//! ```

use bitflags::bitflags;

use crate::error::SlateError;
use crate::wire::EVENT_SIZE;

// ── InputEventKind ───────────────────────────────────────────────

/// Discriminates the event payload. Wire values are pinned.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEventKind {
    PointerDown = 1,
    PointerUp = 2,
    PointerDrag = 3,
    PointerMove = 4,
    Wheel = 5,
    KeyDown = 6,
    KeyUp = 7,
    /// A recognized gesture forwarded as-is; word2 carries the
    /// host-side gesture id.
    Gesture = 8,
}

impl InputEventKind {
    /// Whether this kind carries a key code/char payload.
    pub fn is_key(self) -> bool {
        matches!(self, InputEventKind::KeyDown | InputEventKind::KeyUp)
    }
}

impl TryFrom<i32> for InputEventKind {
    type Error = SlateError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(InputEventKind::PointerDown),
            2 => Ok(InputEventKind::PointerUp),
            3 => Ok(InputEventKind::PointerDrag),
            4 => Ok(InputEventKind::PointerMove),
            5 => Ok(InputEventKind::Wheel),
            6 => Ok(InputEventKind::KeyDown),
            7 => Ok(InputEventKind::KeyUp),
            8 => Ok(InputEventKind::Gesture),
            _ => Err(SlateError::UnknownVariant {
                type_name: "InputEventKind",
                value: value as i64,
            }),
        }
    }
}

// ── Modifiers ────────────────────────────────────────────────────

bitflags! {
    /// Modifier-key bitmask carried by every event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0x01;
        const CTRL  = 0x02;
        const ALT   = 0x04;
        const META  = 0x08;
    }
}

// ── InputEvent ───────────────────────────────────────────────────

/// One input event as carried through the ring buffer.
///
/// Pointer fields and key fields overlap on the wire; the decoder fills
/// whichever set matches the kind and zeroes the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub kind: InputEventKind,
    /// Pointer x, device coordinates.
    pub x: i16,
    /// Pointer y, device coordinates.
    pub y: i16,
    /// Mouse button index, or gesture id for [`InputEventKind::Gesture`].
    pub button: u16,
    /// Key character (UTF-16 code unit) for key events.
    pub key_char: u16,
    /// Key code for key events.
    pub key_code: u32,
    pub modifiers: Modifiers,
    /// Scroll amount, positive away from the user.
    pub wheel_delta: f32,
    /// Unix millis at enqueue time.
    pub timestamp_ms: u64,
}

impl InputEvent {
    fn pointer(
        kind: InputEventKind,
        x: i16,
        y: i16,
        button: u16,
        modifiers: Modifiers,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            kind,
            x,
            y,
            button,
            key_char: 0,
            key_code: 0,
            modifiers,
            wheel_delta: 0.0,
            timestamp_ms,
        }
    }

    pub fn pointer_down(x: i16, y: i16, modifiers: Modifiers, timestamp_ms: u64) -> Self {
        Self::pointer(InputEventKind::PointerDown, x, y, 1, modifiers, timestamp_ms)
    }

    pub fn pointer_up(x: i16, y: i16, modifiers: Modifiers, timestamp_ms: u64) -> Self {
        Self::pointer(InputEventKind::PointerUp, x, y, 1, modifiers, timestamp_ms)
    }

    pub fn pointer_drag(x: i16, y: i16, modifiers: Modifiers, timestamp_ms: u64) -> Self {
        Self::pointer(InputEventKind::PointerDrag, x, y, 1, modifiers, timestamp_ms)
    }

    pub fn pointer_move(x: i16, y: i16, modifiers: Modifiers, timestamp_ms: u64) -> Self {
        Self::pointer(InputEventKind::PointerMove, x, y, 0, modifiers, timestamp_ms)
    }

    pub fn wheel(x: i16, y: i16, delta: f32, modifiers: Modifiers, timestamp_ms: u64) -> Self {
        Self {
            wheel_delta: delta,
            ..Self::pointer(InputEventKind::Wheel, x, y, 0, modifiers, timestamp_ms)
        }
    }

    pub fn gesture(x: i16, y: i16, gesture_id: u16, modifiers: Modifiers, timestamp_ms: u64) -> Self {
        Self::pointer(InputEventKind::Gesture, x, y, gesture_id, modifiers, timestamp_ms)
    }

    pub fn key(
        kind: InputEventKind,
        key_char: u16,
        key_code: u32,
        modifiers: Modifiers,
        timestamp_ms: u64,
    ) -> Self {
        debug_assert!(kind.is_key());
        Self {
            kind,
            x: 0,
            y: 0,
            button: 0,
            key_char,
            key_code,
            modifiers,
            wheel_delta: 0.0,
            timestamp_ms,
        }
    }

    /// Serialize into one ring slot (little-endian).
    pub fn encode(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];
        buf[0..4].copy_from_slice(&(self.kind as i32).to_le_bytes());

        let (w0, w1, w2) = if self.kind.is_key() {
            (
                (self.key_code >> 16) as u16,
                self.key_code as u16,
                self.key_char,
            )
        } else {
            (self.x as u16, self.y as u16, self.button)
        };
        buf[4..6].copy_from_slice(&w0.to_le_bytes());
        buf[6..8].copy_from_slice(&w1.to_le_bytes());
        buf[8..10].copy_from_slice(&w2.to_le_bytes());

        buf[10] = self.modifiers.bits();
        // buf[11] reserved

        let delta = if self.kind == InputEventKind::Wheel {
            self.wheel_delta
        } else {
            0.0
        };
        buf[12..16].copy_from_slice(&delta.to_le_bytes());
        buf[16..24].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf
    }

    /// Deserialize from one ring slot.
    pub fn decode(data: &[u8]) -> Result<Self, SlateError> {
        if data.len() < EVENT_SIZE {
            return Err(SlateError::TruncatedRecord {
                type_name: "InputEvent",
                len: data.len(),
                need: EVENT_SIZE,
            });
        }
        let kind = InputEventKind::try_from(i32::from_le_bytes(data[0..4].try_into().unwrap()))?;

        let w0 = u16::from_le_bytes(data[4..6].try_into().unwrap());
        let w1 = u16::from_le_bytes(data[6..8].try_into().unwrap());
        let w2 = u16::from_le_bytes(data[8..10].try_into().unwrap());

        let mut event = Self {
            kind,
            x: 0,
            y: 0,
            button: 0,
            key_char: 0,
            key_code: 0,
            modifiers: Modifiers::from_bits_truncate(data[10]),
            wheel_delta: f32::from_le_bytes(data[12..16].try_into().unwrap()),
            timestamp_ms: u64::from_le_bytes(data[16..24].try_into().unwrap()),
        };
        if kind.is_key() {
            event.key_code = ((w0 as u32) << 16) | w1 as u32;
            event.key_char = w2;
        } else {
            event.x = w0 as i16;
            event.y = w1 as i16;
            event.button = w2;
        }
        Ok(event)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_roundtrip() {
        let ev = InputEvent::pointer_down(120, -5, Modifiers::SHIFT | Modifiers::CTRL, 123_456);
        let decoded = InputEvent::decode(&ev.encode()).unwrap();
        assert_eq!(decoded, ev);
        assert_eq!(decoded.x, 120);
        assert_eq!(decoded.y, -5);
        assert_eq!(decoded.button, 1);
    }

    #[test]
    fn key_roundtrip() {
        let ev = InputEvent::key(
            InputEventKind::KeyDown,
            'a' as u16,
            0x0001_0041,
            Modifiers::META,
            99,
        );
        let decoded = InputEvent::decode(&ev.encode()).unwrap();
        assert_eq!(decoded.key_code, 0x0001_0041);
        assert_eq!(decoded.key_char, 'a' as u16);
        assert_eq!(decoded.modifiers, Modifiers::META);
        assert_eq!(decoded.timestamp_ms, 99);
    }

    #[test]
    fn wheel_carries_delta() {
        let ev = InputEvent::wheel(10, 20, -3.5, Modifiers::empty(), 7);
        let decoded = InputEvent::decode(&ev.encode()).unwrap();
        assert_eq!(decoded.wheel_delta, -3.5);
    }

    #[test]
    fn non_wheel_delta_encodes_as_zero() {
        let mut ev = InputEvent::pointer_move(1, 2, Modifiers::empty(), 0);
        ev.wheel_delta = 42.0; // must not survive the wire
        let decoded = InputEvent::decode(&ev.encode()).unwrap();
        assert_eq!(decoded.wheel_delta, 0.0);
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut buf = [0u8; EVENT_SIZE];
        buf[0..4].copy_from_slice(&99i32.to_le_bytes());
        assert!(InputEvent::decode(&buf).is_err());
    }

    #[test]
    fn short_slice_rejected() {
        assert!(InputEvent::decode(&[0u8; 8]).is_err());
    }
}
