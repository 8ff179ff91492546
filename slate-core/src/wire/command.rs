//! Command slot encoding.
//!
//! The slot holds at most one in-flight command: three payload fields
//! plus the kind word. The host writes the payload first and the kind
//! **last** so a kernel polling loop that only checks the kind word can
//! never observe a half-written payload (commit-last ordering). The
//! slot is fire-and-forget and one deep: a second command issued before
//! the kernel polls overwrites the first.

use std::fmt;

use crate::error::SlateError;
use crate::wire::COMMAND_TEXT_SIZE;

// ── CommandKind ──────────────────────────────────────────────────

/// All commands the host can issue to the kernel.
///
/// Wire values are pinned explicitly — `0` is reserved for "slot
/// empty" and must never be assigned to a command.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// (Re)initialize the shell for a session; arg1/arg2 carry the
    /// requested geometry, the text field the session id.
    Init = 1,
    /// Ask the kernel process to shut itself down.
    Shutdown = 2,
    /// Put the device to sleep (screen off).
    Sleep = 3,
    /// Wake the device.
    Wake = 4,
    /// Navigate to the home screen.
    GoHome = 5,
    /// Hardware home-button press (may differ from GoHome while an
    /// overlay is open).
    HomeButton = 6,
    /// Push an overlay layer; arg1 is the overlay wire id.
    AddOverlay = 7,
    /// Pop an overlay layer; arg1 is the overlay wire id.
    RemoveOverlay = 8,
    /// Change the kernel render rate; arg1 is the new fps.
    SetFrameRate = 9,
    /// Request a screen resize; arg1/arg2 are width/height.
    Resize = 10,
}

impl TryFrom<i32> for CommandKind {
    type Error = SlateError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CommandKind::Init),
            2 => Ok(CommandKind::Shutdown),
            3 => Ok(CommandKind::Sleep),
            4 => Ok(CommandKind::Wake),
            5 => Ok(CommandKind::GoHome),
            6 => Ok(CommandKind::HomeButton),
            7 => Ok(CommandKind::AddOverlay),
            8 => Ok(CommandKind::RemoveOverlay),
            9 => Ok(CommandKind::SetFrameRate),
            10 => Ok(CommandKind::Resize),
            _ => Err(SlateError::UnknownVariant {
                type_name: "CommandKind",
                value: value as i64,
            }),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Command ──────────────────────────────────────────────────────

/// A decoded command: kind plus its payload fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub arg1: i32,
    pub arg2: i32,
    pub text: String,
}

impl Command {
    /// A command with no payload.
    pub fn plain(kind: CommandKind) -> Self {
        Self::with_args(kind, 0, 0)
    }

    /// A command with numeric arguments only.
    pub fn with_args(kind: CommandKind, arg1: i32, arg2: i32) -> Self {
        Self {
            kind,
            arg1,
            arg2,
            text: String::new(),
        }
    }

    /// A command with numeric arguments and a text payload.
    pub fn with_text(kind: CommandKind, arg1: i32, arg2: i32, text: impl Into<String>) -> Self {
        Self {
            kind,
            arg1,
            arg2,
            text: text.into(),
        }
    }
}

// ── Text codec ───────────────────────────────────────────────────

/// Encode a command string into the fixed 64-byte slot field.
///
/// The text is NUL-padded and truncated to 63 bytes on a character
/// boundary so the slot always holds valid, terminated UTF-8.
pub fn encode_text(text: &str) -> [u8; COMMAND_TEXT_SIZE] {
    let mut buf = [0u8; COMMAND_TEXT_SIZE];
    let mut end = text.len().min(COMMAND_TEXT_SIZE - 1);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    buf[..end].copy_from_slice(&text.as_bytes()[..end]);
    buf
}

/// Decode the slot field back into a string (up to the first NUL).
pub fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        let kinds = [
            CommandKind::Init,
            CommandKind::Shutdown,
            CommandKind::Sleep,
            CommandKind::Wake,
            CommandKind::GoHome,
            CommandKind::HomeButton,
            CommandKind::AddOverlay,
            CommandKind::RemoveOverlay,
            CommandKind::SetFrameRate,
            CommandKind::Resize,
        ];
        for kind in kinds {
            assert_eq!(CommandKind::try_from(kind as i32).unwrap(), kind);
        }
    }

    #[test]
    fn kind_zero_is_not_a_command() {
        assert!(CommandKind::try_from(0).is_err());
    }

    #[test]
    fn kind_invalid() {
        assert!(CommandKind::try_from(0xBAD).is_err());
    }

    #[test]
    fn text_roundtrip() {
        let buf = encode_text("world-42");
        assert_eq!(decode_text(&buf), "world-42");
    }

    #[test]
    fn text_empty() {
        let buf = encode_text("");
        assert_eq!(decode_text(&buf), "");
    }

    #[test]
    fn text_truncates_on_char_boundary() {
        // 32 two-byte characters = 64 bytes; must truncate to 62 bytes
        // (31 chars) to keep the terminator and stay valid UTF-8.
        let long = "é".repeat(32);
        let buf = encode_text(&long);
        let decoded = decode_text(&buf);
        assert_eq!(decoded, "é".repeat(31));
    }

    #[test]
    fn text_max_ascii() {
        let long = "x".repeat(100);
        let buf = encode_text(&long);
        assert_eq!(decode_text(&buf).len(), COMMAND_TEXT_SIZE - 1);
    }
}
