//! Domain-specific error types for the Slate bridge.
//!
//! Expected startup conditions (backing store missing, server not yet
//! ready) are **not** errors — they surface as boolean results on the
//! transport. `SlateError` covers everything that is genuinely wrong:
//! protocol mismatches, I/O failures, and supervision failures.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the Slate bridge.
#[derive(Debug, Error)]
pub enum SlateError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The mapped region does not start with the Slate magic word.
    #[error("invalid region magic: {found:#010x}")]
    InvalidMagic { found: u32 },

    /// The region was written by an incompatible protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u32),

    /// The region header advertises a screen geometry this build was
    /// not compiled for.
    #[error("screen geometry mismatch: region is {width}x{height}")]
    GeometryMismatch { width: u32, height: u32 },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: i64 },

    /// A fixed-size record was shorter than its wire layout.
    #[error("truncated {type_name} record: {len} bytes (need {need})")]
    TruncatedRecord {
        type_name: &'static str,
        len: usize,
        need: usize,
    },

    // ── Region Errors ────────────────────────────────────────────
    /// The backing file is smaller than the compiled region layout.
    #[error("region too small: {size} bytes (need {need})")]
    RegionTooSmall { size: u64, need: u64 },

    /// The OS I/O layer reported an error while opening or mapping.
    #[error("region I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared-memory mapping is not implemented for this platform.
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),

    // ── Supervision Errors ───────────────────────────────────────
    /// The kernel executable was not found in any search location and
    /// no embedded image was available to extract.
    #[error("kernel executable not found")]
    ExecutableNotFound,

    /// The kernel executable was found but could not be spawned.
    #[error("failed to launch kernel process")]
    LaunchFailed,

    /// The kernel process exited before the handshake completed.
    #[error("kernel process exited before handshake")]
    ProcessExited,

    /// The handshake did not complete within the configured window.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = SlateError::InvalidMagic { found: 0xDEAD_BEEF };
        assert!(e.to_string().contains("0xdeadbeef"));

        let e = SlateError::RegionTooSmall {
            size: 100,
            need: 963_200,
        };
        assert!(e.to_string().contains("100"));
        assert!(e.to_string().contains("963200"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let e: SlateError = io_err.into();
        assert!(matches!(e, SlateError::Io(_)));
    }
}
