//! Overlay layer identifiers shared across the process boundary.
//!
//! Wire ids are pinned in an explicit table rather than derived from
//! variant order, so reordering or inserting Rust variants on one side
//! can never silently desynchronize the other. New layers append a new
//! id; existing ids are never renumbered. Any change here requires a
//! [`crate::wire::VERSION`] bump.

use std::fmt;

use crate::error::SlateError;

/// Wire value meaning "no overlay".
pub const NO_OVERLAY: i32 = -1;

/// Stacked UI layers the kernel compositor manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayLayer {
    HomeScreen,
    Application,
    Notification,
    ControlCenter,
    Popup,
    LockScreen,
}

impl OverlayLayer {
    /// The pinned wire id of this layer.
    pub const fn wire_id(self) -> i32 {
        match self {
            OverlayLayer::HomeScreen => 0,
            OverlayLayer::Application => 1,
            OverlayLayer::Notification => 2,
            OverlayLayer::ControlCenter => 3,
            OverlayLayer::Popup => 4,
            OverlayLayer::LockScreen => 5,
        }
    }

    /// Decode a wire id; [`NO_OVERLAY`] maps to `None`.
    pub fn from_wire(id: i32) -> Result<Option<Self>, SlateError> {
        match id {
            NO_OVERLAY => Ok(None),
            0 => Ok(Some(OverlayLayer::HomeScreen)),
            1 => Ok(Some(OverlayLayer::Application)),
            2 => Ok(Some(OverlayLayer::Notification)),
            3 => Ok(Some(OverlayLayer::ControlCenter)),
            4 => Ok(Some(OverlayLayer::Popup)),
            5 => Ok(Some(OverlayLayer::LockScreen)),
            _ => Err(SlateError::UnknownVariant {
                type_name: "OverlayLayer",
                value: id as i64,
            }),
        }
    }

    /// Whether a home-button press may dismiss this layer.
    pub fn is_dismissible(self) -> bool {
        !matches!(self, OverlayLayer::LockScreen)
    }

    /// All known layers, in stacking order bottom to top.
    pub const ALL: [OverlayLayer; 6] = [
        OverlayLayer::HomeScreen,
        OverlayLayer::Application,
        OverlayLayer::Notification,
        OverlayLayer::ControlCenter,
        OverlayLayer::Popup,
        OverlayLayer::LockScreen,
    ];
}

impl fmt::Display for OverlayLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Tests ────────────────────────────────────────────────────────
