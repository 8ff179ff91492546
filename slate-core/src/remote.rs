//! Remote kernel facade.
//!
//! Presents the same call shape as an in-process kernel so upstream UI
//! code cannot tell whether the device shell runs locally or in the
//! supervised server process. Mutating calls become command or
//! input-event writes; queries are served from the last polled
//! snapshot (call [`update`](RemoteKernel::update) once per tick).
//!
//! Modifier-key state is tracked locally from key-down/up pairs: the
//! kernel never echoes key state back, so the facade is the single
//! source of truth for the bitmask every outgoing event carries.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::transport::{HostTransport, TransportStats};
use crate::wire::command::{Command, CommandKind};
use crate::wire::event::{InputEvent, InputEventKind, Modifiers};
use crate::wire::layer::OverlayLayer;
use crate::wire::state::KernelState;
use crate::wire::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Key codes the facade recognizes as modifiers.
///
/// Hosts translate their toolkit's key identifiers onto these before
/// calling [`RemoteKernel::key_down`]/[`key_up`](RemoteKernel::key_up).
pub mod keys {
    pub const SHIFT: u32 = 0x10;
    pub const CONTROL: u32 = 0x11;
    pub const ALT: u32 = 0x12;
    pub const META: u32 = 0x5B;
}

// ── RemoteKernel ─────────────────────────────────────────────────

/// Proxy for a kernel living in the supervised server process.
pub struct RemoteKernel {
    transport: HostTransport,
    state: KernelState,
    modifiers: Modifiers,
}

impl RemoteKernel {
    /// Facade over the region derived from `session_id`.
    pub fn new(session_id: &str) -> Self {
        Self::from_transport(HostTransport::new(session_id))
    }

    /// Facade over an existing transport (tests, custom paths).
    pub fn from_transport(transport: HostTransport) -> Self {
        Self {
            transport,
            state: KernelState::default(),
            modifiers: Modifiers::empty(),
        }
    }

    // ── Connection ───────────────────────────────────────────────

    pub fn connect(&mut self) -> bool {
        self.transport.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn is_server_ready(&self) -> bool {
        self.transport.is_server_ready()
    }

    /// Refresh the state snapshot. Call once per render tick.
    pub fn update(&mut self) {
        if self.transport.is_connected() {
            self.state = self.transport.read_state();
        }
    }

    /// Send the shutdown command and detach from the region.
    pub fn shutdown(&mut self) {
        self.send(Command::plain(CommandKind::Shutdown));
        self.transport.close();
    }

    // ── Snapshot queries ─────────────────────────────────────────

    pub fn frame_count(&self) -> u32 {
        self.state.frame_count
    }

    pub fn frame_rate(&self) -> u32 {
        self.state.frame_rate
    }

    pub fn is_sleeping(&self) -> bool {
        self.state.sleeping
    }

    pub fn is_debug(&self) -> bool {
        self.state.debug
    }

    pub fn has_text_input_focus(&self) -> bool {
        self.state.text_input_focus
    }

    /// The top-most overlay a home-button press may dismiss.
    pub fn top_dismissible_overlay(&self) -> Option<OverlayLayer> {
        self.state.top_overlay
    }

    /// Latest published frame (de-duplicated copy, see transport).
    pub fn pixels(&mut self) -> &[u32] {
        self.transport.read_pixels()
    }

    pub const fn width(&self) -> u32 {
        SCREEN_WIDTH
    }

    pub const fn height(&self) -> u32 {
        SCREEN_HEIGHT
    }

    pub fn is_in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < SCREEN_WIDTH as i32 && y < SCREEN_HEIGHT as i32
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    // ── Pointer input ────────────────────────────────────────────

    pub fn press(&mut self, x: i32, y: i32) {
        self.event(InputEvent::pointer_down(
            x as i16,
            y as i16,
            self.modifiers,
            now_ms(),
        ));
    }

    pub fn release(&mut self, x: i32, y: i32) {
        self.event(InputEvent::pointer_up(
            x as i16,
            y as i16,
            self.modifiers,
            now_ms(),
        ));
    }

    pub fn drag(&mut self, x: i32, y: i32) {
        self.event(InputEvent::pointer_drag(
            x as i16,
            y as i16,
            self.modifiers,
            now_ms(),
        ));
    }

    pub fn pointer_move(&mut self, x: i32, y: i32) {
        self.event(InputEvent::pointer_move(
            x as i16,
            y as i16,
            self.modifiers,
            now_ms(),
        ));
    }

    pub fn wheel(&mut self, x: i32, y: i32, delta: f32) {
        self.event(InputEvent::wheel(
            x as i16,
            y as i16,
            delta,
            self.modifiers,
            now_ms(),
        ));
    }

    pub fn gesture(&mut self, x: i32, y: i32, gesture_id: u16) {
        self.event(InputEvent::gesture(
            x as i16,
            y as i16,
            gesture_id,
            self.modifiers,
            now_ms(),
        ));
    }

    // ── Keyboard input ───────────────────────────────────────────

    pub fn key_down(&mut self, key_char: char, key_code: u32) {
        self.track_modifier(key_code, true);
        self.event(InputEvent::key(
            InputEventKind::KeyDown,
            char_to_unit(key_char),
            key_code,
            self.modifiers,
            now_ms(),
        ));
    }

    pub fn key_up(&mut self, key_char: char, key_code: u32) {
        self.track_modifier(key_code, false);
        self.event(InputEvent::key(
            InputEventKind::KeyUp,
            char_to_unit(key_char),
            key_code,
            self.modifiers,
            now_ms(),
        ));
    }

    fn track_modifier(&mut self, key_code: u32, pressed: bool) {
        let flag = match key_code {
            keys::SHIFT => Modifiers::SHIFT,
            keys::CONTROL => Modifiers::CTRL,
            keys::ALT => Modifiers::ALT,
            keys::META => Modifiers::META,
            _ => return,
        };
        self.modifiers.set(flag, pressed);
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn is_shift_down(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    pub fn is_ctrl_down(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    pub fn is_alt_down(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    pub fn is_meta_down(&self) -> bool {
        self.modifiers.contains(Modifiers::META)
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Ask the kernel to (re)initialize its shell for a session.
    pub fn init_session(&mut self, width: u32, height: u32, session_id: &str) {
        self.send(Command::with_text(
            CommandKind::Init,
            width as i32,
            height as i32,
            session_id,
        ));
    }

    pub fn sleep(&mut self) {
        self.send(Command::plain(CommandKind::Sleep));
    }

    pub fn wake(&mut self) {
        self.send(Command::plain(CommandKind::Wake));
    }

    pub fn go_home(&mut self) {
        self.send(Command::plain(CommandKind::GoHome));
    }

    pub fn home_button(&mut self) {
        self.send(Command::plain(CommandKind::HomeButton));
    }

    pub fn add_overlay(&mut self, layer: OverlayLayer) {
        self.send(Command::with_args(CommandKind::AddOverlay, layer.wire_id(), 0));
    }

    pub fn remove_overlay(&mut self, layer: OverlayLayer) {
        self.send(Command::with_args(
            CommandKind::RemoveOverlay,
            layer.wire_id(),
            0,
        ));
    }

    pub fn set_frame_rate(&mut self, fps: u32) {
        self.send(Command::with_args(CommandKind::SetFrameRate, fps as i32, 0));
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.send(Command::with_args(
            CommandKind::Resize,
            width as i32,
            height as i32,
        ));
    }

    // ── Internals ────────────────────────────────────────────────

    fn send(&mut self, command: Command) {
        self.transport.send_command(&command);
    }

    fn event(&mut self, event: InputEvent) {
        self.transport.write_input_event(&event);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn char_to_unit(c: char) -> u16 {
    // BMP characters fit a single UTF-16 unit; anything beyond maps to
    // the replacement character rather than a mangled surrogate half.
    let mut units = [0u16; 2];
    let encoded = c.encode_utf16(&mut units);
    if encoded.len() == 1 { units[0] } else { 0xFFFD }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::region_dir;
    use crate::transport::KernelTransport;
    use std::path::PathBuf;

    fn test_path(tag: &str) -> PathBuf {
        region_dir().join(format!("test_remote_{tag}_{}.shm", std::process::id()))
    }

    fn connected_pair(tag: &str) -> (KernelTransport, RemoteKernel) {
        let path = test_path(tag);
        let kernel = KernelTransport::create_at(&path).unwrap();
        let mut remote = RemoteKernel::from_transport(HostTransport::for_path(&path));
        assert!(remote.connect());
        (kernel, remote)
    }

    #[test]
    fn modifier_tracking_follows_key_pairs() {
        let (kernel, mut remote) = connected_pair("mods");

        remote.key_down('\0', keys::SHIFT);
        remote.key_down('a', 0x41);
        remote.key_up('\0', keys::SHIFT);
        remote.key_down('a', 0x41);

        let events = kernel.drain_input_events();
        assert_eq!(events.len(), 4);
        assert!(events[1].modifiers.contains(Modifiers::SHIFT));
        assert!(!events[3].modifiers.contains(Modifiers::SHIFT));
        assert!(!remote.is_shift_down());
    }

    #[test]
    fn pointer_calls_carry_current_modifiers() {
        let (kernel, mut remote) = connected_pair("pointer");

        remote.key_down('\0', keys::CONTROL);
        remote.press(10, 20);
        remote.release(10, 20);

        let events = kernel.drain_input_events();
        let press = &events[1];
        assert_eq!(press.kind, InputEventKind::PointerDown);
        assert_eq!((press.x, press.y), (10, 20));
        assert!(press.modifiers.contains(Modifiers::CTRL));
        assert!(press.timestamp_ms > 0);
    }

    #[test]
    fn commands_reach_the_slot() {
        let (kernel, mut remote) = connected_pair("cmd");
        remote.set_frame_rate(24);
        let cmd = kernel.take_command().unwrap();
        assert_eq!(cmd.kind, CommandKind::SetFrameRate);
        assert_eq!(cmd.arg1, 24);
    }

    #[test]
    fn snapshot_queries_follow_update() {
        let (kernel, mut remote) = connected_pair("snap");
        kernel.publish_state(&KernelState {
            sleeping: true,
            top_overlay: Some(OverlayLayer::Notification),
            ..KernelState::default()
        });

        assert!(!remote.is_sleeping(), "stale before update");
        remote.update();
        assert!(remote.is_sleeping());
        assert_eq!(
            remote.top_dismissible_overlay(),
            Some(OverlayLayer::Notification)
        );
    }

    #[test]
    fn bounds_check() {
        let (_kernel, remote) = connected_pair("bounds");
        assert!(remote.is_in_bounds(0, 0));
        assert!(remote.is_in_bounds(399, 599));
        assert!(!remote.is_in_bounds(400, 0));
        assert!(!remote.is_in_bounds(-1, 10));
    }

    #[test]
    fn disconnected_facade_is_inert() {
        let mut remote = RemoteKernel::from_transport(HostTransport::for_path(test_path("inert")));
        // No region exists: nothing panics, queries return defaults.
        remote.update();
        remote.press(1, 2);
        remote.sleep();
        assert_eq!(remote.frame_count(), 0);
        assert!(!remote.is_sleeping());
    }
}
