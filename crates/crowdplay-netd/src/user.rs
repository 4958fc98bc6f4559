//! Per-connection user record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::net::outbound::OutboundTx;
use crate::{ConnId, EmuId};

/// A connected client.
///
/// The dispatch worker is the only writer of `username` and `connected_emu`;
/// the turn scheduler of the emulator a user is connected to owns the turn
/// flags. Everything else reads through the accessors. Registries hold
/// `Arc<User>`; turn queues hold `Weak<User>` so a dropped user can never be
/// resurrected by an emulator.
pub struct User {
    pub conn: ConnId,
    pub uuid: Uuid,

    username: Mutex<String>,
    connected_emu: Mutex<EmuId>,

    pub has_turn: AtomicBool,
    pub requested_turn: AtomicBool,
    pub supports_webp: AtomicBool,

    last_pong: Mutex<Instant>,

    outbound: OutboundTx,
    cancel: CancellationToken,
}

impl User {
    pub fn new(conn: ConnId, outbound: OutboundTx, cancel: CancellationToken) -> Self {
        Self {
            conn,
            uuid: Uuid::new_v4(),
            username: Mutex::new(String::new()),
            connected_emu: Mutex::new(String::new()),
            has_turn: AtomicBool::new(false),
            requested_turn: AtomicBool::new(false),
            supports_webp: AtomicBool::new(false),
            last_pong: Mutex::new(Instant::now()),
            outbound,
            cancel,
        }
    }

    pub fn username(&self) -> String {
        self.username.lock().clone()
    }

    pub fn set_username(&self, name: &str) {
        *self.username.lock() = name.to_string();
    }

    pub fn connected_emu(&self) -> EmuId {
        self.connected_emu.lock().clone()
    }

    pub fn set_connected_emu(&self, id: &str) {
        *self.connected_emu.lock() = id.to_string();
    }

    pub fn has_turn(&self) -> bool {
        self.has_turn.load(Ordering::Acquire)
    }

    pub fn clear_turn_flags(&self) {
        self.has_turn.store(false, Ordering::Release);
        self.requested_turn.store(false, Ordering::Release);
    }

    /// Record liveness; any inbound traffic counts, not just `pong`.
    pub fn touch_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub fn silent_for(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Queue a text frame. Returns false if the outbound queue is gone or
    /// full; the caller treats that as a transport failure.
    pub fn send_text(&self, frame: &str) -> bool {
        self.outbound
            .try_send(Message::Text(frame.to_string().into()))
            .is_ok()
    }

    pub fn send_binary(&self, frame: Bytes) -> bool {
        self.outbound.try_send(Message::Binary(frame)).is_ok()
    }

    /// Force the connection closed; the read loop observes the token and
    /// unwinds through the normal disconnect path.
    pub fn close(&self) {
        let _ = self.outbound.try_send(Message::Close(None));
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_user() -> (User, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (User::new(1, tx, CancellationToken::new()), rx)
    }

    #[test]
    fn starts_with_empty_identity() {
        let (user, _rx) = test_user();
        assert_eq!(user.username(), "");
        assert_eq!(user.connected_emu(), "");
        assert!(!user.has_turn());
        assert!(!user.requested_turn.load(Ordering::Acquire));
    }

    #[test]
    fn text_frames_reach_the_outbound_queue() {
        let (user, mut rx) = test_user();
        assert!(user.send_text("4.ping;"));
        match rx.try_recv() {
            Ok(Message::Text(text)) => assert_eq!(text.as_str(), "4.ping;"),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[test]
    fn close_cancels_the_connection_token() {
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let user = User::new(2, tx, cancel.clone());
        assert!(!cancel.is_cancelled());
        user.close();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn send_fails_once_the_queue_is_gone() {
        let (user, rx) = test_user();
        drop(rx);
        assert!(!user.send_text("4.ping;"));
    }
}
