//! The emulator proxy the server talks to.
//!
//! Decouples the dispatch side from the controller's internals: the server
//! sees exactly the operations it needs (turn requests, membership changes,
//! pad input, pause, teardown). All methods are called from the dispatch
//! worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;

use crowdplay_proto::encode;
use crowdplay_retro::{RetroPad, ScreenBuffer};

use crate::EmuId;
use crate::emu::broadcast;
use crate::emu::controller::ControllerMsg;
use crate::emu::turn::TurnScheduler;
use crate::sched::{Scheduler, TaskId};
use crate::server::ServerCore;
use crate::user::User;

pub struct EmulatorHandle {
    pub id: EmuId,
    server: Weak<ServerCore>,
    pad: Arc<RetroPad>,
    screen: Arc<Mutex<ScreenBuffer>>,
    turn: TurnScheduler,
    paused: Arc<AtomicBool>,
    ctrl_tx: Sender<ControllerMsg>,
    thread: Mutex<Option<JoinHandle<()>>>,
    tasks: Vec<TaskId>,
}

impl EmulatorHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: EmuId,
        server: Weak<ServerCore>,
        pad: Arc<RetroPad>,
        screen: Arc<Mutex<ScreenBuffer>>,
        turn: TurnScheduler,
        paused: Arc<AtomicBool>,
        ctrl_tx: Sender<ControllerMsg>,
        thread: JoinHandle<()>,
        tasks: Vec<TaskId>,
    ) -> Self {
        Self {
            id,
            server,
            pad,
            screen,
            turn,
            paused,
            ctrl_tx,
            thread: Mutex::new(Some(thread)),
            tasks,
        }
    }

    pub fn add_turn_request(&self, user: &Arc<User>) {
        self.turn.add_request(user);
    }

    /// Announce the newcomer to this emulator's viewers, then bring it up
    /// to date: current frame, current holder.
    pub fn user_connected(&self, user: &Arc<User>) {
        if let Some(server) = self.server.upgrade() {
            server.broadcast_emu(&self.id, &encode(&["join", &user.username()]));
        }

        let frame = self.screen.lock().full_frame();
        if let Some(update) = frame {
            let _ = user.send_binary(broadcast::frame_for_new_viewer(user, &update));
        }

        let holder = self
            .turn
            .current_holder()
            .map(|holder| holder.username())
            .unwrap_or_default();
        let _ = user.send_text(&encode(&["turn", &holder]));
        debug!(emu = %self.id, conn = user.conn, "viewer attached");
    }

    /// Detach a user: out of the turn queue, turn ended if it was theirs.
    pub fn user_disconnected(&self, user: &Arc<User>) {
        self.turn.remove_user(user);
        debug!(emu = %self.id, conn = user.conn, "viewer detached");
    }

    /// Queue a button intent; committed at the core's next input poll.
    pub fn press(&self, id: u32, value: i16) {
        self.pad.queue(id, value);
    }

    /// Flip the pause state; returns the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn current_holder(&self) -> Option<Arc<User>> {
        self.turn.current_holder()
    }

    /// Orderly teardown: stop broadcasts, the turn scheduler, then the
    /// controller thread (which unloads the core on its way out).
    pub fn shutdown(&self, sched: &Scheduler) {
        for task in &self.tasks {
            sched.cancel(*task);
        }
        self.turn.stop();
        let _ = self.ctrl_tx.send(ControllerMsg::Stop);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }

    /// Cleanup after the controller thread already died on its own.
    pub fn abandon(&self, sched: &Scheduler) {
        for task in &self.tasks {
            sched.cancel(*task);
        }
        self.turn.stop();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}
