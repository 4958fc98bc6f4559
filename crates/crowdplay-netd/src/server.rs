//! Shared server state: registries, broadcast, teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::Command;
use crate::emu::EmulatorHandle;
use crate::sched::Scheduler;
use crate::user::User;
use crate::{ConnId, EmuId};

/// Decides whether a user may issue admin verbs (`add`, `remove`, `stop`,
/// `shutdown`). Actual policy lives outside this crate; the default allows
/// everyone, which suits single-operator deployments and tests.
pub type AdminGate = Box<dyn Fn(&User) -> bool + Send + Sync>;

pub struct ServerCore {
    pub config: Config,
    pub sched: Scheduler,

    users: Mutex<HashMap<ConnId, Arc<User>>>,
    emus: Mutex<HashMap<EmuId, Arc<EmulatorHandle>>>,

    cmd_tx: Sender<Command>,
    shutting_down: AtomicBool,
    listener_cancel: CancellationToken,
    admin_gate: AdminGate,
}

impl ServerCore {
    pub fn new(config: Config) -> (Arc<Self>, Receiver<Command>) {
        Self::with_admin_gate(config, Box::new(|_| true))
    }

    pub fn with_admin_gate(config: Config, admin_gate: AdminGate) -> (Arc<Self>, Receiver<Command>) {
        let (cmd_tx, cmd_rx) = unbounded();
        let server = Arc::new(Self {
            config,
            sched: Scheduler::new(2),
            users: Mutex::new(HashMap::new()),
            emus: Mutex::new(HashMap::new()),
            cmd_tx,
            shutting_down: AtomicBool::new(false),
            listener_cancel: CancellationToken::new(),
            admin_gate,
        });
        (server, cmd_rx)
    }

    /// Queue a command for the dispatch worker. Never blocks.
    pub fn enqueue(&self, cmd: Command) {
        let _ = self.cmd_tx.send(cmd);
    }

    pub fn listener_token(&self) -> CancellationToken {
        self.listener_cancel.clone()
    }

    pub fn is_admin(&self, user: &User) -> bool {
        (self.admin_gate)(user)
    }

    // --- users ---------------------------------------------------------

    pub fn insert_user(&self, user: Arc<User>) {
        self.users.lock().insert(user.conn, user);
    }

    pub fn remove_user(&self, conn: ConnId) -> Option<Arc<User>> {
        self.users.lock().remove(&conn)
    }

    pub fn user(&self, conn: ConnId) -> Option<Arc<User>> {
        self.users.lock().get(&conn).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    /// All usernames that completed the handshake.
    pub fn usernames(&self) -> Vec<String> {
        self.users
            .lock()
            .values()
            .map(|user| user.username())
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn username_taken(&self, name: &str, except: ConnId) -> bool {
        self.users
            .lock()
            .values()
            .any(|user| user.conn != except && user.username() == name)
    }

    pub fn users_of_emu(&self, emu: &str) -> Vec<Arc<User>> {
        self.users
            .lock()
            .values()
            .filter(|user| user.connected_emu() == emu)
            .cloned()
            .collect()
    }

    fn all_users(&self) -> Vec<Arc<User>> {
        self.users.lock().values().cloned().collect()
    }

    // --- broadcast -----------------------------------------------------

    /// Send to every user with a non-empty username. A failed send closes
    /// the offending connection and the server moves on.
    pub fn broadcast_all(&self, frame: &str) {
        for user in self.all_users() {
            if user.username().is_empty() {
                continue;
            }
            self.send_or_close(&user, frame);
        }
    }

    pub fn broadcast_emu(&self, emu: &str, frame: &str) {
        for user in self.users_of_emu(emu) {
            self.send_or_close(&user, frame);
        }
    }

    pub fn broadcast_emu_binary(&self, emu: &str, frame: Bytes) {
        for user in self.users_of_emu(emu) {
            if !user.send_binary(frame.clone()) {
                warn!(conn = user.conn, "binary send failed, closing connection");
                user.close();
            }
        }
    }

    pub fn send_to(&self, conn: ConnId, frame: &str) {
        if let Some(user) = self.user(conn) {
            self.send_or_close(&user, frame);
        }
    }

    pub fn send_or_close(&self, user: &User, frame: &str) {
        if !user.send_text(frame) {
            warn!(conn = user.conn, "send failed, closing connection");
            user.close();
        }
    }

    // --- emulators -----------------------------------------------------

    pub fn register_emu(&self, id: EmuId, handle: Arc<EmulatorHandle>) {
        self.emus.lock().insert(id, handle);
    }

    pub fn unregister_emu(&self, id: &str) -> Option<Arc<EmulatorHandle>> {
        self.emus.lock().remove(id)
    }

    pub fn emu(&self, id: &str) -> Option<Arc<EmulatorHandle>> {
        self.emus.lock().get(id).cloned()
    }

    pub fn emu_exists(&self, id: &str) -> bool {
        self.emus.lock().contains_key(id)
    }

    // --- teardown ------------------------------------------------------

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Idempotent server teardown: stop accepting, wake the dispatch worker
    /// with a sentinel, tear every emulator down, close every connection.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            debug!("shutdown already in progress");
            return;
        }
        info!("shutting down");

        self.listener_cancel.cancel();
        self.enqueue(Command::Shutdown);

        let emus: Vec<Arc<EmulatorHandle>> = self.emus.lock().drain().map(|(_, h)| h).collect();
        for emu in emus {
            emu.shutdown(&self.sched);
        }

        for user in self.all_users() {
            user.close();
        }
    }
}

/// Register the heartbeat tasks: a `ping` broadcast every second and a
/// sweep that force-closes connections silent for longer than the
/// configured timeout. Pings go to every connection, named or not; any
/// inbound command counts as liveness, `pong` exists for idle viewers.
pub fn register_heartbeat(server: &Arc<ServerCore>) {
    let ping = crowdplay_proto::encode(&["ping"]);
    let weak = Arc::downgrade(server);
    server
        .sched
        .schedule(std::time::Duration::from_secs(1), move || {
            let Some(server) = weak.upgrade() else {
                return;
            };
            for user in server.all_users() {
                server.send_or_close(&user, &ping);
            }
        });

    let timeout = server.config.server_config.heartbeat_timeout;
    let sweep_period = (timeout / 2).clamp(
        std::time::Duration::from_millis(100),
        std::time::Duration::from_secs(1),
    );
    let weak = Arc::downgrade(server);
    server.sched.schedule(sweep_period, move || {
        let Some(server) = weak.upgrade() else {
            return;
        };
        for user in server.all_users() {
            if user.silent_for() > timeout {
                warn!(conn = user.conn, "heartbeat timeout, closing connection");
                user.close();
            }
        }
    });
}
