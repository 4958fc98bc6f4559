//! Single-writer command dispatch.
//!
//! Every client-originated mutation funnels through one queue and one worker
//! thread, which makes the user/emulator registries effectively
//! single-writer. I/O tasks enqueue; the worker validates and mutates.
//! Connection lifecycle events travel the same queue so that, per
//! connection, `Connect` precedes every client command and `Disconnect`
//! follows the last one.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use strum::EnumString;
use tracing::{debug, info};

use crate::server::ServerCore;
use crate::user::User;
use crate::{ConnId, EmuId};

pub mod error;
pub mod handlers;
pub mod registry;

pub use error::{HandlerError, HandlerResult};

/// Client command verbs. Anything that fails to parse is discarded at the
/// socket edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Username,
    Chat,
    List,
    Connect,
    Button,
    Turn,
    Webp,
    Pong,
    Add,
    Remove,
    Stop,
    Shutdown,
}

/// One unit of work for the dispatch worker.
pub enum Command {
    /// A connection finished its handshake. The record is created on the
    /// I/O side but only becomes visible to handlers here, preserving the
    /// single-writer rule.
    Connect { user: Arc<User> },

    /// The connection's read loop ended, for whatever reason.
    Disconnect { conn: ConnId },

    /// A parsed client message.
    Client {
        conn: ConnId,
        verb: Verb,
        params: Vec<String>,
    },

    /// An emulator thread died; unregister it and detach its users.
    EmuStopped { id: EmuId },

    /// Teardown sentinel; the worker exits when it sees this.
    Shutdown,
}

/// The dispatch worker loop. Runs until the `Shutdown` sentinel arrives or
/// every sender is gone. Per-command failures are logged and swallowed; the
/// worker itself never unwinds.
pub fn run_worker(server: Arc<ServerCore>, rx: Receiver<Command>) {
    info!("dispatch worker started");

    while let Ok(cmd) = rx.recv() {
        match cmd {
            Command::Connect { user } => {
                debug!(conn = user.conn, %user.uuid, "user record created");
                server.insert_user(user);
            }

            Command::Disconnect { conn } => {
                let Some(user) = server.remove_user(conn) else {
                    debug!(conn, "disconnect for unknown connection");
                    continue;
                };
                let emu_id = user.connected_emu();
                if !emu_id.is_empty()
                    && let Some(emu) = server.emu(&emu_id)
                {
                    emu.user_disconnected(&user);
                }
                let name = user.username();
                if !name.is_empty() {
                    server.broadcast_all(&crowdplay_proto::encode(&["leave", &name]));
                }
                debug!(conn, username = %name, "user removed");
            }

            Command::Client { conn, verb, params } => {
                let user = server.user(conn);
                if let Some(user) = &user {
                    user.touch_pong();
                }
                let mut ctx = handlers::HandlerContext {
                    server: &server,
                    conn,
                    user,
                };
                match registry::get().dispatch(verb, &mut ctx, &params) {
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        // Dropped silently per protocol; the log is for us.
                        debug!(conn, ?verb, %err, "command rejected");
                    }
                    None => debug!(conn, ?verb, "no handler registered"),
                }
            }

            Command::EmuStopped { id } => {
                if let Some(emu) = server.unregister_emu(&id) {
                    emu.abandon(&server.sched);
                }
                let frame = crowdplay_proto::encode(&["emu-stopped", &id]);
                for user in server.users_of_emu(&id) {
                    user.clear_turn_flags();
                    user.set_connected_emu("");
                    server.send_or_close(&user, &frame);
                }
                info!(emu = %id, "emulator stopped and unregistered");
            }

            Command::Shutdown => break,
        }
    }

    info!("dispatch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_util::sync::CancellationToken;

    fn text_frames(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                out.push(text.as_str().to_string());
            }
        }
        out
    }

    fn client(conn: crate::ConnId) -> (Arc<User>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(64);
        (Arc::new(User::new(conn, tx, CancellationToken::new())), rx)
    }

    #[test]
    fn effects_follow_queue_order() {
        let (server, cmd_rx) = ServerCore::new(Config::default());
        let (user, mut out) = client(1);

        server.enqueue(Command::Connect { user });
        server.enqueue(Command::Client {
            conn: 1,
            verb: Verb::Username,
            params: vec!["alice".to_string()],
        });
        server.enqueue(Command::Client {
            conn: 1,
            verb: Verb::List,
            params: vec![],
        });
        server.enqueue(Command::Shutdown);

        // Runs inline until the sentinel.
        run_worker(Arc::clone(&server), cmd_rx);

        assert_eq!(
            text_frames(&mut out),
            vec!["4.join,5.alice;", "4.list,5.alice;"]
        );
        server.sched.stop();
    }

    #[test]
    fn handler_failures_do_not_stop_the_worker() {
        let (server, cmd_rx) = ServerCore::new(Config::default());
        let (user, mut out) = client(1);

        server.enqueue(Command::Connect { user });
        // Too short, rejected silently.
        server.enqueue(Command::Client {
            conn: 1,
            verb: Verb::Username,
            params: vec!["ab".to_string()],
        });
        server.enqueue(Command::Client {
            conn: 1,
            verb: Verb::Username,
            params: vec!["alice".to_string()],
        });
        server.enqueue(Command::Shutdown);

        run_worker(Arc::clone(&server), cmd_rx);

        assert_eq!(text_frames(&mut out), vec!["4.join,5.alice;"]);
        server.sched.stop();
    }

    #[test]
    fn disconnect_removes_the_record() {
        let (server, cmd_rx) = ServerCore::new(Config::default());
        let (user, _out) = client(1);

        server.enqueue(Command::Connect { user });
        server.enqueue(Command::Disconnect { conn: 1 });
        server.enqueue(Command::Shutdown);

        run_worker(Arc::clone(&server), cmd_rx);

        assert_eq!(server.user_count(), 0);
        server.sched.stop();
    }

    #[test]
    fn failed_emulator_start_registers_nothing() {
        let (server, cmd_rx) = ServerCore::new(Config::default());
        let (user, mut out) = client(1);

        server.enqueue(Command::Connect { user });
        server.enqueue(Command::Client {
            conn: 1,
            verb: Verb::Add,
            params: vec![
                "emu1".to_string(),
                "/definitely/missing/core.so".to_string(),
                "/tmp/rom.gba".to_string(),
            ],
        });
        server.enqueue(Command::Shutdown);

        run_worker(Arc::clone(&server), cmd_rx);

        assert!(!server.emu_exists("emu1"));
        assert_eq!(text_frames(&mut out), vec!["10.emu-failed,4.emu1;"]);
        server.sched.stop();
    }

    #[test]
    fn commands_for_unknown_connections_are_discarded() {
        let (server, cmd_rx) = ServerCore::new(Config::default());

        server.enqueue(Command::Client {
            conn: 99,
            verb: Verb::List,
            params: vec![],
        });
        server.enqueue(Command::Shutdown);

        run_worker(Arc::clone(&server), cmd_rx);
        assert_eq!(server.user_count(), 0);
        server.sched.stop();
    }
}
