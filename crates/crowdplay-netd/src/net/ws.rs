//! Listener and per-connection handling.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crowdplay_proto::limits::MAX_FRAME_LEN;

use crate::dispatch::{Command, Verb};
use crate::next_conn_id;
use crate::server::ServerCore;
use crate::user::User;

use super::outbound::{OUTBOUND_QUEUE, spawn_writer};

/// Accept connections until the server's listener token cancels.
pub async fn run_listener(listener: TcpListener, server: Arc<ServerCore>) -> anyhow::Result<()> {
    let token = server.listener_token();
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let server = Arc::clone(&server);
                tokio::spawn(async move {
                    handle_connection(stream, peer, server).await;
                });
            }
        }
    }
}

/// One connection: handshake, writer task, then the read loop.
///
/// The `Connect` command is enqueued before any frame is read, so the user
/// record exists by the time the dispatch worker sees this connection's
/// first client command.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, server: Arc<ServerCore>) {
    let _ = stream.set_nodelay(true);

    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    let (write, mut read) = ws.split();

    let (out_tx, out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    let writer = spawn_writer(write, out_rx);

    let conn_id = next_conn_id();
    let cancel = CancellationToken::new();
    let user = Arc::new(User::new(conn_id, out_tx.clone(), cancel.clone()));
    server.enqueue(Command::Connect { user });
    debug!(conn_id, %peer, "client connected");

    let mut reason = "eof".to_string();

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                reason = "cancelled by server".to_string();
                break;
            }
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if text.len() > MAX_FRAME_LEN {
                    debug!(conn_id, len = text.len(), "oversized frame dropped");
                    continue;
                }
                let decoded = crowdplay_proto::decode(text.as_str());
                let Some((verb, params)) = decoded.split_first() else {
                    // Malformed frames are dropped silently.
                    continue;
                };
                let Ok(verb) = verb.parse::<Verb>() else {
                    continue;
                };
                server.enqueue(Command::Client {
                    conn: conn_id,
                    verb,
                    params: params.to_vec(),
                });
            }
            // Binary traffic is server -> client only.
            Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(_))) => {
                reason = "client closed".to_string();
                break;
            }
            Some(Err(e)) => {
                reason = format!("read error: {e}");
                break;
            }
            None => break,
        }
    }

    server.enqueue(Command::Disconnect { conn: conn_id });
    drop(out_tx);
    let _ = writer.await;
    debug!(conn_id, %peer, %reason, "client disconnected");
}
