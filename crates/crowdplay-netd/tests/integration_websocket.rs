//! End-to-end tests over a real WebSocket listener with mock clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crowdplay_netd::config::Config;
use crowdplay_netd::dispatch::run_worker;
use crowdplay_netd::net::ws::run_listener;
use crowdplay_netd::server::{ServerCore, register_heartbeat};
use crowdplay_proto::encode;

async fn start_server(config: Config, heartbeat: bool) -> (Arc<ServerCore>, SocketAddr) {
    let (server, cmd_rx) = ServerCore::new(config);
    if heartbeat {
        register_heartbeat(&server);
    }

    let worker_server = Arc::clone(&server);
    std::thread::spawn(move || run_worker(worker_server, cmd_rx));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind");
    let addr = listener.local_addr().expect("local addr");
    let listen_server = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = run_listener(listener, listen_server).await;
    });

    (server, addr)
}

/// Mock test client.
struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{addr}"))
            .await
            .expect("websocket connect");
        Self { ws }
    }

    async fn send(&mut self, frame: String) {
        self.ws
            .send(Message::Text(frame.into()))
            .await
            .expect("send frame");
    }

    /// Next text frame that is not a heartbeat ping. `None` on close.
    async fn recv_text(&mut self) -> Option<String> {
        loop {
            let frame = timeout(Duration::from_secs(2), self.ws.next())
                .await
                .expect("timed out waiting for a frame")?;
            match frame {
                Ok(Message::Text(text)) => {
                    if text.as_str() == "4.ping;" {
                        continue;
                    }
                    return Some(text.as_str().to_string());
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Read until the server closes the connection; panics if it stays
    /// open past `limit`.
    async fn expect_close(mut self, limit: Duration) {
        let wait_for_close = async {
            while let Some(frame) = self.ws.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => return,
                    Ok(_) => continue,
                }
            }
        };
        timeout(limit, wait_for_close)
            .await
            .expect("server never closed the connection");
    }
}

#[tokio::test]
async fn username_join_and_list() {
    let (_server, addr) = start_server(Config::default(), false).await;
    let mut alice = TestClient::connect(addr).await;

    alice.send(encode(&["username", "alice"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.join,5.alice;"));

    alice.send(encode(&["list"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.list,5.alice;"));
}

#[tokio::test]
async fn list_shows_every_named_user() {
    let (_server, addr) = start_server(Config::default(), false).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;

    alice.send(encode(&["username", "alice"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.join,5.alice;"));
    bob.send(encode(&["username", "bob"])).await;
    assert_eq!(bob.recv_text().await.as_deref(), Some("4.join,3.bob;"));

    bob.send(encode(&["list"])).await;
    let reply = bob.recv_text().await.expect("list reply");
    // Map iteration order is unspecified; accept either permutation.
    assert!(
        reply == "4.list,5.alice,3.bob;" || reply == "4.list,3.bob,5.alice;",
        "unexpected list reply: {reply}"
    );
}

#[tokio::test]
async fn chat_before_username_is_dropped() {
    let (_server, addr) = start_server(Config::default(), false).await;
    let mut client = TestClient::connect(addr).await;

    // Scenario: a chat frame before the username handshake must produce
    // no broadcast and no state change.
    client.send("4.chat,5.alice,5.hello;".to_string()).await;
    client.send(encode(&["username", "alice"])).await;

    // The first frame the client ever sees is its own join broadcast;
    // the chat message vanished.
    assert_eq!(client.recv_text().await.as_deref(), Some("4.join,5.alice;"));
}

#[tokio::test]
async fn malformed_frames_are_dropped_silently() {
    let (server, addr) = start_server(Config::default(), false).await;
    let mut client = TestClient::connect(addr).await;

    client.send("garbage".to_string()).await;
    client.send("4.chat,5.alice".to_string()).await;
    client.send("9999.chat;".to_string()).await;
    client.send(encode(&["nosuchverb", "x"])).await;

    client.send(encode(&["username", "alice"])).await;
    assert_eq!(client.recv_text().await.as_deref(), Some("4.join,5.alice;"));
    assert_eq!(server.user_count(), 1);
}

#[tokio::test]
async fn rename_is_broadcast_to_everyone() {
    let (_server, addr) = start_server(Config::default(), false).await;
    let mut alice = TestClient::connect(addr).await;
    alice.send(encode(&["username", "alice"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.join,5.alice;"));

    let mut bob = TestClient::connect(addr).await;
    bob.send(encode(&["username", "bob"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.join,3.bob;"));

    bob.send(encode(&["username", "bobby"])).await;
    assert_eq!(
        alice.recv_text().await.as_deref(),
        Some("8.username,3.bob,5.bobby;")
    );
}

#[tokio::test]
async fn duplicate_usernames_are_rejected() {
    let (server, addr) = start_server(Config::default(), false).await;
    let mut alice = TestClient::connect(addr).await;
    alice.send(encode(&["username", "alice"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.join,5.alice;"));

    let mut imposter = TestClient::connect(addr).await;
    imposter.send(encode(&["username", "alice"])).await;
    imposter.send(encode(&["list"])).await;

    // No join broadcast for the imposter; the list shows one alice.
    assert_eq!(
        imposter.recv_text().await.as_deref(),
        Some("4.list,5.alice;")
    );
    assert_eq!(server.usernames(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn connect_to_unknown_emulator_is_dropped() {
    let (server, addr) = start_server(Config::default(), false).await;
    let mut client = TestClient::connect(addr).await;
    client.send(encode(&["username", "alice"])).await;
    assert_eq!(client.recv_text().await.as_deref(), Some("4.join,5.alice;"));

    client.send(encode(&["connect", "emu1"])).await;
    client.send(encode(&["list"])).await;
    assert_eq!(client.recv_text().await.as_deref(), Some("4.list,5.alice;"));
    assert!(server.users_of_emu("emu1").is_empty());
}

#[tokio::test]
async fn leave_is_broadcast_when_a_named_user_disconnects() {
    let (server, addr) = start_server(Config::default(), false).await;
    let mut alice = TestClient::connect(addr).await;
    alice.send(encode(&["username", "alice"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.join,5.alice;"));

    let mut bob = TestClient::connect(addr).await;
    bob.send(encode(&["username", "bob"])).await;
    assert_eq!(alice.recv_text().await.as_deref(), Some("4.join,3.bob;"));

    drop(bob);
    assert_eq!(alice.recv_text().await.as_deref(), Some("5.leave,3.bob;"));

    // Dispatch processed the disconnect: only alice remains.
    assert_eq!(server.usernames(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn silent_connections_are_reaped() {
    let mut config = Config::default();
    config.server_config.heartbeat_timeout = Duration::from_millis(300);
    let (_server, addr) = start_server(config, true).await;

    let mut client = TestClient::connect(addr).await;
    client.send(encode(&["username", "alice"])).await;
    assert_eq!(client.recv_text().await.as_deref(), Some("4.join,5.alice;"));

    // Never answer the pings; the sweep must cut the connection.
    client.expect_close(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn pong_keeps_a_connection_alive() {
    let mut config = Config::default();
    config.server_config.heartbeat_timeout = Duration::from_millis(400);
    let (server, addr) = start_server(config, true).await;

    let mut client = TestClient::connect(addr).await;
    client.send(encode(&["username", "alice"])).await;
    assert_eq!(client.recv_text().await.as_deref(), Some("4.join,5.alice;"));

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        client.send(encode(&["pong"])).await;
    }
    assert_eq!(server.usernames(), vec!["alice".to_string()]);
}
