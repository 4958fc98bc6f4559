//! Outbound frame queue for one connection.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

/// Sender used by the dispatch side to queue frames for one connection.
/// Sends are non-blocking; a full queue counts as a transport failure.
pub type OutboundTx = mpsc::Sender<Message>;

/// Depth of each connection's outbound queue. Frame diffs are bursty, so
/// leave room before backpressure turns into drops.
pub const OUTBOUND_QUEUE: usize = 256;

/// Drain the outbound queue into the socket until the queue closes or a
/// write fails. Either way the sink is closed on exit.
pub fn spawn_writer<S>(mut write: S, mut rx: mpsc::Receiver<Message>) -> JoinHandle<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let is_close = matches!(frame, Message::Close(_));
            if write.send(frame).await.is_err() || is_close {
                break;
            }
        }
        let _ = write.close().await;
    })
}
