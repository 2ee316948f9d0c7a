//! WebSocket write pump serialising outbound messages.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Writes queued messages to the WebSocket, giving each write at most
/// `write_timeout`. Sends a close frame on exit.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    write_timeout: Duration,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };

        match tokio::time::timeout(write_timeout, write.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("WebSocket write error: {e}");
                break;
            }
            Err(_) => {
                error!("WebSocket write timed out");
                break;
            }
        }
    }

    debug!("write pump exiting");
    let _ = write.send(tungstenite::Message::Close(None)).await;
}
