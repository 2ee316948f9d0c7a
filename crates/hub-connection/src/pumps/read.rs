//! WebSocket read pump: completes the handshake, then dispatches records.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use kinship_protocol::constants::MAX_MESSAGE_SIZE;
use kinship_protocol::{HandshakeResponse, HubFrame, split_records};

use crate::transport::LinkCallbacks;
use crate::ws_client::{PendingMap, WsError};

/// Whether the pump keeps reading after a frame.
#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    /// Stop reading; the connection ended for the given reason.
    Stop(Option<String>),
}

/// Shared handles the read pump works with.
pub(crate) struct ReadPump {
    pub(crate) pending: PendingMap,
    pub(crate) callbacks: LinkCallbacks,
    pub(crate) live: Arc<AtomicBool>,
    pub(crate) write_tx: mpsc::Sender<tungstenite::Message>,
    pub(crate) server_timeout: Duration,
}

impl ReadPump {
    /// Reads messages from the WebSocket until it ends, is cancelled, or
    /// stays silent past the server timeout.
    ///
    /// The first record is the handshake response; its outcome is sent on
    /// `handshake_tx`. Once the handshake has succeeded, an unexpected end
    /// of the connection fires the closed callback exactly once.
    pub(crate) async fn run<S>(
        mut self,
        mut read: S,
        handshake_tx: oneshot::Sender<Result<(), WsError>>,
        cancel: CancellationToken,
    ) where
        S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    {
        let mut handshake_tx = Some(handshake_tx);

        // Any incoming message resets the deadline, not just pings.
        let deadline = tokio::time::sleep(self.server_timeout);
        tokio::pin!(deadline);

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.live.store(false, Ordering::Release);
                    self.pending.lock().await.clear();
                    return;
                }

                () = &mut deadline => {
                    warn!("server timeout, connection dead");
                    break Some("server timeout".to_string());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            deadline.as_mut().reset(tokio::time::Instant::now() + self.server_timeout);

                            match msg {
                                tungstenite::Message::Text(text) => {
                                    if let Flow::Stop(reason) =
                                        self.handle_text(&text, &mut handshake_tx).await
                                    {
                                        break reason;
                                    }
                                }
                                tungstenite::Message::Ping(data) => {
                                    trace!("received ping, sending pong");
                                    let _ = self.write_tx.send(tungstenite::Message::Pong(data)).await;
                                }
                                tungstenite::Message::Close(frame) => {
                                    debug!(?frame, "received close frame");
                                    break frame
                                        .map(|f| f.reason.to_string())
                                        .filter(|r| !r.is_empty());
                                }
                                _ => {} // binary, pong
                            }
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket read error: {e}");
                            break Some(e.to_string());
                        }
                        None => {
                            debug!("WebSocket stream ended");
                            break None;
                        }
                    }
                }
            }
        };

        let was_live = self.live.swap(false, Ordering::AcqRel);
        // Dropping the senders fails every waiting invocation with `Closed`.
        self.pending.lock().await.clear();

        // A link that never completed its handshake only drops `handshake_tx`.
        if was_live {
            (self.callbacks.on_closed)(reason);
        }
    }

    /// Handles one text frame, which may carry several records.
    async fn handle_text(
        &mut self,
        text: &str,
        handshake_tx: &mut Option<oneshot::Sender<Result<(), WsError>>>,
    ) -> Flow {
        if text.len() > MAX_MESSAGE_SIZE {
            warn!("message too large ({} bytes), dropping", text.len());
            return Flow::Continue;
        }

        for record in split_records(text) {
            if let Some(tx) = handshake_tx.take() {
                match HandshakeResponse::check(record) {
                    Ok(()) => {
                        self.live.store(true, Ordering::Release);
                        let _ = tx.send(Ok(()));
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "hub rejected handshake");
                        let _ = tx.send(Err(e.into()));
                        return Flow::Stop(None);
                    }
                }
            }

            let frame = match HubFrame::parse(record) {
                Ok(f) => f,
                Err(e) => {
                    warn!("failed to parse hub record: {e}");
                    continue;
                }
            };

            match frame {
                HubFrame::Invocation {
                    target, arguments, ..
                } => {
                    trace!(%target, "hub push");
                    (self.callbacks.on_invocation)(&target, &arguments);
                }
                HubFrame::Completion {
                    invocation_id,
                    result,
                    error,
                } => {
                    let completion = match error {
                        Some(message) => Err(message),
                        None => Ok(result.unwrap_or_default()),
                    };
                    match self.pending.lock().await.remove(&invocation_id) {
                        Some(tx) => {
                            let _ = tx.send(completion);
                        }
                        None => debug!(%invocation_id, "completion for unknown invocation"),
                    }
                }
                HubFrame::Ping => trace!("received hub ping"),
                HubFrame::Close {
                    error,
                    allow_reconnect,
                } => {
                    debug!(?error, allow_reconnect, "hub closed the connection");
                    return Flow::Stop(error);
                }
                HubFrame::Other(kind) => trace!(kind, "ignoring hub record"),
            }
        }
        Flow::Continue
    }
}
