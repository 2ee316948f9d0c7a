//! Ping pump sending periodic hub-level keepalive records.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use kinship_protocol::HubFrame;

/// Sends a ping record every `interval` so the hub keeps the connection.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let ping = match HubFrame::Ping.to_record() {
        Ok(record) => record,
        Err(e) => {
            warn!("failed to encode ping record: {e}");
            return;
        }
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let msg = tungstenite::Message::Text(ping.clone().into());
                if write_tx.send(msg).await.is_err() {
                    break;
                }
            }
        }
    }
}
