//! Background reconnection with exponential backoff.
//!
//! Started when an established session drops unexpectedly, or when an
//! explicit connect fails after a session has existed. At most one loop runs
//! at a time; it is cancelled by `disconnect()` and by any successful connect.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::manager::Shared;
use crate::types::{ConnectionEvent, ConnectionState};

impl Shared {
    /// Spawns the reconnect loop unless one is running or the caller closed
    /// the session.
    pub(crate) fn start_reconnect(self: &Arc<Self>) {
        let (generation, cancel) = {
            let mut s = self.session();
            if s.closed_by_caller {
                debug!("session closed by caller, not reconnecting");
                return;
            }
            if s.reconnect.is_some() {
                debug!("reconnect loop already running");
                return;
            }
            s.reconnect_generation += 1;
            s.reconnect_attempt = 0;
            let cancel = CancellationToken::new();
            s.reconnect = Some((s.reconnect_generation, cancel.clone()));
            (s.reconnect_generation, cancel)
        };

        tokio::spawn(reconnect_loop(self.clone(), generation, cancel));
    }

    /// The link opened under `epoch` closed without a local `close()`.
    pub(crate) fn handle_closed(self: &Arc<Self>, epoch: u64, reason: Option<String>) {
        {
            let mut s = self.session();
            if s.link.is_none() || s.link_epoch != epoch {
                debug!(epoch, "ignoring close of a stale link");
                return;
            }
            s.link = None;
            if s.closed_by_caller {
                return;
            }
            warn!(reason = reason.as_deref().unwrap_or("unknown"), "hub connection lost");
            self.set_state(&mut s, ConnectionState::Disconnected);
        }
        self.start_reconnect();
    }

    /// The transport is retrying on its own. Observed only.
    pub(crate) fn handle_transport_reconnecting(&self, epoch: u64) {
        let s = self.session();
        if s.link_epoch == epoch {
            info!("hub transport reconnecting");
        }
    }

    /// The transport's own retry succeeded.
    pub(crate) fn handle_transport_reconnected(&self, epoch: u64) {
        let reconnect = {
            let mut s = self.session();
            if s.link.is_none() || s.link_epoch != epoch || s.closed_by_caller {
                return;
            }
            info!("hub transport reconnected");
            self.set_state(&mut s, ConnectionState::Connected);
            s.reconnect.take()
        };
        if let Some((_, cancel)) = reconnect {
            cancel.cancel();
        }
    }
}

/// Retries the session until it is re-established, the caller closes it,
/// or the loop is cancelled.
///
/// Attempt `n` waits `ReconnectConfig::delay_for_attempt(n)` first. A dead
/// link left over from the dropped session is closed before a fresh one is
/// opened with the retained token.
pub(crate) async fn reconnect_loop(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        let delay = shared.reconnect_config.delay_for_attempt(attempt);
        {
            let mut s = shared.session();
            if cancel.is_cancelled() || s.closed_by_caller {
                break;
            }
            s.reconnect_attempt = attempt;
            // An explicit connect in flight owns the state.
            if s.state != ConnectionState::Connecting {
                shared.set_state(&mut s, ConnectionState::Reconnecting { attempt });
            }
        }
        shared.emit(ConnectionEvent::Reconnecting {
            attempt,
            next_retry: delay,
        });
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnecting to hub"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(attempt, "reconnect cancelled");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let (token, dead_link) = {
            let mut s = shared.session();
            if cancel.is_cancelled() || s.closed_by_caller {
                break;
            }
            if s.state == ConnectionState::Connecting {
                debug!(attempt, "connect already in flight, skipping attempt");
                continue;
            }
            let Some(token) = s.last_known_token.clone() else {
                warn!("no token retained, giving up reconnection");
                break;
            };
            let dead_link = s.link.take_if(|link| !link.is_live());
            shared.set_state(&mut s, ConnectionState::Connecting);
            (token, dead_link)
        };

        if let Some(link) = dead_link {
            debug!("closing dead link before reconnecting");
            link.close().await;
        }

        match shared.open_and_install(&token).await {
            Ok(()) => {
                info!(attempt, "reconnected to hub");
                shared.emit(ConnectionEvent::Reconnected);
                break;
            }
            Err(ConnectionError::Aborted) => break,
            Err(e) => {
                warn!(attempt, error = %e, "reconnect attempt failed");
                let mut s = shared.session();
                if s.state == ConnectionState::Connecting && !s.closed_by_caller {
                    shared.set_state(&mut s, ConnectionState::Reconnecting { attempt });
                }
            }
        }
    }

    let mut s = shared.session();
    if s
        .reconnect
        .as_ref()
        .is_some_and(|(current, _)| *current == generation)
    {
        s.reconnect = None;
    }
}
