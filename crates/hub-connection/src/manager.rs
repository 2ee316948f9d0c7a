//! Connection manager owning the single hub session.
//!
//! Holds the current link, the session flags and the reconnect loop handle
//! behind one lock, derives the hub endpoint from the REST base address and
//! routes hub pushes into the [`EventDispatcher`].

use std::sync::{Arc, MutexGuard, PoisonError, RwLock, Weak};

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use kinship_protocol::InboundEvent;
use kinship_protocol::events::EventKind;

use crate::config::HubConnectionConfig;
use crate::dispatcher::EventDispatcher;
use crate::endpoint::resolve_hub_url;
use crate::error::ConnectionError;
use crate::transport::{HubConnector, HubLink, LinkCallbacks, WsConnector};
use crate::types::{
    ConnectionEvent, ConnectionState, ReconnectConfig, SessionFlags, TokenSupplier,
};
use crate::ws_client::{ClientOptions, WsError};

/// Mutable session bookkeeping, guarded by [`Shared::session`].
#[derive(Default)]
pub(crate) struct Session {
    pub(crate) state: ConnectionState,
    pub(crate) had_ever_connected: bool,
    pub(crate) closed_by_caller: bool,
    pub(crate) last_known_token: Option<String>,
    pub(crate) link: Option<Arc<dyn HubLink>>,
    /// Epoch of the installed link. Callbacks carrying another epoch are stale.
    pub(crate) link_epoch: u64,
    pub(crate) next_epoch: u64,
    /// Cancel handle of the running reconnect loop, tagged with its generation.
    pub(crate) reconnect: Option<(u64, CancellationToken)>,
    pub(crate) reconnect_generation: u64,
    /// Attempt number the running reconnect loop is on.
    pub(crate) reconnect_attempt: u32,
}

/// State shared between the manager, link callbacks and the reconnect loop.
pub(crate) struct Shared {
    pub(crate) connector: Arc<dyn HubConnector>,
    pub(crate) api_base_url: RwLock<String>,
    pub(crate) hub_path: String,
    pub(crate) reconnect_config: ReconnectConfig,
    pub(crate) session: std::sync::Mutex<Session>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
}

/// Manages the connection to the chat hub.
///
/// At most one link is open at a time. Unexpected drops of an established
/// session are retried in the background with exponential backoff until
/// [`disconnect`](Self::disconnect) is called.
pub struct ConnectionManager {
    pub(crate) inner: Arc<Shared>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    /// Creates a manager that dials the hub over WebSocket.
    pub fn new(config: HubConnectionConfig) -> Self {
        let connector = Arc::new(WsConnector::new(ClientOptions::from(&config)));
        Self::with_connector(config, connector)
    }

    /// Creates a manager that opens links through `connector`.
    pub fn with_connector(config: HubConnectionConfig, connector: Arc<dyn HubConnector>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);

        Self {
            inner: Arc::new(Shared {
                connector,
                api_base_url: RwLock::new(config.api_base_url),
                hub_path: config.hub_path,
                reconnect_config: config.reconnect,
                session: std::sync::Mutex::new(Session::default()),
                dispatcher: Arc::new(EventDispatcher::new()),
                events_tx,
            }),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.session().state
    }

    /// Returns a snapshot of the session flags.
    pub fn flags(&self) -> SessionFlags {
        let s = self.inner.session();
        SessionFlags {
            had_ever_connected: s.had_ever_connected,
            closed_by_caller: s.closed_by_caller,
            reconnect_in_progress: s.reconnect.is_some(),
            has_token: s.last_known_token.is_some(),
        }
    }

    /// Returns the dispatcher that receives hub pushes.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Registers the handler for `kind`, replacing any previous one.
    /// Returns `true` if a handler was replaced.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> bool
    where
        F: Fn(InboundEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, handler)
    }

    /// Changes the REST base address. Takes effect on the next connect
    /// attempt; the hub address is re-derived every time.
    pub fn set_api_base_url(&self, url: impl Into<String>) {
        let url = url.into();
        debug!(url = %url, "api base url changed");
        *self
            .inner
            .api_base_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = url;
    }

    /// Returns the hub address derived from the current REST base address.
    pub fn hub_url(&self) -> Result<String, ConnectionError> {
        self.inner.hub_url()
    }

    /// Connects to the hub with `token` as the bearer credential.
    ///
    /// Returns immediately if already connected or an attempt is in flight.
    /// When no connection has ever succeeded, a failure is returned and no
    /// background reconnection is started. After a session has existed, a
    /// failure is logged, the reconnect loop takes over and `Ok` is returned.
    pub async fn connect(&self, token: impl Into<String>) -> Result<(), ConnectionError> {
        self.inner.connect(token.into()).await
    }

    /// Connects with the token currently offered by `supplier`.
    pub async fn connect_with(&self, supplier: &dyn TokenSupplier) -> Result<(), ConnectionError> {
        match supplier.token() {
            Some(token) => self.connect(token).await,
            None => {
                warn!("no token available, not connecting");
                Err(ConnectionError::MissingToken)
            }
        }
    }

    /// Closes the session and stops any background reconnection.
    ///
    /// Forgets the retained token. Safe to call repeatedly; an in-flight
    /// connect attempt fails with [`ConnectionError::Aborted`].
    pub async fn disconnect(&self) {
        let (link, reconnect) = {
            let mut s = self.inner.session();
            s.closed_by_caller = true;
            s.last_known_token = None;
            let link = s.link.take();
            let reconnect = s.reconnect.take();
            self.inner.set_state(&mut s, ConnectionState::Disconnected);
            (link, reconnect)
        };

        if let Some((_, cancel)) = reconnect {
            debug!("cancelling reconnect loop");
            cancel.cancel();
        }
        if let Some(link) = link {
            link.close().await;
            info!("disconnected from hub");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let reconnect = self.inner.session().reconnect.take();
        if let Some((_, cancel)) = reconnect {
            cancel.cancel();
        }
    }
}

impl Shared {
    pub(crate) fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn hub_url(&self) -> Result<String, ConnectionError> {
        let base = self
            .api_base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        resolve_hub_url(&base, &self.hub_path)
    }

    /// Updates the state and notifies observers if it changed.
    pub(crate) fn set_state(&self, session: &mut Session, state: ConnectionState) {
        if session.state == state {
            return;
        }
        debug!(from = ?session.state, to = ?state, "connection state changed");
        session.state = state;
        self.emit(ConnectionEvent::StateChanged(state));
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("dropping connection event: {e}");
        }
    }

    pub(crate) async fn connect(self: &Arc<Self>, token: String) -> Result<(), ConnectionError> {
        {
            let mut s = self.session();
            if matches!(
                s.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                debug!(state = ?s.state, "connect ignored");
                return Ok(());
            }
            s.closed_by_caller = false;
            s.last_known_token = Some(token.clone());
            self.set_state(&mut s, ConnectionState::Connecting);
        }

        let err = match self.open_and_install(&token).await {
            Ok(()) => {
                info!("connected to hub");
                return Ok(());
            }
            Err(e) => e,
        };

        let had_ever_connected = {
            let mut s = self.session();
            if s.closed_by_caller {
                return Err(ConnectionError::Aborted);
            }
            // A running loop keeps owning the state until its next attempt.
            let state = if s.reconnect.is_some() {
                ConnectionState::Reconnecting {
                    attempt: s.reconnect_attempt.max(1),
                }
            } else {
                ConnectionState::Disconnected
            };
            self.set_state(&mut s, state);
            s.had_ever_connected
        };

        if !had_ever_connected {
            warn!(error = %err, "connect failed");
            return Err(err);
        }

        warn!(error = %err, "reconnect failed, retrying in background");
        self.start_reconnect();
        Ok(())
    }

    /// Opens a link and installs it as the current one, unless the caller
    /// disconnected while the handshake was in flight or the link already
    /// died. A link closing before it is installed has its close callback
    /// ignored as stale, so it must never become the current link.
    pub(crate) async fn open_and_install(self: &Arc<Self>, token: &str) -> Result<(), ConnectionError> {
        let hub_url = self.hub_url()?;
        let epoch = {
            let mut s = self.session();
            s.next_epoch += 1;
            s.next_epoch
        };

        debug!(url = %hub_url, epoch, "opening hub link");
        let link = self
            .connector
            .open(&hub_url, token, self.callbacks(epoch))
            .await?;

        let installed = {
            let mut s = self.session();
            if s.closed_by_caller {
                Err((link, ConnectionError::Aborted))
            } else if !link.is_live() {
                Err((link, ConnectionError::Transport(WsError::Closed)))
            } else {
                let stale = s.link.replace(link);
                s.link_epoch = epoch;
                s.had_ever_connected = true;
                self.set_state(&mut s, ConnectionState::Connected);
                Ok((stale, s.reconnect.take()))
            }
        };

        match installed {
            Ok((stale, reconnect)) => {
                if let Some((_, cancel)) = reconnect {
                    cancel.cancel();
                }
                if let Some(stale) = stale {
                    stale.close().await;
                }
                Ok(())
            }
            Err((link, err)) => {
                match err {
                    ConnectionError::Aborted => {
                        debug!("disconnect raced the handshake, dropping new link")
                    }
                    _ => debug!(epoch, "hub link closed during handshake"),
                }
                link.close().await;
                Err(err)
            }
        }
    }

    /// Builds the callbacks handed to a link opened under `epoch`.
    fn callbacks(self: &Arc<Self>, epoch: u64) -> LinkCallbacks {
        let dispatcher = self.dispatcher.clone();
        let weak = Arc::downgrade(self);

        LinkCallbacks {
            on_invocation: Arc::new(move |target: &str, arguments: &[Value]| {
                dispatcher.dispatch_invocation(target, arguments);
            }),
            on_reconnecting: with_shared(&weak, move |shared| {
                shared.handle_transport_reconnecting(epoch)
            }),
            on_reconnected: with_shared(&weak, move |shared| {
                shared.handle_transport_reconnected(epoch)
            }),
            on_closed: {
                let weak = weak.clone();
                Arc::new(move |reason: Option<String>| {
                    if let Some(shared) = weak.upgrade() {
                        shared.handle_closed(epoch, reason);
                    }
                })
            },
        }
    }
}

fn with_shared<F>(weak: &Weak<Shared>, f: F) -> Arc<dyn Fn() + Send + Sync>
where
    F: Fn(Arc<Shared>) + Send + Sync + 'static,
{
    let weak = weak.clone();
    Arc::new(move || {
        if let Some(shared) = weak.upgrade() {
            f(shared);
        }
    })
}
