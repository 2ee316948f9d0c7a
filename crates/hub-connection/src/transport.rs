//! Transport seam between the connection manager and the hub.
//!
//! The manager only ever holds an `Arc<dyn HubLink>` obtained from a
//! [`HubConnector`]; [`WsConnector`] is the production implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::endpoint::websocket_url;
use crate::ws_client::{ClientOptions, WsClient, WsError};

/// Called for every invocation pushed by the hub: `(target, arguments)`.
pub type InvocationCallback = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

/// Called on a transport lifecycle transition.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Called once when the link drops, with the close reason if one is known.
pub type ClosedCallback = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Hooks a transport reports into. Handed over at open time.
#[derive(Clone)]
pub struct LinkCallbacks {
    pub on_invocation: InvocationCallback,
    /// The transport lost the connection and is retrying on its own.
    pub on_reconnecting: LifecycleCallback,
    /// The transport's own retry succeeded.
    pub on_reconnected: LifecycleCallback,
    /// The link is gone for good. Not called when the link is closed locally.
    pub on_closed: ClosedCallback,
}

impl LinkCallbacks {
    /// Callbacks that ignore everything.
    pub fn noop() -> Self {
        Self {
            on_invocation: Arc::new(|_: &str, _: &[Value]| {}),
            on_reconnecting: Arc::new(|| {}),
            on_reconnected: Arc::new(|| {}),
            on_closed: Arc::new(|_| {}),
        }
    }
}

/// A live, handshaken connection to the hub.
#[async_trait]
pub trait HubLink: Send + Sync {
    /// Invokes a hub method and waits for its completion.
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, WsError>;

    /// Returns `true` while the connection is usable.
    fn is_live(&self) -> bool;

    /// Closes the connection. Idempotent.
    async fn close(&self);
}

/// Opens links to the hub.
#[async_trait]
pub trait HubConnector: Send + Sync {
    /// Opens a connection to `hub_url`, presenting `token` as the handshake
    /// credential, and completes the protocol handshake.
    async fn open(
        &self,
        hub_url: &str,
        token: &str,
        callbacks: LinkCallbacks,
    ) -> Result<Arc<dyn HubLink>, WsError>;
}

/// WebSocket connector built on [`WsClient`].
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    options: ClientOptions,
}

impl WsConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl HubConnector for WsConnector {
    async fn open(
        &self,
        hub_url: &str,
        token: &str,
        callbacks: LinkCallbacks,
    ) -> Result<Arc<dyn HubLink>, WsError> {
        let url = websocket_url(hub_url)?;
        let client = WsClient::connect(&url, token, &self.options, callbacks).await?;
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl HubLink for WsClient {
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, WsError> {
        WsClient::invoke(self, target, arguments).await
    }

    fn is_live(&self) -> bool {
        WsClient::is_live(self)
    }

    async fn close(&self) {
        WsClient::close(self).await;
    }
}
