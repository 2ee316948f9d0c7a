//! WebSocket client speaking the JSON hub protocol.
//!
//! Implements invocation/completion correlation by invocation id,
//! client keepalive pings, a read deadline, and push dispatch through
//! [`LinkCallbacks`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kinship_protocol::constants::{
    HANDSHAKE_TIMEOUT, KEEPALIVE_INTERVAL, MAX_MESSAGE_SIZE, PROXY_BYPASS_HEADER,
    REQUEST_TIMEOUT, SERVER_TIMEOUT,
};
use kinship_protocol::{HandshakeRequest, HubFrame, ProtocolError};

use crate::config::HubConnectionConfig;
use crate::pumps::read::ReadPump;
use crate::transport::LinkCallbacks;

/// Errors from the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("hub error: {0}")]
    Hub(String),

    #[error("invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("token is not a valid header value")]
    InvalidToken,
}

/// Outcome of an invocation as reported by its completion record.
pub(crate) type Completion = Result<Value, String>;

/// Invocations awaiting their completion, keyed by invocation id.
pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Completion>>>>;

/// Timeouts and handshake options for [`WsClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    pub handshake_timeout: Duration,
    pub keepalive_interval: Duration,
    pub server_timeout: Duration,
    pub proxy_bypass_header: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: REQUEST_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            server_timeout: SERVER_TIMEOUT,
            proxy_bypass_header: true,
        }
    }
}

impl From<&HubConnectionConfig> for ClientOptions {
    fn from(config: &HubConnectionConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            handshake_timeout: config.handshake_timeout,
            keepalive_interval: config.keepalive_interval,
            server_timeout: config.server_timeout,
            proxy_bypass_header: config.proxy_bypass_header,
        }
    }
}

/// WebSocket client connected to the hub.
///
/// Returned from [`WsClient::connect`] only after the protocol handshake
/// succeeded.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    live: Arc<AtomicBool>,
    request_timeout: Duration,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl WsClient {
    /// Connects to the hub and performs the protocol handshake.
    ///
    /// `token` is sent as a bearer credential on the upgrade request. The
    /// dial, the HTTP upgrade and the hub handshake together must finish
    /// within `options.handshake_timeout`.
    pub async fn connect(
        url: &str,
        token: &str,
        options: &ClientOptions,
        callbacks: LinkCallbacks,
    ) -> Result<Self, WsError> {
        match tokio::time::timeout(
            options.handshake_timeout,
            Self::dial(url, token, options, callbacks),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                debug!(url, "hub connect timed out");
                Err(WsError::Timeout)
            }
        }
    }

    async fn dial(
        url: &str,
        token: &str,
        options: &ClientOptions,
        callbacks: LinkCallbacks,
    ) -> Result<Self, WsError> {
        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| WsError::InvalidToken)?,
        );
        if options.proxy_bypass_header {
            let (name, value) = PROXY_BYPASS_HEADER;
            headers.insert(name, HeaderValue::from_static(value));
        }

        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let live = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let (handshake_tx, handshake_rx) = oneshot::channel();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(
                write,
                write_rx,
                options.request_timeout,
                cancel,
            ))
        };

        let read_handle = {
            let pump = ReadPump {
                pending: pending.clone(),
                callbacks,
                live: live.clone(),
                write_tx: write_tx.clone(),
                server_timeout: options.server_timeout,
            };
            tokio::spawn(pump.run(read, handshake_tx, cancel.clone()))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                options.keepalive_interval,
                cancel,
            ))
        };

        let client = Self {
            write_tx,
            pending,
            live,
            request_timeout: options.request_timeout,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        };

        let handshake = HandshakeRequest::default().to_record()?;
        client
            .write_tx
            .send(tungstenite::Message::Text(handshake.into()))
            .await
            .map_err(|_| WsError::Closed)?;

        // Dropping `client` on timeout cancels the pumps.
        match handshake_rx.await {
            Ok(Ok(())) => {
                info!(url, "hub handshake complete");
                Ok(client)
            }
            Ok(Err(e)) => {
                client.close().await;
                Err(e)
            }
            Err(_) => Err(WsError::Closed),
        }
    }

    /// Invokes a hub method and waits for its completion.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, WsError> {
        if !self.is_live() {
            return Err(WsError::Closed);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let record = HubFrame::invocation(&id, target, arguments).to_record()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self
            .write_tx
            .send(tungstenite::Message::Text(record.into()))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(WsError::Closed);
        }

        let result = tokio::time::timeout(self.request_timeout, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(WsError::Hub(message)),
            Ok(Err(_)) => Err(WsError::Closed),
            Err(_) => Err(WsError::Timeout),
        }
    }

    /// Returns `true` between a successful handshake and the connection
    /// dropping or being closed.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        self.live.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}
