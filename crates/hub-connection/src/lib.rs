//! Client-side connection manager for the Kinship chat hub.
//!
//! Owns the single real-time session: derives the hub endpoint from the REST
//! base address, connects with a bearer token, reconnects in the background
//! with exponential backoff after unexpected drops, routes hub pushes to
//! registered handlers and exposes the outbound chat actions.

pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod manager;
#[cfg(test)]
mod mock;
mod outbound;
mod pumps;
pub(crate) mod reconnection;
pub mod transport;
pub mod types;
pub mod ws_client;

pub use config::{ConfigError, HubConnectionConfig};
pub use dispatcher::{EventDispatcher, EventHandler};
pub use error::{ConnectionError, SendError};
pub use manager::ConnectionManager;
pub use transport::{HubConnector, HubLink, LinkCallbacks, WsConnector};
pub use types::{ConnectionEvent, ConnectionState, ReconnectConfig, SessionFlags, TokenSupplier};
pub use ws_client::{ClientOptions, WsClient, WsError};
