//! Wire types for the Kinship chat hub.
//!
//! JSON hub protocol frames, handshake records, and the typed inbound events
//! and outbound actions carried inside invocations.

pub mod actions;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod events;

// Re-export primary types for convenience.
pub use actions::OutboundAction;
pub use envelope::{HandshakeRequest, HandshakeResponse, HubFrame, split_records};
pub use error::ProtocolError;
pub use events::{DirectMessage, EventKind, GroupMessage, InboundEvent};
