//! Terminal rendering of hub pushes and session events.

use kinship_hub_connection::{ConnectionEvent, ConnectionState};
use kinship_protocol::InboundEvent;

pub fn inbound(event: &InboundEvent) -> String {
    match event {
        InboundEvent::DirectMessage(m) => format!(
            "[{}] {} -> {} ({}): {}",
            m.timestamp.format("%H:%M:%S"),
            m.from_user_id,
            m.to_user_id,
            m.conversation_id,
            m.text
        ),
        InboundEvent::GroupMessage(m) => format!(
            "[{}] #{} {}: {}",
            m.timestamp.format("%H:%M:%S"),
            m.group_id,
            m.user_id,
            m.text
        ),
        InboundEvent::SendAck { correlation_id } => format!("* delivered {correlation_id}"),
        InboundEvent::PresenceChanged { user_id, online } => {
            let presence = if *online { "online" } else { "offline" };
            format!("* {user_id} is {presence}")
        }
        InboundEvent::TypingChanged { user_id, is_typing } => {
            if *is_typing {
                format!("* {user_id} is typing...")
            } else {
                format!("* {user_id} stopped typing")
            }
        }
    }
}

pub fn session(event: &ConnectionEvent) -> String {
    match event {
        ConnectionEvent::StateChanged(ConnectionState::Connected) => "-- connected".into(),
        ConnectionEvent::StateChanged(ConnectionState::Disconnected) => "-- disconnected".into(),
        ConnectionEvent::StateChanged(ConnectionState::Connecting) => "-- connecting".into(),
        ConnectionEvent::StateChanged(ConnectionState::Reconnecting { attempt }) => {
            format!("-- reconnecting (attempt {attempt})")
        }
        ConnectionEvent::Reconnecting {
            attempt,
            next_retry,
        } => format!(
            "-- retry {attempt} in {:.1}s",
            next_retry.as_secs_f64()
        ),
        ConnectionEvent::Reconnected => "-- reconnected".into(),
    }
}
