//! Events pushed by the hub to the client.
//!
//! The hub addresses the client by method name; [`InboundEvent::from_invocation`]
//! turns a `(target, arguments)` pair into a typed event. Presence arrives as
//! two separate methods and is folded into one [`EventKind::PresenceChanged`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::inbound;
use crate::error::ProtocolError;

/// A one-to-one chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    #[serde(deserialize_with = "id_string")]
    pub conversation_id: String,
    #[serde(deserialize_with = "id_string")]
    pub from_user_id: String,
    #[serde(deserialize_with = "id_string")]
    pub to_user_id: String,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(deserialize_with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "id_string")]
    pub message_id: String,
}

/// A message broadcast to a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    #[serde(deserialize_with = "id_string")]
    pub group_id: String,
    #[serde(alias = "fromUserId", deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(deserialize_with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "id_string")]
    pub message_id: String,
}

/// Closed set of events the hub may push.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DirectMessage(DirectMessage),
    GroupMessage(GroupMessage),
    /// The hub accepted a message sent by this client.
    SendAck { correlation_id: String },
    PresenceChanged { user_id: String, online: bool },
    TypingChanged { user_id: String, is_typing: bool },
}

/// Discriminant of [`InboundEvent`], used as the dispatcher key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DirectMessage,
    GroupMessage,
    SendAck,
    PresenceChanged,
    TypingChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::DirectMessage,
        EventKind::GroupMessage,
        EventKind::SendAck,
        EventKind::PresenceChanged,
        EventKind::TypingChanged,
    ];

    /// Maps a hub method name to the kind of event it produces.
    pub fn for_target(target: &str) -> Option<Self> {
        match target {
            inbound::RECEIVE_MESSAGE => Some(Self::DirectMessage),
            inbound::RECEIVE_GROUP_MESSAGE => Some(Self::GroupMessage),
            inbound::MESSAGE_SENT => Some(Self::SendAck),
            inbound::USER_CONNECTED | inbound::USER_DISCONNECTED => Some(Self::PresenceChanged),
            inbound::USER_TYPING => Some(Self::TypingChanged),
            _ => None,
        }
    }

    /// Hub method names that produce this kind.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            Self::DirectMessage => &[inbound::RECEIVE_MESSAGE],
            Self::GroupMessage => &[inbound::RECEIVE_GROUP_MESSAGE],
            Self::SendAck => &[inbound::MESSAGE_SENT],
            Self::PresenceChanged => &[inbound::USER_CONNECTED, inbound::USER_DISCONNECTED],
            Self::TypingChanged => &[inbound::USER_TYPING],
        }
    }
}

impl InboundEvent {
    /// Returns the dispatcher key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DirectMessage(_) => EventKind::DirectMessage,
            Self::GroupMessage(_) => EventKind::GroupMessage,
            Self::SendAck { .. } => EventKind::SendAck,
            Self::PresenceChanged { .. } => EventKind::PresenceChanged,
            Self::TypingChanged { .. } => EventKind::TypingChanged,
        }
    }

    /// Parses a hub push into a typed event.
    pub fn from_invocation(target: &str, arguments: &[Value]) -> Result<Self, ProtocolError> {
        match target {
            inbound::RECEIVE_MESSAGE => Ok(Self::DirectMessage(payload(target, arguments)?)),
            inbound::RECEIVE_GROUP_MESSAGE => Ok(Self::GroupMessage(payload(target, arguments)?)),
            inbound::MESSAGE_SENT => {
                let ack = arg(target, arguments, 0)?;
                let correlation_id = match ack {
                    Value::Object(obj) => obj
                        .get("messageId")
                        .or_else(|| obj.get("id"))
                        .and_then(id_from_value),
                    other => id_from_value(other),
                }
                .ok_or_else(|| bad_args(target, "acknowledgement carries no message id"))?;
                Ok(Self::SendAck { correlation_id })
            }
            inbound::USER_CONNECTED | inbound::USER_DISCONNECTED => Ok(Self::PresenceChanged {
                user_id: user_id_arg(target, arguments, 0)?,
                online: target == inbound::USER_CONNECTED,
            }),
            inbound::USER_TYPING => {
                let user_id = user_id_arg(target, arguments, 0)?;
                let is_typing = arg(target, arguments, 1)?
                    .as_bool()
                    .ok_or_else(|| bad_args(target, "isTyping is not a boolean"))?;
                Ok(Self::TypingChanged { user_id, is_typing })
            }
            other => Err(ProtocolError::UnknownTarget(other.to_string())),
        }
    }
}

/// Parses a timestamp sent by the hub.
///
/// Accepts RFC 3339 with an offset, or an offset-less ISO timestamp which is
/// taken to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn arg<'a>(target: &str, arguments: &'a [Value], index: usize) -> Result<&'a Value, ProtocolError> {
    arguments
        .get(index)
        .ok_or_else(|| bad_args(target, &format!("missing argument {index}")))
}

fn payload<T: for<'de> Deserialize<'de>>(
    target: &str,
    arguments: &[Value],
) -> Result<T, ProtocolError> {
    let value = arg(target, arguments, 0)?;
    T::deserialize(value).map_err(|e| bad_args(target, &e.to_string()))
}

fn user_id_arg(target: &str, arguments: &[Value], index: usize) -> Result<String, ProtocolError> {
    id_from_value(arg(target, arguments, index)?)
        .ok_or_else(|| bad_args(target, "user id is neither a string nor a number"))
}

fn bad_args(target: &str, reason: &str) -> ProtocolError {
    ProtocolError::BadArguments {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("expected a string or numeric id, got {value}"))
    })
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}
