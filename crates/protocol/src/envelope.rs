use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{HUB_PROTOCOL, HUB_PROTOCOL_VERSION, RECORD_SEPARATOR};
use crate::error::ProtocolError;

/// Numeric `type` tags of the JSON hub protocol.
pub mod kind {
    pub const INVOCATION: u8 = 1;
    pub const STREAM_ITEM: u8 = 2;
    pub const COMPLETION: u8 = 3;
    pub const STREAM_INVOCATION: u8 = 4;
    pub const CANCEL_INVOCATION: u8 = 5;
    pub const PING: u8 = 6;
    pub const CLOSE: u8 = 7;
}

/// A single record exchanged with the hub after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    /// A method call. Inbound pushes carry no invocation id; outbound calls
    /// that expect a completion do.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    /// Result of an earlier invocation.
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    /// Keepalive.
    Ping,
    /// The peer is closing the connection.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// A frame kind this client does not act on (stream items, cancellations).
    Other(u8),
}

/// Wire shape shared by every frame kind; absent fields are omitted.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

impl HubFrame {
    /// Builds an outbound invocation that expects a completion.
    pub fn invocation(
        invocation_id: impl Into<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self::Invocation {
            invocation_id: Some(invocation_id.into()),
            target: target.into(),
            arguments,
        }
    }

    /// Parses one record (without its separator).
    pub fn parse(record: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(record)?;
        let frame = match raw.kind {
            kind::INVOCATION => Self::Invocation {
                invocation_id: raw.invocation_id,
                target: raw.target.ok_or(ProtocolError::MissingField {
                    kind: raw.kind,
                    field: "target",
                })?,
                arguments: raw.arguments.unwrap_or_default(),
            },
            kind::COMPLETION => Self::Completion {
                invocation_id: raw.invocation_id.ok_or(ProtocolError::MissingField {
                    kind: raw.kind,
                    field: "invocationId",
                })?,
                result: raw.result,
                error: raw.error,
            },
            kind::PING => Self::Ping,
            kind::CLOSE => Self::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            other => Self::Other(other),
        };
        Ok(frame)
    }

    /// Serializes the frame as a separator-terminated record.
    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        let raw = match self {
            Self::Invocation {
                invocation_id,
                target,
                arguments,
            } => RawFrame {
                kind: kind::INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                ..Default::default()
            },
            Self::Completion {
                invocation_id,
                result,
                error,
            } => RawFrame {
                kind: kind::COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                result: result.clone(),
                error: error.clone(),
                ..Default::default()
            },
            Self::Ping => RawFrame {
                kind: kind::PING,
                ..Default::default()
            },
            Self::Close {
                error,
                allow_reconnect,
            } => RawFrame {
                kind: kind::CLOSE,
                error: error.clone(),
                allow_reconnect: Some(*allow_reconnect),
                ..Default::default()
            },
            Self::Other(k) => RawFrame {
                kind: *k,
                ..Default::default()
            },
        };
        let mut json = serde_json::to_string(&raw)?;
        json.push(RECORD_SEPARATOR);
        Ok(json)
    }
}

/// Splits a text frame into its records, dropping empty trailing pieces.
pub fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

/// First record sent by the client after the socket opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: HUB_PROTOCOL.to_string(),
            version: HUB_PROTOCOL_VERSION,
        }
    }
}

impl HandshakeRequest {
    /// Serializes the request as a separator-terminated record.
    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push(RECORD_SEPARATOR);
        Ok(json)
    }
}

/// First record sent by the hub: empty on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeResponse {
    /// Parses a handshake record and turns a rejection into an error.
    pub fn check(record: &str) -> Result<(), ProtocolError> {
        let resp: HandshakeResponse = serde_json::from_str(record)?;
        match resp.error {
            Some(reason) => Err(ProtocolError::HandshakeRejected(reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_push_invocation_without_id() {
        let frame = HubFrame::parse(
            r#"{"type":1,"target":"UserTyping","arguments":["u-1",true]}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            HubFrame::Invocation {
                invocation_id: None,
                target: "UserTyping".into(),
                arguments: vec![json!("u-1"), json!(true)],
            }
        );
    }

    #[test]
    fn parse_completion_with_error() {
        let frame =
            HubFrame::parse(r#"{"type":3,"invocationId":"7","error":"not a member"}"#).unwrap();
        assert_eq!(
            frame,
            HubFrame::Completion {
                invocation_id: "7".into(),
                result: None,
                error: Some("not a member".into()),
            }
        );
    }

    #[test]
    fn parse_completion_requires_id() {
        let err = HubFrame::parse(r#"{"type":3,"result":1}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingField {
                field: "invocationId",
                ..
            }
        ));
    }

    #[test]
    fn parse_close_defaults_allow_reconnect() {
        let frame = HubFrame::parse(r#"{"type":7,"error":"server shutting down"}"#).unwrap();
        assert_eq!(
            frame,
            HubFrame::Close {
                error: Some("server shutting down".into()),
                allow_reconnect: false,
            }
        );
    }

    #[test]
    fn parse_ignores_stream_items() {
        let frame = HubFrame::parse(r#"{"type":2,"invocationId":"1","item":5}"#).unwrap();
        assert_eq!(frame, HubFrame::Other(kind::STREAM_ITEM));
    }

    #[test]
    fn invocation_record_shape() {
        let record = HubFrame::invocation("42", "JoinGroupChat", vec![json!("g-9")])
            .to_record()
            .unwrap();
        assert!(record.ends_with(RECORD_SEPARATOR));
        let value: Value = serde_json::from_str(record.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(
            value,
            json!({"type": 1, "invocationId": "42", "target": "JoinGroupChat", "arguments": ["g-9"]})
        );
    }

    #[test]
    fn ping_record_is_minimal() {
        assert_eq!(HubFrame::Ping.to_record().unwrap(), "{\"type\":6}\u{1e}");
    }

    #[test]
    fn split_multiple_records_in_one_frame() {
        let text = "{\"type\":6}\u{1e}{\"type\":6}\u{1e}";
        assert_eq!(split_records(text).count(), 2);
        assert_eq!(split_records("").count(), 0);
    }

    #[test]
    fn handshake_request_record() {
        let record = HandshakeRequest::default().to_record().unwrap();
        assert_eq!(record, "{\"protocol\":\"json\",\"version\":1}\u{1e}");
    }

    #[test]
    fn handshake_response_check() {
        assert!(HandshakeResponse::check("{}").is_ok());
        let err = HandshakeResponse::check(r#"{"error":"unsupported protocol"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::HandshakeRejected(r) if r == "unsupported protocol"));
    }
}
