use serde_json::{Value, json};

use crate::constants::outbound;

/// Closed set of operations the client invokes on the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    SendDirect {
        to_user_id: String,
        text: String,
        conversation_id: String,
    },
    SendGroup {
        group_id: String,
        text: String,
    },
    JoinGroup {
        group_id: String,
    },
    LeaveGroup {
        group_id: String,
    },
    SetTyping {
        to_user_id: String,
        is_typing: bool,
    },
}

impl OutboundAction {
    /// Hub method this action invokes.
    pub fn target(&self) -> &'static str {
        match self {
            Self::SendDirect { .. } => outbound::SEND_MESSAGE_TO_USER,
            Self::SendGroup { .. } => outbound::SEND_MESSAGE_TO_GROUP,
            Self::JoinGroup { .. } => outbound::JOIN_GROUP_CHAT,
            Self::LeaveGroup { .. } => outbound::LEAVE_GROUP_CHAT,
            Self::SetTyping { .. } => outbound::SEND_TYPING_INDICATOR,
        }
    }

    /// Positional arguments, in the order the hub method declares them.
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            Self::SendDirect {
                to_user_id,
                text,
                conversation_id,
            } => vec![json!(to_user_id), json!(text), json!(conversation_id)],
            Self::SendGroup { group_id, text } => vec![json!(group_id), json!(text)],
            Self::JoinGroup { group_id } | Self::LeaveGroup { group_id } => vec![json!(group_id)],
            Self::SetTyping {
                to_user_id,
                is_typing,
            } => vec![json!(to_user_id), json!(is_typing)],
        }
    }
}
