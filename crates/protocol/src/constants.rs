use std::time::Duration;

/// Terminates every JSON record on the hub wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Name of the hub protocol negotiated in the handshake.
pub const HUB_PROTOCOL: &str = "json";

/// Version of the hub protocol negotiated in the handshake.
pub const HUB_PROTOCOL_VERSION: u32 = 1;

/// Path segment appended to the REST host to reach the chat hub.
pub const HUB_PATH: &str = "/chathub";

/// Path suffix of the REST API base address.
pub const API_SUFFIX: &str = "/api";

/// Header attached to the upgrade request so tunnelling proxies skip their
/// interstitial warning page.
pub const PROXY_BYPASS_HEADER: (&str, &str) = ("ngrok-skip-browser-warning", "true");

/// Time allowed for the hub to answer the protocol handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for an invocation to receive its completion.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the client sends a ping record.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Read deadline: if *nothing* arrives within this window the connection is
/// considered dead. Must be comfortably larger than the hub's own keepalive.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum accepted text frame size in bytes (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Hub-to-client method names.
pub mod inbound {
    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    pub const RECEIVE_GROUP_MESSAGE: &str = "ReceiveGroupMessage";
    pub const MESSAGE_SENT: &str = "MessageSent";
    pub const USER_CONNECTED: &str = "UserConnected";
    pub const USER_DISCONNECTED: &str = "UserDisconnected";
    pub const USER_TYPING: &str = "UserTyping";
}

/// Client-to-hub method names.
pub mod outbound {
    pub const SEND_MESSAGE_TO_USER: &str = "SendMessageToUser";
    pub const SEND_MESSAGE_TO_GROUP: &str = "SendMessageToGroup";
    pub const JOIN_GROUP_CHAT: &str = "JoinGroupChat";
    pub const LEAVE_GROUP_CHAT: &str = "LeaveGroupChat";
    pub const SEND_TYPING_INDICATOR: &str = "SendTypingIndicator";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_is_shorter_than_server_timeout() {
        assert!(KEEPALIVE_INTERVAL < SERVER_TIMEOUT);
    }

    #[test]
    fn record_separator_is_ascii_rs() {
        assert_eq!(RECORD_SEPARATOR as u32, 0x1e);
    }
}
