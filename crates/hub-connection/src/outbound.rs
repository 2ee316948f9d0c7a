//! Outbound chat actions.
//!
//! A send while the session is down makes a single reconnect attempt with
//! the retained token and then a single retry; it never waits for the
//! background reconnect loop.

use serde_json::Value;
use tracing::{debug, info, warn};

use kinship_protocol::OutboundAction;

use crate::error::{ConnectionError, SendError};
use crate::manager::ConnectionManager;
use crate::types::ConnectionState;
use crate::ws_client::WsError;

impl ConnectionManager {
    /// Sends a direct message to `to_user_id` in `conversation_id`.
    pub async fn send_direct(
        &self,
        to_user_id: &str,
        text: &str,
        conversation_id: &str,
    ) -> Result<(), SendError> {
        self.invoke_action(OutboundAction::SendDirect {
            to_user_id: to_user_id.into(),
            text: text.into(),
            conversation_id: conversation_id.into(),
        })
        .await
        .map(drop)
    }

    /// Sends a message to every member of `group_id`.
    pub async fn send_group(&self, group_id: &str, text: &str) -> Result<(), SendError> {
        self.invoke_action(OutboundAction::SendGroup {
            group_id: group_id.into(),
            text: text.into(),
        })
        .await
        .map(drop)
    }

    pub async fn join_group(&self, group_id: &str) -> Result<(), SendError> {
        self.invoke_action(OutboundAction::JoinGroup {
            group_id: group_id.into(),
        })
        .await
        .map(drop)
    }

    pub async fn leave_group(&self, group_id: &str) -> Result<(), SendError> {
        self.invoke_action(OutboundAction::LeaveGroup {
            group_id: group_id.into(),
        })
        .await
        .map(drop)
    }

    /// Tells `to_user_id` whether the local user is typing.
    pub async fn set_typing(&self, to_user_id: &str, is_typing: bool) -> Result<(), SendError> {
        self.invoke_action(OutboundAction::SetTyping {
            to_user_id: to_user_id.into(),
            is_typing,
        })
        .await
        .map(drop)
    }

    /// Invokes `action` on the hub and returns the completion result.
    ///
    /// - Connected: invoked directly; a failure is [`SendError::InvokeFailed`]
    ///   and leaves the state untouched.
    /// - Down after a session existed, with a retained token: one connect
    ///   attempt, then one invocation.
    /// - Otherwise: [`SendError::NotConnected`] without touching the network.
    pub async fn invoke_action(&self, action: OutboundAction) -> Result<Value, SendError> {
        let target = action.target();
        let (link, token) = {
            let s = self.inner.session();
            let link = match s.state {
                ConnectionState::Connected => s.link.clone(),
                _ => None,
            };
            let token = if s.had_ever_connected {
                s.last_known_token.clone()
            } else {
                None
            };
            (link, token)
        };

        if let Some(link) = link {
            return link
                .invoke(target, action.arguments())
                .await
                .map_err(SendError::InvokeFailed);
        }

        let Some(token) = token else {
            debug!(target, "not connected, dropping action");
            return Err(SendError::NotConnected);
        };

        info!(target, "session down, reconnecting before send");
        if let Err(e) = self.inner.connect(token).await {
            warn!(target, error = %e, "reconnect before send failed");
            return Err(SendError::InvokeFailed(into_ws_error(e)));
        }

        let link = {
            let s = self.inner.session();
            match s.state {
                ConnectionState::Connected => s.link.clone(),
                _ => None,
            }
        };
        let Some(link) = link else {
            warn!(target, "still not connected after reconnect attempt");
            return Err(SendError::InvokeFailed(WsError::Closed));
        };

        link.invoke(target, action.arguments())
            .await
            .map_err(SendError::InvokeFailed)
    }
}

fn into_ws_error(err: ConnectionError) -> WsError {
    match err {
        ConnectionError::Transport(e) => e,
        ConnectionError::InvalidEndpoint(url) => WsError::InvalidUrl(url),
        ConnectionError::MissingToken => WsError::InvalidToken,
        ConnectionError::Aborted => WsError::Closed,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::HubConnectionConfig;
    use crate::mock::MockConnector;
    use crate::types::ReconnectConfig;

    fn manager(connector: &Arc<MockConnector>) -> ConnectionManager {
        ConnectionManager::with_connector(
            HubConnectionConfig {
                api_base_url: "https://social.example.com/api".into(),
                reconnect: ReconnectConfig {
                    max_jitter: Duration::ZERO,
                    ..ReconnectConfig::default()
                },
                ..HubConnectionConfig::default()
            },
            connector.clone(),
        )
    }

    #[tokio::test]
    async fn send_without_any_session_is_not_connected() {
        let connector = MockConnector::new();
        let mgr = manager(&connector);

        let err = mgr.send_direct("bob", "hi", "c-1").await.unwrap_err();
        assert!(matches!(err, SendError::NotConnected));
        assert_eq!(connector.opens(), 0);
    }

    #[tokio::test]
    async fn connected_send_invokes_the_hub_method() {
        let connector = MockConnector::new();
        let mgr = manager(&connector);
        mgr.connect("tok").await.unwrap();

        mgr.send_direct("bob", "hi", "c-1").await.unwrap();
        mgr.send_group("g-9", "hello all").await.unwrap();
        mgr.join_group("g-9").await.unwrap();
        mgr.leave_group("g-9").await.unwrap();
        mgr.set_typing("bob", true).await.unwrap();

        assert_eq!(
            connector.last_link().invocations(),
            [
                (
                    "SendMessageToUser".to_string(),
                    vec![json!("bob"), json!("hi"), json!("c-1")]
                ),
                (
                    "SendMessageToGroup".to_string(),
                    vec![json!("g-9"), json!("hello all")]
                ),
                ("JoinGroupChat".to_string(), vec![json!("g-9")]),
                ("LeaveGroupChat".to_string(), vec![json!("g-9")]),
                (
                    "SendTypingIndicator".to_string(),
                    vec![json!("bob"), json!(true)]
                ),
            ]
        );
    }

    #[tokio::test]
    async fn failed_invoke_on_live_link_keeps_state() {
        let connector = MockConnector::new();
        let mgr = manager(&connector);
        mgr.connect("tok").await.unwrap();
        connector.last_link().fail_invoke(true);

        let err = mgr.send_group("g", "x").await.unwrap_err();
        assert!(matches!(err, SendError::InvokeFailed(WsError::Hub(_))));
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_after_drop_reconnects_once_then_delivers() {
        let connector = MockConnector::new();
        let mgr = manager(&connector);
        mgr.connect("tok").await.unwrap();
        connector.last_link().drop_connection();

        mgr.send_direct("bob", "back", "c-1").await.unwrap();

        assert_eq!(connector.opens(), 2);
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert!(!mgr.flags().reconnect_in_progress);
        assert_eq!(connector.last_link().invocations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_after_drop_fails_when_reconnect_fails() {
        let connector = MockConnector::new();
        let mgr = manager(&connector);
        mgr.connect("tok").await.unwrap();
        connector.refuse_by_default(true);
        connector.last_link().drop_connection();

        let err = mgr.send_direct("bob", "lost", "c-1").await.unwrap_err();

        assert!(matches!(err, SendError::InvokeFailed(_)));
        assert_eq!(connector.opens(), 2);
        assert!(mgr.flags().reconnect_in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn send_after_drop_fails_when_retry_fails() {
        let connector = MockConnector::new();
        let mgr = manager(&connector);
        mgr.connect("tok").await.unwrap();
        connector.links_fail_invoke(true);
        connector.last_link().drop_connection();

        let err = mgr.join_group("g").await.unwrap_err();

        assert!(matches!(err, SendError::InvokeFailed(WsError::Hub(_))));
        assert_eq!(connector.opens(), 2);
        assert_eq!(mgr.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn send_after_disconnect_is_not_connected() {
        let connector = MockConnector::new();
        let mgr = manager(&connector);
        mgr.connect("tok").await.unwrap();
        mgr.disconnect().await;

        let err = mgr.set_typing("bob", false).await.unwrap_err();
        assert!(matches!(err, SendError::NotConnected));
        assert_eq!(connector.opens(), 1);
    }

    #[test]
    fn connect_errors_map_onto_transport_errors() {
        assert!(matches!(
            into_ws_error(ConnectionError::Aborted),
            WsError::Closed
        ));
        assert!(matches!(
            into_ws_error(ConnectionError::Transport(WsError::Timeout)),
            WsError::Timeout
        ));
    }
}
