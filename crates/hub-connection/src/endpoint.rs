//! Hub endpoint resolution.
//!
//! The hub lives on the same host as the REST API: `https://host/api`
//! becomes `https://host/chathub`.

use kinship_protocol::constants::API_SUFFIX;

use crate::error::ConnectionError;
use crate::ws_client::WsError;

/// Derives the hub address from the REST API base address by stripping the
/// `/api` suffix and appending `hub_path`.
pub fn resolve_hub_url(api_base_url: &str, hub_path: &str) -> Result<String, ConnectionError> {
    let base = api_base_url.trim().trim_end_matches('/');

    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| ConnectionError::InvalidEndpoint(format!("missing scheme: {base}")))?;
    if !matches!(scheme, "http" | "https" | "ws" | "wss") {
        return Err(ConnectionError::InvalidEndpoint(format!(
            "unsupported scheme: {scheme}"
        )));
    }
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConnectionError::InvalidEndpoint(format!("missing host: {base}")));
    }

    let host_and_path = match rest.len().checked_sub(API_SUFFIX.len()) {
        Some(cut)
            if rest
                .get(cut..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(API_SUFFIX)) =>
        {
            &rest[..cut]
        }
        _ => rest,
    };

    let path = hub_path.trim_start_matches('/');
    Ok(format!("{scheme}://{host_and_path}/{path}"))
}

/// Maps an `http(s)` hub address to the `ws(s)` address used for dialing.
pub fn websocket_url(hub_url: &str) -> Result<String, WsError> {
    if let Some(rest) = hub_url.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = hub_url.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else if hub_url.starts_with("wss://") || hub_url.starts_with("ws://") {
        Ok(hub_url.to_string())
    } else {
        Err(WsError::InvalidUrl(hub_url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_api_suffix_and_appends_hub() {
        assert_eq!(
            resolve_hub_url("https://social.example.com/api", "/chathub").unwrap(),
            "https://social.example.com/chathub"
        );
    }

    #[test]
    fn tolerates_trailing_slash_and_port() {
        assert_eq!(
            resolve_hub_url("http://10.0.2.2:5000/api/", "chathub").unwrap(),
            "http://10.0.2.2:5000/chathub"
        );
    }

    #[test]
    fn base_without_api_suffix_is_kept() {
        assert_eq!(
            resolve_hub_url("https://abc.ngrok.app", "/chathub").unwrap(),
            "https://abc.ngrok.app/chathub"
        );
        assert_eq!(
            resolve_hub_url("https://host/v2/api", "/chathub").unwrap(),
            "https://host/v2/chathub"
        );
    }

    #[test]
    fn only_a_trailing_api_segment_is_stripped() {
        assert_eq!(
            resolve_hub_url("https://api.example.com", "/chathub").unwrap(),
            "https://api.example.com/chathub"
        );
    }

    #[test]
    fn rejects_malformed_bases() {
        assert!(matches!(
            resolve_hub_url("social.example.com/api", "/chathub"),
            Err(ConnectionError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            resolve_hub_url("ftp://host/api", "/chathub"),
            Err(ConnectionError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            resolve_hub_url("https:///api", "/chathub"),
            Err(ConnectionError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn websocket_scheme_mapping() {
        assert_eq!(websocket_url("https://h/chathub").unwrap(), "wss://h/chathub");
        assert_eq!(websocket_url("http://h/chathub").unwrap(), "ws://h/chathub");
        assert_eq!(websocket_url("ws://h/chathub").unwrap(), "ws://h/chathub");
        assert!(websocket_url("h/chathub").is_err());
    }
}
