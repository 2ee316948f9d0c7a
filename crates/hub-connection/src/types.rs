//! Public types for the hub connection manager.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Connection state of the hub session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// Handshake in progress (explicit connect or a reconnect attempt).
    Connecting,
    /// Connected and handshaken.
    Connected,
    /// Connection lost; the reconnect loop is waiting before `attempt`.
    Reconnecting { attempt: u32 },
}

/// Snapshot of the session bookkeeping flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionFlags {
    /// Set by the first successful connect; never cleared.
    pub had_ever_connected: bool,
    /// Set by `disconnect()`; suppresses background reconnection.
    pub closed_by_caller: bool,
    /// A reconnect loop is currently running.
    pub reconnect_in_progress: bool,
    /// A token from the last connect attempt is retained.
    pub has_token: bool,
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// The reconnect loop scheduled another attempt.
    Reconnecting { attempt: u32, next_retry: Duration },
    /// A dropped session was re-established in the background.
    Reconnected,
}

/// Source of the bearer token presented when connecting.
///
/// Implemented for closures, so `|| std::env::var("TOKEN").ok()` works.
pub trait TokenSupplier: Send + Sync {
    /// Returns the current token, or `None` if the user is signed out.
    fn token(&self) -> Option<String>;
}

impl<F> TokenSupplier for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Base of the exponential backoff.
    #[serde(rename = "initial_delay_ms", with = "crate::config::millis")]
    pub initial_delay: Duration,
    /// Backoff cap, before jitter.
    #[serde(rename = "max_delay_ms", with = "crate::config::millis")]
    pub max_delay: Duration,
    /// Attempt numbers above this no longer grow the delay.
    pub max_exponent: u32,
    /// Upper bound (exclusive) of the uniform jitter added to every delay.
    #[serde(rename = "max_jitter_ms", with = "crate::config::millis")]
    pub max_jitter: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(60_000),
            max_exponent: 6,
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl ReconnectConfig {
    /// Delay before attempt `attempt` (1-based), without jitter:
    /// `min(max_delay, initial_delay * 2^min(attempt, max_exponent))`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(self.max_exponent).min(31);
        self.initial_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before attempt `attempt`, with uniform jitter in
    /// `[0, max_jitter)` to desynchronise clients after a shared outage.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}
