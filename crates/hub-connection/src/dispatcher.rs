//! Inbound event dispatch.
//!
//! One active handler per [`EventKind`]: registering a second handler for
//! the same kind replaces the first. Events with no registered handler are
//! dropped.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, trace, warn};

use kinship_protocol::{EventKind, InboundEvent, ProtocolError};

/// Handler invoked synchronously for every event of its kind.
pub type EventHandler = Arc<dyn Fn(InboundEvent) + Send + Sync>;

/// Registry mapping each inbound event kind to a single handler.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventKind, EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` as the handler for `kind`.
    ///
    /// Returns `true` if a previously registered handler was replaced.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> bool
    where
        F: Fn(InboundEvent) + Send + Sync + 'static,
    {
        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(handler))
            .is_some();
        if replaced {
            debug!(?kind, "replaced event handler");
        }
        replaced
    }

    /// Removes the handler for `kind`. Returns `true` if one was registered.
    pub fn off(&self, kind: EventKind) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
            .is_some()
    }

    /// Returns `true` if a handler is registered for `kind`.
    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handler_for(kind).is_some()
    }

    /// Invokes the handler registered for the event's kind.
    ///
    /// Returns `false` if the event was dropped for lack of a handler.
    pub fn dispatch(&self, event: InboundEvent) -> bool {
        let kind = event.kind();
        // Clone out of the lock so a handler may (re)register handlers.
        match self.handler_for(kind) {
            Some(handler) => {
                handler(event);
                true
            }
            None => {
                trace!(?kind, "no handler registered, dropping event");
                false
            }
        }
    }

    /// Parses a raw hub push and dispatches it.
    ///
    /// Unknown methods and malformed payloads are logged and dropped; they
    /// never affect the connection.
    pub fn dispatch_invocation(&self, target: &str, arguments: &[Value]) -> bool {
        let Some(kind) = EventKind::for_target(target) else {
            trace!(target, "ignoring unknown hub method");
            return false;
        };
        if !self.has_handler(kind) {
            trace!(target, "no handler registered, dropping push");
            return false;
        }
        match InboundEvent::from_invocation(target, arguments) {
            Ok(event) => self.dispatch(event),
            Err(ProtocolError::UnknownTarget(_)) => false,
            Err(e) => {
                warn!(target, error = %e, "dropping malformed hub push");
                false
            }
        }
    }

    fn handler_for(&self, kind: EventKind) -> Option<EventHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }
}
