//! Scripted in-memory transport for state machine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::transport::{HubConnector, HubLink, LinkCallbacks};
use crate::ws_client::WsError;

/// Connector whose open attempts succeed or fail as scripted.
pub(crate) struct MockConnector {
    opens: AtomicUsize,
    urls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<String>>,
    script: Mutex<VecDeque<bool>>,
    refuse_by_default: AtomicBool,
    links_fail_invoke: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
    die_on_open: AtomicUsize,
    links: Mutex<Vec<Arc<MockLink>>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            urls: Mutex::default(),
            tokens: Mutex::default(),
            script: Mutex::default(),
            refuse_by_default: AtomicBool::new(false),
            links_fail_invoke: AtomicBool::new(false),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            die_on_open: AtomicUsize::new(0),
            links: Mutex::default(),
        }
    }
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Outcomes for the next open attempts, in order; `true` succeeds.
    pub(crate) fn script(&self, outcomes: &[bool]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    /// Outcome once the script is exhausted.
    pub(crate) fn refuse_by_default(&self, refuse: bool) {
        self.refuse_by_default.store(refuse, Ordering::SeqCst);
    }

    /// Links opened from now on fail every invocation.
    pub(crate) fn links_fail_invoke(&self, fail: bool) {
        self.links_fail_invoke.store(fail, Ordering::SeqCst);
    }

    /// Makes open attempts wait until [`release`](Self::release).
    pub(crate) fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// The next `count` successful opens hand back a link that has
    /// already reported its closure.
    pub(crate) fn die_on_open(&self, count: usize) {
        self.die_on_open.store(count, Ordering::SeqCst);
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub(crate) fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub(crate) fn last_link(&self) -> Arc<MockLink> {
        self.links
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no link opened")
    }
}

#[async_trait]
impl HubConnector for MockConnector {
    async fn open(
        &self,
        hub_url: &str,
        token: &str,
        callbacks: LinkCallbacks,
    ) -> Result<Arc<dyn HubLink>, WsError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(hub_url.to_string());
        self.tokens.lock().unwrap().push(token.to_string());

        if self.held.load(Ordering::SeqCst) {
            let _permit = self.gate.acquire().await.expect("gate closed");
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let ok = scripted.unwrap_or(!self.refuse_by_default.load(Ordering::SeqCst));
        if !ok {
            return Err(WsError::Hub("connection refused".into()));
        }

        let link = Arc::new(MockLink {
            live: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            fail_invoke: AtomicBool::new(self.links_fail_invoke.load(Ordering::SeqCst)),
            invocations: Mutex::new(Vec::new()),
            callbacks,
        });
        self.links.lock().unwrap().push(link.clone());

        let dies = self
            .die_on_open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dies {
            link.drop_connection();
        }
        Ok(link)
    }
}

/// A link driven by the test.
pub(crate) struct MockLink {
    live: AtomicBool,
    closed: AtomicBool,
    fail_invoke: AtomicBool,
    invocations: Mutex<Vec<(String, Vec<Value>)>>,
    callbacks: LinkCallbacks,
}

impl MockLink {
    /// Simulates the hub dropping the connection.
    pub(crate) fn drop_connection(&self) {
        self.live.store(false, Ordering::SeqCst);
        (self.callbacks.on_closed)(Some("connection reset".into()));
    }

    /// Simulates a hub push.
    pub(crate) fn push(&self, target: &str, arguments: Vec<Value>) {
        (self.callbacks.on_invocation)(target, &arguments);
    }

    pub(crate) fn transport_reconnecting(&self) {
        (self.callbacks.on_reconnecting)();
    }

    pub(crate) fn transport_reconnected(&self) {
        (self.callbacks.on_reconnected)();
    }

    pub(crate) fn fail_invoke(&self, fail: bool) {
        self.fail_invoke.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn invocations(&self) -> Vec<(String, Vec<Value>)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl HubLink for MockLink {
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, WsError> {
        if !self.is_live() {
            return Err(WsError::Closed);
        }
        if self.fail_invoke.load(Ordering::SeqCst) {
            return Err(WsError::Hub("invocation rejected".into()));
        }
        self.invocations
            .lock()
            .unwrap()
            .push((target.to_string(), arguments));
        Ok(Value::Null)
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}
