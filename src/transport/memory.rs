//! In-process raw transport for tests and demos.
//!
//! Keeps two independent channel-keyed listener tables: one for what the host
//! receives and one for what clients receive. Delivery is synchronous on the
//! caller's thread and iterates a snapshot of the table.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::transport::{ClientTransport, Origin, RawListener, RawTransport, Target, same_listener};

pub type WindowId = u64;

/// Origin event delivered with every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryEvent {
    /// Window that sent the payload; `None` when the host pushed it.
    pub sender: Option<WindowId>,
}

impl MemoryEvent {
    pub fn from_window(id: WindowId) -> Self {
        Self { sender: Some(id) }
    }

    pub fn from_host() -> Self {
        Self { sender: None }
    }
}

impl Origin<MemoryWindow> for MemoryEvent {
    fn originates_from(&self, target: &MemoryWindow) -> bool {
        self.sender == Some(target.id)
    }
}

#[derive(Default)]
struct ListenerTable {
    listeners: Mutex<HashMap<String, Vec<RawListener<MemoryEvent>>>>,
}

impl ListenerTable {
    fn on(&self, channel: &str, listener: RawListener<MemoryEvent>) {
        self.listeners
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push(listener);
    }

    fn off(&self, channel: &str, listener: &RawListener<MemoryEvent>) {
        let mut listeners = self.listeners.lock();
        if let Some(list) = listeners.get_mut(channel) {
            if let Some(index) = list.iter().position(|l| same_listener(l, listener)) {
                list.remove(index);
            }
            if list.is_empty() {
                listeners.remove(channel);
            }
        }
    }

    fn emit(&self, channel: &str, event: &MemoryEvent, payload: &Bytes) -> usize {
        let snapshot = match self.listeners.lock().get(channel) {
            Some(list) => list.clone(),
            None => return 0,
        };
        for listener in &snapshot {
            listener(event, payload);
        }
        snapshot.len()
    }

    fn count(&self, channel: &str) -> usize {
        self.listeners.lock().get(channel).map_or(0, Vec::len)
    }
}

#[derive(Default)]
struct Shared {
    to_host: ListenerTable,
    to_client: ListenerTable,
}

/// Cloneable handle to an in-memory transport.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw transport for a host multiplexer.
    pub fn host_end(&self) -> MemoryHostEnd {
        MemoryHostEnd {
            shared: self.shared.clone(),
        }
    }

    /// Raw transport for a client multiplexer living in window `window`.
    pub fn client_end(&self, window: WindowId) -> MemoryClientEnd {
        MemoryClientEnd {
            shared: self.shared.clone(),
            window,
            name: format!("memory-client-{}", window),
        }
    }

    /// Destination handle the host can push to.
    pub fn window(&self, id: WindowId) -> MemoryWindow {
        MemoryWindow {
            id,
            shared: self.shared.clone(),
            pushed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Deliver a payload to the host's raw listeners as if `origin` sent it.
    /// Returns the number of raw listeners invoked.
    pub fn emit_to_host(&self, origin: MemoryEvent, channel: &str, payload: Bytes) -> usize {
        self.shared.to_host.emit(channel, &origin, &payload)
    }

    /// Deliver a payload to the clients' raw listeners as if the host pushed it.
    pub fn emit_to_client(&self, channel: &str, payload: Bytes) -> usize {
        self.shared
            .to_client
            .emit(channel, &MemoryEvent::from_host(), &payload)
    }

    pub fn host_listener_count(&self, channel: &str) -> usize {
        self.shared.to_host.count(channel)
    }

    pub fn client_listener_count(&self, channel: &str) -> usize {
        self.shared.to_client.count(channel)
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport").finish_non_exhaustive()
    }
}

/// Host side of a [`MemoryTransport`].
pub struct MemoryHostEnd {
    shared: Arc<Shared>,
}

impl RawTransport for MemoryHostEnd {
    type Event = MemoryEvent;

    fn on(&self, channel: &str, listener: RawListener<MemoryEvent>) {
        self.shared.to_host.on(channel, listener);
    }

    fn off(&self, channel: &str, listener: &RawListener<MemoryEvent>) {
        self.shared.to_host.off(channel, listener);
    }

    fn name(&self) -> &str {
        "memory-host"
    }
}

/// Client side of a [`MemoryTransport`], bound to one window.
pub struct MemoryClientEnd {
    shared: Arc<Shared>,
    window: WindowId,
    name: String,
}

impl MemoryClientEnd {
    pub fn window(&self) -> WindowId {
        self.window
    }
}

impl RawTransport for MemoryClientEnd {
    type Event = MemoryEvent;

    fn on(&self, channel: &str, listener: RawListener<MemoryEvent>) {
        self.shared.to_client.on(channel, listener);
    }

    fn off(&self, channel: &str, listener: &RawListener<MemoryEvent>) {
        self.shared.to_client.off(channel, listener);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ClientTransport for MemoryClientEnd {
    fn send(&self, channel: &str, payload: Bytes) {
        self.shared
            .to_host
            .emit(channel, &MemoryEvent::from_window(self.window), &payload);
    }
}

/// A window the host can push to. Records every push, then delivers it to the client table.
#[derive(Clone)]
pub struct MemoryWindow {
    id: WindowId,
    shared: Arc<Shared>,
    pushed: Arc<Mutex<Vec<(String, Bytes)>>>,
}

impl MemoryWindow {
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Every `(channel, payload)` pushed to this window, in push order.
    pub fn pushes(&self) -> Vec<(String, Bytes)> {
        self.pushed.lock().clone()
    }

    pub fn push_count(&self) -> usize {
        self.pushed.lock().len()
    }
}

impl Target for MemoryWindow {
    fn push(&self, channel: &str, payload: Bytes) {
        self.pushed.lock().push((channel.to_string(), payload.clone()));
        self.shared
            .to_client
            .emit(channel, &MemoryEvent::from_host(), &payload);
    }
}

impl std::fmt::Debug for MemoryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWindow").field("id", &self.id).finish()
    }
}
