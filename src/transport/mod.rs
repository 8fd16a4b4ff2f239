use bytes::Bytes;
use std::sync::Arc;

pub mod memory;

/// Callback registered with a raw transport. Receives the origin event and the opaque payload.
pub type RawListener<E> = Arc<dyn Fn(&E, &Bytes) + Send + Sync>;

/// Channel-keyed pub/sub primitive provided by the host environment.
pub trait RawTransport: Send + Sync {
    /// Origin information delivered alongside every raw payload.
    type Event: Send + Sync + 'static;

    /// Register a raw listener for a channel
    fn on(&self, channel: &str, listener: RawListener<Self::Event>);

    /// Remove a raw listener previously passed to `on`
    fn off(&self, channel: &str, listener: &RawListener<Self::Event>);

    /// Get transport name/identifier
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Client side of the raw transport: its single destination (the host) always exists.
pub trait ClientTransport: RawTransport {
    /// Push a raw payload to the host
    fn send(&self, channel: &str, payload: Bytes);
}

/// A destination the host can push messages to, e.g. a client window.
pub trait Target: Send + Sync + 'static {
    /// Push a raw payload to this destination
    fn push(&self, channel: &str, payload: Bytes);
}

/// Lets the host test whether an inbound event came from a given destination.
pub trait Origin<T: ?Sized> {
    fn originates_from(&self, target: &T) -> bool;
}

/// Identity comparison for listeners: two `Arc`s are the same listener iff they share an allocation.
pub fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl<T: RawTransport + ?Sized> RawTransport for Arc<T> {
    type Event = T::Event;

    fn on(&self, channel: &str, listener: RawListener<Self::Event>) {
        (**self).on(channel, listener)
    }

    fn off(&self, channel: &str, listener: &RawListener<Self::Event>) {
        (**self).off(channel, listener)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: ClientTransport + ?Sized> ClientTransport for Arc<T> {
    fn send(&self, channel: &str, payload: Bytes) {
        (**self).send(channel, payload)
    }
}

impl<T: Target + ?Sized> Target for Arc<T> {
    fn push(&self, channel: &str, payload: Bytes) {
        (**self).push(channel, payload)
    }
}

impl<T: Target + ?Sized> Target for Box<T> {
    fn push(&self, channel: &str, payload: Bytes) {
        (**self).push(channel, payload)
    }
}
