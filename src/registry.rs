//! Per-channel listener aggregation shared by both multiplexers.
//!
//! Every channel with at least one logical listener owns exactly one raw
//! transport listener. The raw listener decodes the payload once and fans it
//! out to a snapshot of the channel's logical listeners, so listeners may call
//! back into the multiplexer (including `off`) while being dispatched.

use bytes::Bytes;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use crate::channel::Channel;
use crate::codec::Codec;
use crate::error::{IpcError, Result};
use crate::stats::MuxStats;
use crate::subscription::Unsubscribe;
use crate::transport::{RawListener, RawTransport, same_listener};

/// Logical listener: receives the decoded payload and the raw origin event.
pub type Listener<P, E> = Arc<dyn Fn(&P, &E) + Send + Sync>;

/// Wrap a closure as a [`Listener`]. Keep the returned `Arc` to remove it later with `off`.
pub fn listener<P, E, F>(f: F) -> Listener<P, E>
where
    F: Fn(&P, &E) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Consulted before decoding; returning `false` drops the event.
pub(crate) type Gate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

type ListenerList<P, E> = Arc<Mutex<Vec<Listener<P, E>>>>;

struct Slot<E> {
    raw: RawListener<E>,
    // Holds a `ListenerList<Ch::Payload, E>` for the channel type that created the slot.
    listeners: Box<dyn Any + Send + Sync>,
    count: usize,
}

pub(crate) struct ListenerRegistry<T: RawTransport, C: Codec> {
    transport: T,
    codec: Arc<C>,
    gate: Gate<T::Event>,
    slots: Mutex<HashMap<&'static str, Slot<T::Event>>>,
    stats: Arc<Mutex<MuxStats>>,
    name: String,
}

impl<T, C> ListenerRegistry<T, C>
where
    T: RawTransport + 'static,
    C: Codec,
{
    pub(crate) fn new(transport: T, codec: C, gate: Gate<T::Event>, name: String) -> Self {
        Self {
            transport,
            codec: Arc::new(codec),
            gate,
            slots: Mutex::new(HashMap::new()),
            stats: Arc::new(Mutex::new(MuxStats::default())),
            name,
        }
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn codec(&self) -> &C {
        &self.codec
    }

    pub(crate) fn stats(&self) -> &Arc<Mutex<MuxStats>> {
        &self.stats
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Register a logical listener, creating the channel's raw subscription if this is the first one.
    pub(crate) fn on<Ch: Channel>(
        self: &Arc<Self>,
        listener: Listener<Ch::Payload, T::Event>,
    ) -> Result<Unsubscribe> {
        let mut slots = self.slots.lock();

        match slots.get_mut(Ch::NAME) {
            Some(slot) => {
                let list = slot
                    .listeners
                    .downcast_ref::<ListenerList<Ch::Payload, T::Event>>()
                    .ok_or(IpcError::ChannelTypeMismatch { channel: Ch::NAME })?;
                list.lock().push(listener.clone());
                slot.count += 1;
                trace!(mux = %self.name, channel = Ch::NAME, listeners = slot.count, "listener added");
            }
            None => {
                let list: ListenerList<Ch::Payload, T::Event> =
                    Arc::new(Mutex::new(vec![listener.clone()]));
                let raw = self.aggregate::<Ch>(list.clone());
                self.transport.on(Ch::NAME, raw.clone());
                slots.insert(
                    Ch::NAME,
                    Slot {
                        raw,
                        listeners: Box::new(list),
                        count: 1,
                    },
                );
                debug!(
                    mux = %self.name,
                    transport = self.transport.name(),
                    channel = Ch::NAME,
                    "raw subscription created"
                );
            }
        }
        drop(slots);

        let registry: Weak<Self> = Arc::downgrade(self);
        Ok(Unsubscribe::new(Ch::NAME, move || {
            if let Some(registry) = registry.upgrade() {
                registry.off::<Ch>(&listener);
            }
        }))
    }

    /// Remove one registration of `listener`. Tears down the raw subscription with the last listener.
    pub(crate) fn off<Ch: Channel>(&self, listener: &Listener<Ch::Payload, T::Event>) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(Ch::NAME) else {
            return;
        };
        let Some(list) = slot
            .listeners
            .downcast_ref::<ListenerList<Ch::Payload, T::Event>>()
        else {
            return;
        };

        let removed = {
            let mut list = list.lock();
            match list.iter().position(|l| same_listener(l, listener)) {
                Some(index) => {
                    list.remove(index);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return;
        }

        slot.count -= 1;
        trace!(mux = %self.name, channel = Ch::NAME, listeners = slot.count, "listener removed");

        if slot.count == 0 {
            if let Some(slot) = slots.remove(Ch::NAME) {
                self.transport.off(Ch::NAME, &slot.raw);
                debug!(
                    mux = %self.name,
                    transport = self.transport.name(),
                    channel = Ch::NAME,
                    "raw subscription removed"
                );
            }
        }
    }

    pub(crate) fn listener_count(&self, channel: &str) -> usize {
        self.slots.lock().get(channel).map_or(0, |slot| slot.count)
    }

    pub(crate) fn is_subscribed(&self, channel: &str) -> bool {
        self.slots.lock().contains_key(channel)
    }

    pub(crate) fn channels(&self) -> Vec<&'static str> {
        let mut channels: Vec<_> = self.slots.lock().keys().copied().collect();
        channels.sort_unstable();
        channels
    }

    fn aggregate<Ch: Channel>(&self, list: ListenerList<Ch::Payload, T::Event>) -> RawListener<T::Event> {
        let codec = self.codec.clone();
        let gate = self.gate.clone();
        let stats = self.stats.clone();
        let name = self.name.clone();

        Arc::new(move |event: &T::Event, payload: &Bytes| {
            stats.lock().events_received += 1;

            if !gate(event) {
                stats.lock().events_filtered += 1;
                trace!(mux = %name, channel = Ch::NAME, "event from foreign origin dropped");
                return;
            }

            let value: Ch::Payload = match codec.decode(payload) {
                Ok(value) => value,
                Err(e) => {
                    stats.lock().decode_errors += 1;
                    warn!(mux = %name, channel = Ch::NAME, error = %e, "dropping undecodable payload");
                    return;
                }
            };

            let snapshot = list.lock().clone();
            stats.lock().listener_invocations += snapshot.len() as u64;
            trace!(mux = %name, channel = Ch::NAME, listeners = snapshot.len(), "dispatching event");

            for listener in &snapshot {
                listener(&value, event);
            }
        })
    }
}

// No raw listener outlives the registry that owns it.
impl<T: RawTransport, C: Codec> Drop for ListenerRegistry<T, C> {
    fn drop(&mut self) {
        for (channel, slot) in self.slots.get_mut().drain() {
            self.transport.off(channel, &slot.raw);
            debug!(mux = %self.name, channel, "raw subscription removed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ClientToHost;
    use crate::codec::JsonCodec;
    use crate::transport::memory::{MemoryEvent, MemoryHostEnd, MemoryTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    crate::channel!(Ping: "ping" => u32, ClientToHost);
    crate::channel!(PingText: "ping" => String, ClientToHost);

    fn registry(transport: &MemoryTransport) -> Arc<ListenerRegistry<MemoryHostEnd, JsonCodec>> {
        Arc::new(ListenerRegistry::new(
            transport.host_end(),
            JsonCodec,
            Arc::new(|_: &MemoryEvent| true),
            "test".to_string(),
        ))
    }

    fn emit(transport: &MemoryTransport, channel: &str, json: &'static str) {
        transport.emit_to_host(MemoryEvent::from_window(1), channel, Bytes::from_static(json.as_bytes()));
    }

    #[test]
    fn test_one_raw_subscription_per_channel() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);

        let a: Listener<u32, MemoryEvent> = listener(|_, _| {});
        let b: Listener<u32, MemoryEvent> = listener(|_, _| {});

        registry.on::<Ping>(a.clone()).unwrap();
        registry.on::<Ping>(b.clone()).unwrap();
        assert_eq!(registry.listener_count("ping"), 2);
        assert_eq!(transport.host_listener_count("ping"), 1);

        registry.off::<Ping>(&a);
        assert!(registry.is_subscribed("ping"));
        assert_eq!(transport.host_listener_count("ping"), 1);

        registry.off::<Ping>(&b);
        assert!(!registry.is_subscribed("ping"));
        assert_eq!(transport.host_listener_count("ping"), 0);

        registry.on::<Ping>(a).unwrap();
        assert_eq!(transport.host_listener_count("ping"), 1);
    }

    #[test]
    fn test_off_unknown_listener_is_noop() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);
        let a: Listener<u32, MemoryEvent> = listener(|_, _| {});
        let stranger: Listener<u32, MemoryEvent> = listener(|_, _| {});

        registry.off::<Ping>(&stranger);
        registry.on::<Ping>(a).unwrap();
        registry.off::<Ping>(&stranger);

        assert_eq!(registry.listener_count("ping"), 1);
        assert_eq!(transport.host_listener_count("ping"), 1);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            registry
                .on::<Ping>(listener(move |value: &u32, _: &MemoryEvent| {
                    order.lock().push((tag, *value));
                }))
                .unwrap();
        }

        emit(&transport, "ping", "7");
        assert_eq!(*order.lock(), vec![("first", 7), ("second", 7), ("third", 7)]);
    }

    #[test]
    fn test_same_listener_registered_twice() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let l: Listener<u32, MemoryEvent> = listener(move |_, _| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.on::<Ping>(l.clone()).unwrap();
        registry.on::<Ping>(l.clone()).unwrap();
        emit(&transport, "ping", "1");
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        registry.off::<Ping>(&l);
        emit(&transport, "ping", "1");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(registry.is_subscribed("ping"));
    }

    #[test]
    fn test_listener_removed_mid_dispatch_still_runs_this_pass() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = hits.clone();
        let second: Listener<u32, MemoryEvent> = listener(move |_, _| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        let weak = Arc::downgrade(&registry);
        let victim = second.clone();
        let first: Listener<u32, MemoryEvent> = listener(move |_, _| {
            if let Some(registry) = weak.upgrade() {
                registry.off::<Ping>(&victim);
            }
        });

        registry.on::<Ping>(first).unwrap();
        registry.on::<Ping>(second).unwrap();

        emit(&transport, "ping", "1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        emit(&transport, "ping", "1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.listener_count("ping"), 1);
    }

    #[test]
    fn test_payload_type_mismatch_rejected() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);

        registry.on::<Ping>(listener(|_, _| {})).unwrap();
        let err = registry
            .on::<PingText>(listener(|_: &String, _: &MemoryEvent| {}))
            .unwrap_err();
        assert!(matches!(err, IpcError::ChannelTypeMismatch { channel: "ping" }));
        assert_eq!(registry.listener_count("ping"), 1);
    }

    #[test]
    fn test_undecodable_payload_dropped() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        registry
            .on::<Ping>(listener(move |_: &u32, _: &MemoryEvent| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        emit(&transport, "ping", "\"not a number\"");

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        let stats = registry.stats().lock().clone();
        assert_eq!(stats.events_received, 1);
        assert_eq!(stats.decode_errors, 1);
    }

    #[test]
    fn test_unsubscribe_handle_matches_off() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);

        let unsubscribe = registry.on::<Ping>(listener(|_, _| {})).unwrap();
        assert_eq!(unsubscribe.channel(), "ping");
        assert_eq!(registry.channels(), vec!["ping"]);

        unsubscribe.unsubscribe();
        assert!(registry.channels().is_empty());
        assert_eq!(transport.host_listener_count("ping"), 0);
    }

    #[test]
    fn test_drop_removes_raw_subscriptions() {
        let transport = MemoryTransport::new();
        let registry = registry(&transport);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let unsubscribe = registry
            .on::<Ping>(listener(move |_: &u32, _: &MemoryEvent| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(transport.host_listener_count("ping"), 1);

        drop(registry);
        assert_eq!(transport.host_listener_count("ping"), 0);
        assert_eq!(emit_count(&transport, "ping", "1"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Handle outlives the registry; unsubscribing is then a no-op.
        unsubscribe.unsubscribe();
    }

    fn emit_count(transport: &MemoryTransport, channel: &str, json: &'static str) -> usize {
        transport.emit_to_host(MemoryEvent::from_window(1), channel, Bytes::from_static(json.as_bytes()))
    }
}
