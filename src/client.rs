use std::sync::Arc;
use tracing::trace;

use crate::channel::{Channel, ClientToHost, HostToClient};
use crate::codec::{BincodeCodec, Codec};
use crate::config::MuxConfig;
use crate::error::Result;
use crate::registry::{Gate, Listener, ListenerRegistry};
use crate::stats::MuxStats;
use crate::stream::{EventStream, forwarder};
use crate::subscription::{ListenerGuard, Unsubscribe};
use crate::transport::ClientTransport;

/// Client-side multiplexer. Its one destination, the host, always exists, so sends are never buffered.
///
/// Dropping it removes every raw subscription it created.
pub struct ClientMux<T, C = BincodeCodec>
where
    T: ClientTransport + 'static,
    C: Codec,
{
    registry: Arc<ListenerRegistry<T, C>>,
    config: MuxConfig,
}

impl<T: ClientTransport + 'static> ClientMux<T, BincodeCodec> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, MuxConfig::default())
    }

    pub fn with_config(transport: T, config: MuxConfig) -> Self {
        Self::with_codec_and_config(transport, BincodeCodec, config)
    }
}

impl<T, C> ClientMux<T, C>
where
    T: ClientTransport + 'static,
    C: Codec,
{
    pub fn with_codec(transport: T, codec: C) -> Self {
        Self::with_codec_and_config(transport, codec, MuxConfig::default())
    }

    pub fn with_codec_and_config(transport: T, codec: C, config: MuxConfig) -> Self {
        let config = config.or_named("client");
        let gate: Gate<T::Event> = Arc::new(|_: &T::Event| true);
        Self {
            registry: Arc::new(ListenerRegistry::new(
                transport,
                codec,
                gate,
                config.name.clone(),
            )),
            config,
        }
    }

    /// Listen on a host-originated channel.
    pub fn on<Ch>(&self, listener: Listener<Ch::Payload, T::Event>) -> Result<Unsubscribe>
    where
        Ch: Channel<Direction = HostToClient>,
    {
        self.registry.on::<Ch>(listener)
    }

    /// Register for the lifetime of the returned guard, e.g. while a view is mounted.
    pub fn on_scoped<Ch>(&self, listener: Listener<Ch::Payload, T::Event>) -> Result<ListenerGuard>
    where
        Ch: Channel<Direction = HostToClient>,
    {
        Ok(self.registry.on::<Ch>(listener)?.into_guard())
    }

    pub fn off<Ch>(&self, listener: &Listener<Ch::Payload, T::Event>)
    where
        Ch: Channel<Direction = HostToClient>,
    {
        self.registry.off::<Ch>(listener)
    }

    pub fn stream<Ch>(&self) -> Result<EventStream<Ch::Payload, T::Event>>
    where
        Ch: Channel<Direction = HostToClient>,
        Ch::Payload: Clone,
        T::Event: Clone,
    {
        let (listener, rx) = forwarder();
        let guard = self.registry.on::<Ch>(listener)?.into_guard();
        Ok(EventStream::new(rx, guard))
    }

    /// Push a message to the host immediately.
    pub fn send<Ch>(&self, payload: &Ch::Payload) -> Result<()>
    where
        Ch: Channel<Direction = ClientToHost>,
    {
        let bytes = self.registry.codec().encode(payload)?;
        trace!(mux = %self.config.name, channel = Ch::NAME, bytes = bytes.len(), "send");
        self.registry.transport().send(Ch::NAME, bytes);
        self.registry.stats().lock().messages_sent += 1;
        Ok(())
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.registry.listener_count(channel)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.registry.is_subscribed(channel)
    }

    pub fn subscribed_channels(&self) -> Vec<&'static str> {
        self.registry.channels()
    }

    pub fn stats(&self) -> MuxStats {
        self.registry.stats().lock().clone()
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        self.registry.transport()
    }
}

impl<T, C> std::fmt::Debug for ClientMux<T, C>
where
    T: ClientTransport + 'static,
    C: Codec,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMux")
            .field("name", &self.registry.name())
            .field("channels", &self.registry.channels())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use bytes::Bytes;
    use crate::registry::listener;
    use crate::transport::RawTransport;
    use crate::transport::memory::{MemoryClientEnd, MemoryEvent, MemoryTransport};
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Theme {
        dark: bool,
        accent: String,
    }

    channel!(ThemeChanged: "theme-changed" => Theme, HostToClient);
    channel!(Ping: "ping" => u32, ClientToHost);

    fn received<P: Clone + Send + Sync + 'static>() -> (Arc<Mutex<Vec<P>>>, Listener<P, MemoryEvent>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let l = listener(move |payload: &P, _: &MemoryEvent| {
            seen_clone.lock().push(payload.clone());
        });
        (seen, l)
    }

    #[test]
    fn test_send_is_never_buffered() {
        let transport = MemoryTransport::new();
        let client = ClientMux::new(transport.client_end(1));

        let raw = Arc::new(Mutex::new(Vec::new()));
        let raw_clone = raw.clone();
        transport.host_end().on(
            "ping",
            Arc::new(move |_: &MemoryEvent, payload: &Bytes| {
                raw_clone.lock().push(payload.clone());
            }),
        );

        client.send::<Ping>(&42).unwrap();

        let raw = raw.lock();
        assert_eq!(raw.len(), 1);
        assert_eq!(bincode::deserialize::<u32>(&raw[0]).unwrap(), 42);
        assert_eq!(client.stats().messages_sent, 1);
    }

    #[test]
    fn test_lazy_subscription_lifecycle() {
        let transport = MemoryTransport::new();
        let client: ClientMux<MemoryClientEnd> = ClientMux::new(transport.client_end(1));
        assert!(!client.is_subscribed("theme-changed"));
        assert_eq!(transport.client_listener_count("theme-changed"), 0);

        let (_, a) = received::<Theme>();
        let (_, b) = received::<Theme>();
        client.on::<ThemeChanged>(a.clone()).unwrap();
        client.on::<ThemeChanged>(b.clone()).unwrap();
        assert_eq!(client.listener_count("theme-changed"), 2);
        assert_eq!(transport.client_listener_count("theme-changed"), 1);

        client.off::<ThemeChanged>(&a);
        assert_eq!(transport.client_listener_count("theme-changed"), 1);
        client.off::<ThemeChanged>(&b);
        assert_eq!(transport.client_listener_count("theme-changed"), 0);
        assert!(client.subscribed_channels().is_empty());
    }

    #[test]
    fn test_receives_host_pushes() {
        let transport = MemoryTransport::new();
        let client = ClientMux::new(transport.client_end(1));
        let (seen, l) = received::<Theme>();
        client.on::<ThemeChanged>(l).unwrap();

        let theme = Theme {
            dark: true,
            accent: "teal".into(),
        };
        transport.emit_to_client("theme-changed", Bytes::from(bincode::serialize(&theme).unwrap()));

        assert_eq!(*seen.lock(), vec![theme]);
    }

    #[test]
    fn test_scoped_listener_follows_guard() {
        let transport = MemoryTransport::new();
        let client = ClientMux::new(transport.client_end(1));
        let (seen, l) = received::<Theme>();
        let payload = Bytes::from(
            bincode::serialize(&Theme {
                dark: false,
                accent: "red".into(),
            })
            .unwrap(),
        );

        let guard = client.on_scoped::<ThemeChanged>(l).unwrap();
        transport.emit_to_client("theme-changed", payload.clone());
        drop(guard);
        transport.emit_to_client("theme-changed", payload);

        assert_eq!(seen.lock().len(), 1);
        assert!(!client.is_subscribed("theme-changed"));
    }

    #[test]
    fn test_unnamed_config_is_labelled_client() {
        let transport = MemoryTransport::new();
        let client = ClientMux::with_config(transport.client_end(1), MuxConfig::new());
        assert_eq!(client.config().name, "client");

        let named = ClientMux::with_config(transport.client_end(2), MuxConfig::new().with_name("settings"));
        assert_eq!(named.config().name, "settings");
    }
}
