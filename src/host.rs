//! Host-side multiplexer.
//!
//! Owns the destinations (client windows) the host pushes to. Until the first
//! destination is registered, outbound messages are held in a one-shot FIFO
//! backlog that is drained into the first destination to arrive.
//!
//! Destinations are registered either as a single target or as a growing set
//! of targets. The two modes are exclusive for the lifetime of the
//! multiplexer. In single-target mode inbound events are only dispatched when
//! their origin matches the registered target.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::channel::{Channel, ClientToHost, HostToClient};
use crate::codec::{BincodeCodec, Codec};
use crate::config::MuxConfig;
use crate::error::{IpcError, Result};
use crate::registry::{Gate, Listener, ListenerRegistry};
use crate::stats::MuxStats;
use crate::stream::{EventStream, forwarder};
use crate::subscription::{ListenerGuard, Unsubscribe};
use crate::transport::{Origin, RawTransport, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    Unset,
    Single,
    Multi,
}

impl std::fmt::Display for TargetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetMode::Unset => write!(f, "unset"),
            TargetMode::Single => write!(f, "single"),
            TargetMode::Multi => write!(f, "multi"),
        }
    }
}

enum Targets<W> {
    Unset,
    Single(Arc<W>),
    Multi(Vec<Arc<W>>),
}

impl<W> Targets<W> {
    fn mode(&self) -> TargetMode {
        match self {
            Targets::Unset => TargetMode::Unset,
            Targets::Single(_) => TargetMode::Single,
            Targets::Multi(_) => TargetMode::Multi,
        }
    }

    fn destinations(&self) -> Vec<Arc<W>> {
        match self {
            Targets::Unset => Vec::new(),
            Targets::Single(target) => vec![target.clone()],
            Targets::Multi(targets) => targets.clone(),
        }
    }
}

struct HostState<W> {
    targets: Targets<W>,
    outstanding: Vec<(&'static str, Bytes)>,
    // Set while the backlog drains; sends made meanwhile wait in `deferred`.
    flushing: bool,
    deferred: Vec<(&'static str, Bytes)>,
    backlog_warned: bool,
}

/// Host-side multiplexer. Dropping it removes every raw subscription it created.
pub struct HostMux<T, W, C = BincodeCodec>
where
    T: RawTransport + 'static,
    W: Target,
    C: Codec,
{
    registry: Arc<ListenerRegistry<T, C>>,
    state: Arc<Mutex<HostState<W>>>,
    config: MuxConfig,
}

impl<T, W> HostMux<T, W, BincodeCodec>
where
    T: RawTransport + 'static,
    T::Event: Origin<W>,
    W: Target,
{
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, MuxConfig::default())
    }

    pub fn with_config(transport: T, config: MuxConfig) -> Self {
        Self::with_codec_and_config(transport, BincodeCodec, config)
    }
}

impl<T, W, C> HostMux<T, W, C>
where
    T: RawTransport + 'static,
    T::Event: Origin<W>,
    W: Target,
    C: Codec,
{
    pub fn with_codec(transport: T, codec: C) -> Self {
        Self::with_codec_and_config(transport, codec, MuxConfig::default())
    }

    pub fn with_codec_and_config(transport: T, codec: C, config: MuxConfig) -> Self {
        let config = config.or_named("host");
        let state = Arc::new(Mutex::new(HostState {
            targets: Targets::Unset,
            outstanding: Vec::new(),
            flushing: false,
            deferred: Vec::new(),
            backlog_warned: false,
        }));

        let gate: Gate<T::Event> = if config.origin_filter {
            let state = state.clone();
            Arc::new(move |event: &T::Event| match &state.lock().targets {
                Targets::Single(target) => event.originates_from(&**target),
                _ => true,
            })
        } else {
            Arc::new(|_: &T::Event| true)
        };

        Self {
            registry: Arc::new(ListenerRegistry::new(
                transport,
                codec,
                gate,
                config.name.clone(),
            )),
            state,
            config,
        }
    }

    /// Register the only destination. Fails if targets were registered with [`register_target`](Self::register_target).
    ///
    /// Registering again replaces the previous target.
    pub fn register_single_target(&self, target: W) -> Result<()> {
        let target = Arc::new(target);
        let backlog = {
            let mut state = self.state.lock();
            match state.targets {
                Targets::Multi(_) => {
                    return Err(IpcError::ModeConflict {
                        current: TargetMode::Multi,
                        requested: TargetMode::Single,
                    });
                }
                Targets::Single(_) => {
                    debug!(mux = %self.config.name, "replacing single target");
                }
                Targets::Unset => {
                    debug!(mux = %self.config.name, "single target registered");
                }
            }
            state.targets = Targets::Single(target.clone());
            Self::take_backlog(&mut state)
        };

        self.flush(&target, backlog);
        Ok(())
    }

    /// Add a destination to the target set. Fails if a single target is registered.
    ///
    /// Only the first target to join receives messages sent before any target existed.
    pub fn register_target(&self, target: W) -> Result<()> {
        let target = Arc::new(target);
        let backlog = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match &mut state.targets {
                Targets::Single(_) => {
                    return Err(IpcError::ModeConflict {
                        current: TargetMode::Single,
                        requested: TargetMode::Multi,
                    });
                }
                Targets::Multi(targets) => targets.push(target.clone()),
                Targets::Unset => state.targets = Targets::Multi(vec![target.clone()]),
            }
            debug!(mux = %self.config.name, targets = self.count(&state.targets), "target added");
            Self::take_backlog(state)
        };

        self.flush(&target, backlog);
        Ok(())
    }

    /// Listen on a client-originated channel.
    pub fn on<Ch>(&self, listener: Listener<Ch::Payload, T::Event>) -> Result<Unsubscribe>
    where
        Ch: Channel<Direction = ClientToHost>,
    {
        self.registry.on::<Ch>(listener)
    }

    /// Like [`on`](Self::on), but the listener lives only as long as the returned guard.
    pub fn on_scoped<Ch>(&self, listener: Listener<Ch::Payload, T::Event>) -> Result<ListenerGuard>
    where
        Ch: Channel<Direction = ClientToHost>,
    {
        Ok(self.registry.on::<Ch>(listener)?.into_guard())
    }

    pub fn off<Ch>(&self, listener: &Listener<Ch::Payload, T::Event>)
    where
        Ch: Channel<Direction = ClientToHost>,
    {
        self.registry.off::<Ch>(listener)
    }

    /// Receive a client-originated channel as an async stream.
    pub fn stream<Ch>(&self) -> Result<EventStream<Ch::Payload, T::Event>>
    where
        Ch: Channel<Direction = ClientToHost>,
        Ch::Payload: Clone,
        T::Event: Clone,
    {
        let (listener, rx) = forwarder();
        let guard = self.registry.on::<Ch>(listener)?.into_guard();
        Ok(EventStream::new(rx, guard))
    }

    /// Send to the registered destination(s), or queue until one exists.
    pub fn send<Ch>(&self, payload: &Ch::Payload) -> Result<()>
    where
        Ch: Channel<Direction = HostToClient>,
    {
        let bytes = self.registry.codec().encode(payload)?;

        let destinations = {
            let mut state = self.state.lock();
            if state.flushing {
                state.deferred.push((Ch::NAME, bytes));
                trace!(mux = %self.config.name, channel = Ch::NAME, "backlog draining, send deferred");
                return Ok(());
            }
            let destinations = state.targets.destinations();
            if destinations.is_empty() {
                self.enqueue(&mut state, Ch::NAME, bytes);
                return Ok(());
            }
            destinations
        };

        trace!(mux = %self.config.name, channel = Ch::NAME, destinations = destinations.len(), "send");
        for target in &destinations {
            target.push(Ch::NAME, bytes.clone());
        }
        self.registry.stats().lock().messages_sent += destinations.len() as u64;
        Ok(())
    }

    /// Send to one specific destination, regardless of mode. Queued if no target is registered yet.
    pub fn send_to<Ch>(&self, payload: &Ch::Payload, target: &W) -> Result<()>
    where
        Ch: Channel<Direction = HostToClient>,
    {
        let bytes = self.registry.codec().encode(payload)?;

        {
            let mut state = self.state.lock();
            if let Targets::Unset = state.targets {
                self.enqueue(&mut state, Ch::NAME, bytes);
                return Ok(());
            }
        }

        trace!(mux = %self.config.name, channel = Ch::NAME, "send to explicit target");
        target.push(Ch::NAME, bytes);
        self.registry.stats().lock().messages_sent += 1;
        Ok(())
    }

    pub fn target_mode(&self) -> TargetMode {
        self.state.lock().targets.mode()
    }

    pub fn target_count(&self) -> usize {
        self.count(&self.state.lock().targets)
    }

    /// Messages waiting for the first destination.
    pub fn outstanding_len(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.registry.listener_count(channel)
    }

    /// Whether a raw transport subscription exists for `channel`.
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

    fn count(&self, targets: &Targets<W>) -> usize {
        match targets {
            Targets::Unset => 0,
            Targets::Single(_) => 1,
            Targets::Multi(targets) => targets.len(),
        }
    }

    fn enqueue(&self, state: &mut HostState<W>, channel: &'static str, bytes: Bytes) {
        state.outstanding.push((channel, bytes));
        self.registry.stats().lock().messages_buffered += 1;
        trace!(mux = %self.config.name, channel, queued = state.outstanding.len(), "no target yet, message queued");

        if let Some(threshold) = self.config.backlog_warn_threshold {
            if !state.backlog_warned && state.outstanding.len() > threshold {
                state.backlog_warned = true;
                warn!(
                    mux = %self.config.name,
                    queued = state.outstanding.len(),
                    threshold,
                    "outbound backlog is growing with no target registered"
                );
            }
        }
    }

    /// Take the backlog for the joining target. A non-empty backlog holds later sends back until drained.
    fn take_backlog(state: &mut HostState<W>) -> Vec<(&'static str, Bytes)> {
        let backlog = std::mem::take(&mut state.outstanding);
        if !backlog.is_empty() {
            state.flushing = true;
        }
        backlog
    }

    fn flush(&self, target: &W, backlog: Vec<(&'static str, Bytes)>) {
        if backlog.is_empty() {
            return;
        }
        debug!(mux = %self.config.name, messages = backlog.len(), "flushing backlog");

        let flushed = backlog.len() as u64;
        for (channel, bytes) in backlog {
            target.push(channel, bytes);
        }
        {
            let mut stats = self.registry.stats().lock();
            stats.messages_flushed += flushed;
            stats.messages_sent += flushed;
        }

        // Pushes above may have re-entered `send`; deliver those after the backlog, in order.
        loop {
            let (deferred, destinations) = {
                let mut state = self.state.lock();
                if state.deferred.is_empty() {
                    state.flushing = false;
                    return;
                }
                (std::mem::take(&mut state.deferred), state.targets.destinations())
            };
            trace!(mux = %self.config.name, messages = deferred.len(), "delivering deferred sends");

            for (channel, bytes) in deferred {
                for destination in &destinations {
                    destination.push(channel, bytes.clone());
                }
                self.registry.stats().lock().messages_sent += destinations.len() as u64;
            }
        }
    }
}

impl<T, W, C> std::fmt::Debug for HostMux<T, W, C>
where
    T: RawTransport + 'static,
    W: Target,
    C: Codec,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMux")
            .field("name", &self.registry.name())
            .field("channels", &self.registry.channels())
            .finish_non_exhaustive()
    }
}
