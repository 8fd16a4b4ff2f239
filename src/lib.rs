//! xipc - typed event multiplexing between a host process and its client contexts
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod registry;
pub mod stats;
pub mod stream;
pub mod subscription;
pub mod transport;

pub use channel::{Channel, ClientToHost, Direction, HostToClient};
pub use client::ClientMux;
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use config::MuxConfig;
pub use error::{IpcError, Result};
pub use host::{HostMux, TargetMode};
pub use registry::{Listener, listener};
pub use stats::MuxStats;
pub use stream::EventStream;
pub use subscription::{ListenerGuard, Unsubscribe};
pub use transport::memory::{
    MemoryClientEnd, MemoryEvent, MemoryHostEnd, MemoryTransport, MemoryWindow, WindowId,
};
pub use transport::{ClientTransport, Origin, RawListener, RawTransport, Target};
