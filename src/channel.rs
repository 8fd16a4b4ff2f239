//! Typed channel declarations.
//!
//! A channel pairs a stable wire name with a payload type and a direction.
//! Host-to-client and client-to-host channels form two disjoint namespaces;
//! the multiplexers only accept channels of the matching direction, so
//! sending on the wrong side fails to compile.

use serde::{Deserialize, Serialize};

/// Direction marker for channels.
pub trait Direction: Send + Sync + 'static {}

/// Channels pushed by the host and received by clients.
#[derive(Debug, Clone, Copy)]
pub enum HostToClient {}

/// Channels sent by clients and received by the host.
#[derive(Debug, Clone, Copy)]
pub enum ClientToHost {}

impl Direction for HostToClient {}
impl Direction for ClientToHost {}

/// A logical message type carried over the raw transport.
pub trait Channel: 'static {
    /// Stable raw channel key.
    const NAME: &'static str;

    /// Payload carried by every message on this channel.
    type Payload: Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static;

    /// Which side originates messages on this channel.
    type Direction: Direction;
}

/// Declares a zero-sized channel type.
///
/// ```
/// use xipc::{channel, ClientToHost, HostToClient};
///
/// channel!(pub Ping: "ping" => u32, ClientToHost);
/// channel!(pub Status: "status" => bool, HostToClient);
/// ```
#[macro_export]
macro_rules! channel {
    ($vis:vis $ty:ident : $name:literal => $payload:ty, $dir:ty) => {
        #[derive(Debug, Clone, Copy)]
        $vis struct $ty;

        impl $crate::Channel for $ty {
            const NAME: &'static str = $name;
            type Payload = $payload;
            type Direction = $dir;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    channel!(Ping: "ping" => u32, ClientToHost);
    channel!(pub(crate) Status: "status" => (bool, String), HostToClient);

    fn name_of<C: Channel>() -> &'static str {
        C::NAME
    }

    #[test]
    fn test_channel_macro_declares_name() {
        assert_eq!(name_of::<Ping>(), "ping");
        assert_eq!(name_of::<Status>(), "status");
    }
}
