use serde::{Deserialize, Serialize};
use std::error::Error;
use xipc::{
    channel, listener, ClientMux, ClientToHost, HostMux, HostToClient, JsonCodec, MemoryEvent,
    MemoryHostEnd, MemoryTransport, MemoryWindow,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Status {
    ready: bool,
    detail: String,
}

channel!(StatusChannel: "status" => Status, HostToClient);
channel!(Ping: "ping" => u32, ClientToHost);

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("xipc=debug")),
        )
        .init();

    let transport = MemoryTransport::new();
    let host: HostMux<MemoryHostEnd, MemoryWindow, JsonCodec> =
        HostMux::with_codec(transport.host_end(), JsonCodec);

    // The window does not exist yet; this status waits in the backlog.
    host.send::<StatusChannel>(&Status {
        ready: false,
        detail: "booting".into(),
    })?;
    println!("[Host] queued messages: {}", host.outstanding_len());

    let client = ClientMux::with_codec(transport.client_end(1), JsonCodec);
    let _status = client.on_scoped::<StatusChannel>(listener(|status: &Status, _: &MemoryEvent| {
        println!("[Client] status: ready={} ({})", status.ready, status.detail);
    }))?;

    let pings = host.on::<Ping>(listener(|value: &u32, event: &MemoryEvent| {
        println!("[Host] ping {} from window {:?}", value, event.sender);
    }))?;

    host.register_single_target(transport.window(1))?;
    host.send::<StatusChannel>(&Status {
        ready: true,
        detail: "window attached".into(),
    })?;

    client.send::<Ping>(&42)?;
    pings.unsubscribe();
    client.send::<Ping>(&43)?;

    println!("[Host] subscribed to ping: {}", host.is_subscribed("ping"));
    print!("{}", host.stats());
    Ok(())
}
