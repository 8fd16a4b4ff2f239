use std::error::Error;
use xipc::{
    channel, HostMux, HostToClient, MemoryHostEnd, MemoryTransport, MemoryWindow, Target,
};

channel!(Progress: "progress" => u8, HostToClient);

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("xipc=trace"))
        .init();

    let transport = MemoryTransport::new();
    let host: HostMux<MemoryHostEnd, MemoryWindow> = HostMux::new(transport.host_end());

    host.send::<Progress>(&0)?;

    let windows: Vec<MemoryWindow> = (1..=3).map(|id| transport.window(id)).collect();
    for window in &windows {
        host.register_target(window.clone())?;
    }

    for percent in [25u8, 50, 75] {
        host.send::<Progress>(&percent)?;
    }
    host.send_to::<Progress>(&100, &windows[2])?;

    // Targets only accumulate; a single target can no longer be registered.
    if let Err(e) = host.register_single_target(transport.window(9)) {
        println!("[Host] {}", e);
    }

    for window in &windows {
        let values: Vec<u8> = window
            .pushes()
            .iter()
            .map(|(_, bytes)| bincode::deserialize(bytes))
            .collect::<Result<_, _>>()?;
        println!("[Window {}] received {:?}", window.id(), values);
    }

    // Pushing directly bypasses the multiplexer entirely.
    windows[0].push("progress", bincode::serialize(&1u8)?.into());
    println!("[Window 1] pushes: {}", windows[0].push_count());
    Ok(())
}
