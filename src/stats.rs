/// Counters collected by a multiplexer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxStats {
    pub messages_sent: u64,
    pub messages_buffered: u64,
    pub messages_flushed: u64,
    pub events_received: u64,
    pub events_filtered: u64,
    pub decode_errors: u64,
    pub listener_invocations: u64,
}

impl MuxStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &MuxStats) {
        self.messages_sent += other.messages_sent;
        self.messages_buffered += other.messages_buffered;
        self.messages_flushed += other.messages_flushed;
        self.events_received += other.events_received;
        self.events_filtered += other.events_filtered;
        self.decode_errors += other.decode_errors;
        self.listener_invocations += other.listener_invocations;
    }
}

impl std::fmt::Display for MuxStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Multiplexer Statistics:")?;
        writeln!(f, "  Messages sent:        {}", self.messages_sent)?;
        writeln!(f, "  Messages buffered:    {}", self.messages_buffered)?;
        writeln!(f, "  Messages flushed:     {}", self.messages_flushed)?;
        writeln!(f, "  Events received:      {}", self.events_received)?;
        writeln!(f, "  Events filtered:      {}", self.events_filtered)?;
        writeln!(f, "  Decode errors:        {}", self.decode_errors)?;
        writeln!(f, "  Listener invocations: {}", self.listener_invocations)?;
        Ok(())
    }
}
