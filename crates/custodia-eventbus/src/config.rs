/// Configuration for the in-process event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of each channel's broadcast buffer; slow subscribers that
    /// fall this far behind miss the oldest events (`RecvError::Lagged`).
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { channel_capacity: 256 }
    }
}
