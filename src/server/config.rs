use std::time::Duration;

/// Configuration for the key-value store task.
///
/// ```rust
/// use std::time::Duration;
/// use ttlkv::server::config::StoreConfig;
///
/// let config = StoreConfig::default().with_sweep_interval(Duration::from_millis(50));
/// assert_eq!(config.sweep_interval, Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Interval between active expiration sweeps (default: 200 milliseconds)
    pub sweep_interval: Duration,
    /// Capacity of the request channel in front of the store (default: 128)
    pub channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(200),
            channel_capacity: 128,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how often expired entries are reclaimed in the background.
    ///
    /// Expired entries are already invisible to every command; the sweep only
    /// frees their memory. A zero interval is raised to one millisecond.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
