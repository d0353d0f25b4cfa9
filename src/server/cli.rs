use clap::Parser;
use std::{path::PathBuf, time::Duration};

use super::config::StoreConfig;

/// ttlkv server
#[derive(Parser, Debug)]
#[clap(version)]
pub struct Args {
    /// Host to listen on
    #[clap(long, default_value = "localhost")]
    pub host: String,

    /// Port to listen on
    #[clap(long, default_value_t = 7379)]
    pub port: u16,

    /// Milliseconds between active expiration sweeps
    #[clap(long, default_value_t = 200)]
    pub sweep_interval_ms: u64,

    /// Requests that may queue for the store before senders wait
    #[clap(long, default_value_t = 128)]
    pub channel_capacity: usize,

    /// Path of the log4rs configuration file
    #[clap(long, default_value = "config/log4rs.yml")]
    pub log_config: PathBuf,
}

impl Args {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_sweep_interval(Duration::from_millis(self.sweep_interval_ms))
            .with_channel_capacity(self.channel_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["ttlkv"]);
        assert_eq!(args.host, "localhost");
        assert_eq!(args.port, 7379);
        assert_eq!(args.store_config().sweep_interval, Duration::from_millis(200));
        assert_eq!(args.store_config().channel_capacity, 128);
    }

    #[test]
    fn test_sweep_interval_flag() {
        let args = Args::parse_from(["ttlkv", "--port", "0", "--sweep-interval-ms", "25"]);
        assert_eq!(args.port, 0);
        assert_eq!(args.store_config().sweep_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_channel_capacity_flag() {
        let args = Args::parse_from(["ttlkv", "--channel-capacity", "16"]);
        assert_eq!(args.store_config().channel_capacity, 16);

        let args = Args::parse_from(["ttlkv", "--channel-capacity", "0"]);
        assert_eq!(args.store_config().channel_capacity, 1);
    }
}
