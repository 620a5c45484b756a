use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_RELAYS, FETCH_TIMEOUT_SECS, LOOKBACK_SECS, POLL_INTERVAL_SECS, PUBLISH_TIMEOUT_SECS,
};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub relay_urls: Vec<String>,
    /// Interval between notification sync ticks
    pub poll_interval: Duration,
    /// How far back each tick looks for new events
    pub lookback: Duration,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            relay_urls: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            lookback: Duration::from_secs(LOOKBACK_SECS),
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            publish_timeout: Duration::from_secs(PUBLISH_TIMEOUT_SECS),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new("agora_data")
    }
}
