// src/config.rs

use std::time::Duration;

use lazy_static::lazy_static;
use log::warn;
use serde::{Deserialize, Serialize};

pub const POLL_INTERVAL_ENV: &str = "PEAK_SAMPLER_POLL_INTERVAL_US";
pub const THREAD_NAME_ENV: &str = "PEAK_SAMPLER_THREAD_NAME";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    // Pause between reads; zero busy-polls
    pub poll_interval: Duration,        // Default: 0
    pub thread_name: String,            // Default: "peak-memory-sampler"
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            poll_interval: Duration::ZERO,
            thread_name: "peak-memory-sampler".to_string(),
        }
    }
}

impl SamplerConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn is_busy_poll(&self) -> bool {
        self.poll_interval.is_zero()
    }

    /// Defaults overridden by `PEAK_SAMPLER_*` variables. Values that fail to
    /// parse are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = SamplerConfig::default();

        if let Ok(raw) = std::env::var(POLL_INTERVAL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(micros) => config.poll_interval = Duration::from_micros(micros),
                Err(err) => warn!("ignoring {}={:?}: {}", POLL_INTERVAL_ENV, raw, err),
            }
        }

        if let Ok(name) = std::env::var(THREAD_NAME_ENV) {
            let name = name.trim();
            if name.is_empty() || name.contains('\0') {
                warn!("ignoring {}: invalid thread name", THREAD_NAME_ENV);
            } else {
                config.thread_name = name.to_string();
            }
        }

        config
    }
}

// Global configuration
lazy_static! {
    pub static ref SAMPLER_CONFIG: SamplerConfig = SamplerConfig::from_env();
}
