use std::sync::Mutex;
use std::time::Duration;

use lazy_static::lazy_static;
use peak_memory_lib::config::{POLL_INTERVAL_ENV, THREAD_NAME_ENV};
use peak_memory_lib::SamplerConfig;

lazy_static! {
    static ref TEST_ENV_GUARD: Mutex<()> = Mutex::new(());
}

struct EnvOverride {
    key: &'static str,
    prev: Option<String>,
}

impl EnvOverride {
    fn set(key: &'static str, value: &str) -> Self {
        let prev = std::env::var(key).ok();
        std::env::set_var(key, value);
        EnvOverride { key, prev }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.prev.take() {
            Some(value) => std::env::set_var(self.key, value),
            None => std::env::remove_var(self.key),
        }
    }
}

#[test]
fn defaults_busy_poll() {
    let config = SamplerConfig::default();
    assert!(config.is_busy_poll());
    assert_eq!(config.thread_name, "peak-memory-sampler");
}

#[test]
fn env_overrides_interval_and_name() {
    let _lock = TEST_ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let _interval = EnvOverride::set(POLL_INTERVAL_ENV, "250");
    let _name = EnvOverride::set(THREAD_NAME_ENV, "region-probe");

    let config = SamplerConfig::from_env();
    assert_eq!(config.poll_interval, Duration::from_micros(250));
    assert_eq!(config.thread_name, "region-probe");
}

#[test]
fn invalid_env_values_fall_back_to_defaults() {
    let _lock = TEST_ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let _interval = EnvOverride::set(POLL_INTERVAL_ENV, "fast");
    let _name = EnvOverride::set(THREAD_NAME_ENV, "   ");

    assert_eq!(SamplerConfig::from_env(), SamplerConfig::default());
}

#[test]
fn config_deserializes_with_missing_fields() {
    let config: SamplerConfig =
        serde_json::from_str(r#"{"poll_interval":{"secs":0,"nanos":5000}}"#).expect("parse");
    assert_eq!(config.poll_interval, Duration::from_micros(5));
    assert_eq!(config.thread_name, "peak-memory-sampler");
}
