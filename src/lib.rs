//! Background sampler for the peak resident memory of a region of code.
//!
//! ```no_run
//! let (_, report) = peak_memory_lib::measure(|| vec![0u8; 1 << 20]).unwrap();
//! println!("{}", report);
//! ```

pub mod config;
mod metrics;

pub use config::{SamplerConfig, SAMPLER_CONFIG};
pub use metrics::{
    measure, measure_async, measure_async_with, measure_with, read_current_memory,
    MemoryMetric, MemoryReadError, MemoryReader, MemorySample, PeakGuard, PeakReport,
    PeakSampler, PlatformReader, SamplerError, SamplerState,
};
