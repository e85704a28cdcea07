mod guard;
mod memory;
mod sampler;
mod types;

pub use guard::{measure, measure_async, measure_async_with, measure_with, PeakGuard};
pub use memory::{read_current_memory, MemoryReadError, MemoryReader, PlatformReader};
pub use sampler::{PeakSampler, SamplerError};
pub use types::{MemoryMetric, MemorySample, PeakReport, SamplerState};
