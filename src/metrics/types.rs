use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Bytes of physical memory held by the process at one reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemorySample {
    pub process_pmem: u64,
}

impl MemorySample {
    pub fn from_bytes(process_pmem: u64) -> Self {
        MemorySample { process_pmem }
    }
}

/// What a reader's byte count actually measures.
///
/// The platforms disagree: Windows exposes the instantaneous working set while
/// `getrusage` only exposes the kernel's own high-water mark, so a sampler on
/// Unix can never observe the footprint going down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMetric {
    WorkingSet,
    PeakResident,
}

impl MemoryMetric {
    pub fn is_instantaneous(&self) -> bool {
        matches!(self, MemoryMetric::WorkingSet)
    }
}

impl fmt::Display for MemoryMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryMetric::WorkingSet => write!(f, "working set"),
            MemoryMetric::PeakResident => write!(f, "peak resident set"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeakReport {
    pub peak_bytes: u64,
    pub samples: u64,
    pub failed_reads: u64,
    pub metric: MemoryMetric,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl PeakReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        peak: MemorySample,
        samples: u64,
        failed_reads: u64,
        metric: MemoryMetric,
        source: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        PeakReport {
            peak_bytes: peak.process_pmem,
            samples,
            failed_reads,
            metric,
            source: source.to_string(),
            started_at,
            finished_at,
            elapsed_ms: elapsed.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    pub fn peak(&self) -> MemorySample {
        MemorySample::from_bytes(self.peak_bytes)
    }

    pub fn display_peak(&self) -> String {
        ByteSize::b(self.peak_bytes).to_string()
    }
}

impl fmt::Display for PeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "peak {} ({} via {}, {} samples in {}ms)",
            self.display_peak(),
            self.metric,
            self.source,
            self.samples,
            self.elapsed_ms
        )
    }
}
