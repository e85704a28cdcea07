use std::future::Future;

use log::warn;
use tokio::runtime::Handle;
use tokio::task;

use super::memory::{MemoryReader, PlatformReader};
use super::sampler::{PeakSampler, SamplerError};
use super::types::{PeakReport, SamplerState};
use crate::config::SamplerConfig;

/// Scoped sampling region: sampling starts when the guard is built and stops
/// on `finish` or when the guard is dropped.
pub struct PeakGuard<R: MemoryReader = PlatformReader> {
    sampler: PeakSampler<R>,
}

impl PeakGuard<PlatformReader> {
    pub fn start() -> Result<Self, SamplerError> {
        Self::from_sampler(PeakSampler::new())
    }
}

impl<R: MemoryReader> PeakGuard<R> {
    pub fn from_sampler(mut sampler: PeakSampler<R>) -> Result<Self, SamplerError> {
        sampler.begin()?;
        Ok(PeakGuard { sampler })
    }

    pub fn with_reader(reader: R, config: SamplerConfig) -> Result<Self, SamplerError> {
        Self::from_sampler(PeakSampler::with_reader(reader, config))
    }

    /// Intermediate peak while the region is still running.
    pub fn peak_bytes(&self) -> u64 {
        self.sampler.peak_bytes()
    }

    pub fn state(&self) -> SamplerState {
        self.sampler.state()
    }

    pub fn finish(mut self) -> Result<PeakReport, SamplerError> {
        self.sampler.end()
    }
}

pub fn measure<T>(region: impl FnOnce() -> T) -> Result<(T, PeakReport), SamplerError> {
    measure_with(PeakSampler::new(), region)
}

pub fn measure_with<R, T>(
    sampler: PeakSampler<R>,
    region: impl FnOnce() -> T,
) -> Result<(T, PeakReport), SamplerError>
where
    R: MemoryReader,
{
    let guard = PeakGuard::from_sampler(sampler)?;
    let output = region();
    let report = guard.finish()?;
    Ok((output, report))
}

/// Async variant of [`measure`]. Must run inside a Tokio runtime; the final
/// join happens on the blocking pool, including when the returned future is
/// dropped before the region completes.
pub async fn measure_async<F>(region: F) -> Result<(F::Output, PeakReport), SamplerError>
where
    F: Future,
{
    measure_async_with(PeakSampler::new(), region).await
}

pub async fn measure_async_with<R, F>(
    sampler: PeakSampler<R>,
    region: F,
) -> Result<(F::Output, PeakReport), SamplerError>
where
    R: MemoryReader,
    F: Future,
{
    let mut pending = PendingFinish {
        guard: Some(PeakGuard::from_sampler(sampler)?),
    };
    let output = region.await;
    let guard = match pending.guard.take() {
        Some(guard) => guard,
        None => return Err(SamplerError::AlreadyStopped),
    };
    match task::spawn_blocking(move || guard.finish()).await {
        Ok(report) => Ok((output, report?)),
        Err(join_err) => {
            warn!("failed to join peak sampler: {}", join_err);
            Err(SamplerError::WorkerPanicked)
        }
    }
}

/// Holds the guard across the region's await point. If the future is dropped
/// mid-region the join is handed to the blocking pool instead of running on
/// the runtime worker.
struct PendingFinish<R: MemoryReader> {
    guard: Option<PeakGuard<R>>,
}

impl<R: MemoryReader> Drop for PendingFinish<R> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || drop(guard));
                }
                Err(_) => drop(guard),
            }
        }
    }
}
