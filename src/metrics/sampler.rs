use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::memory::{MemoryReader, PlatformReader};
use super::types::{MemoryMetric, MemorySample, PeakReport, SamplerState};
use crate::config::{SamplerConfig, SAMPLER_CONFIG};

#[derive(Debug)]
pub enum SamplerError {
    AlreadyStarted,
    NotStarted,
    AlreadyStopped,
    SpawnFailed(std::io::Error),
    WorkerPanicked,
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::AlreadyStarted => write!(f, "sampler was already started"),
            SamplerError::NotStarted => write!(f, "sampler was never started"),
            SamplerError::AlreadyStopped => write!(f, "sampler was already stopped"),
            SamplerError::SpawnFailed(err) => write!(f, "failed to spawn sampler thread: {}", err),
            SamplerError::WorkerPanicked => write!(f, "sampler thread panicked"),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::SpawnFailed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Default)]
struct SharedCounters {
    stop: AtomicBool,
    // Written by the polling thread only.
    peak: AtomicU64,
    samples: AtomicU64,
    failed_reads: AtomicU64,
}

/// Tracks the largest memory reading taken while a region of code runs.
///
/// `begin` spawns a polling thread and `end` stops and joins it. Each
/// instance runs at most once: Idle, then Running, then Stopped.
pub struct PeakSampler<R: MemoryReader = PlatformReader> {
    config: SamplerConfig,
    reader: Option<R>,
    metric: MemoryMetric,
    source: &'static str,
    shared: Arc<SharedCounters>,
    worker: Option<JoinHandle<()>>,
    state: SamplerState,
    started: Option<(DateTime<Utc>, Instant)>,
    report: Option<PeakReport>,
}

impl PeakSampler<PlatformReader> {
    pub fn new() -> Self {
        Self::with_config(SAMPLER_CONFIG.clone())
    }

    pub fn with_config(config: SamplerConfig) -> Self {
        Self::with_reader(PlatformReader::new(), config)
    }
}

impl Default for PeakSampler<PlatformReader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: MemoryReader> PeakSampler<R> {
    pub fn with_reader(reader: R, config: SamplerConfig) -> Self {
        PeakSampler {
            config,
            metric: reader.metric(),
            source: reader.source(),
            reader: Some(reader),
            shared: Arc::new(SharedCounters::default()),
            worker: None,
            state: SamplerState::Idle,
            started: None,
            report: None,
        }
    }

    pub fn begin(&mut self) -> Result<(), SamplerError> {
        if self.state != SamplerState::Idle {
            return Err(SamplerError::AlreadyStarted);
        }
        let reader = self.reader.take().ok_or(SamplerError::AlreadyStarted)?;

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.peak.store(0, Ordering::SeqCst);
        self.shared.samples.store(0, Ordering::SeqCst);
        self.shared.failed_reads.store(0, Ordering::SeqCst);

        let worker = PollWorker {
            reader,
            shared: Arc::clone(&self.shared),
            poll_interval: self.config.poll_interval,
        };
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                debug!(
                    "peak sampler started: source={} metric={} interval={:?}",
                    self.source, self.metric, self.config.poll_interval
                );
                self.worker = Some(handle);
                self.started = Some((Utc::now(), Instant::now()));
                self.state = SamplerState::Running;
                Ok(())
            }
            Err(err) => {
                // The reader went down with the closure; this instance cannot run again.
                self.state = SamplerState::Stopped;
                Err(SamplerError::SpawnFailed(err))
            }
        }
    }

    /// Stops the polling thread and blocks until it has exited.
    pub fn end(&mut self) -> Result<PeakReport, SamplerError> {
        match self.state {
            SamplerState::Idle => return Err(SamplerError::NotStarted),
            SamplerState::Stopped => return Err(SamplerError::AlreadyStopped),
            SamplerState::Running => {}
        }

        let joined = self.stop_worker();
        self.state = SamplerState::Stopped;
        joined?;

        let (started_at, started) = self
            .started
            .unwrap_or_else(|| (Utc::now(), Instant::now()));
        let report = PeakReport::new(
            MemorySample::from_bytes(self.peak_bytes()),
            self.samples(),
            self.failed_reads(),
            self.metric,
            self.source,
            started_at,
            Utc::now(),
            started.elapsed(),
        );
        debug!("peak sampler stopped: {}", report);
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Largest reading so far. Only final once `end` has returned.
    pub fn peak_bytes(&self) -> u64 {
        self.shared.peak.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.shared.samples.load(Ordering::Relaxed)
    }

    pub fn failed_reads(&self) -> u64 {
        self.shared.failed_reads.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn metric(&self) -> MemoryMetric {
        self.metric
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn report(&self) -> Option<&PeakReport> {
        self.report.as_ref()
    }

    fn stop_worker(&mut self) -> Result<(), SamplerError> {
        self.shared.stop.store(true, Ordering::Release);
        match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| SamplerError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl<R: MemoryReader> Drop for PeakSampler<R> {
    fn drop(&mut self) {
        if self.state == SamplerState::Running {
            if let Err(err) = self.stop_worker() {
                warn!("peak sampler dropped while running: {}", err);
            }
            self.state = SamplerState::Stopped;
        }
    }
}

struct PollWorker<R> {
    reader: R,
    shared: Arc<SharedCounters>,
    poll_interval: Duration,
}

impl<R: MemoryReader> PollWorker<R> {
    fn run(mut self) {
        loop {
            match self.reader.sample() {
                Ok(sample) => {
                    self.shared
                        .peak
                        .fetch_max(sample.process_pmem, Ordering::Relaxed);
                    self.shared.samples.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    let failed = self.shared.failed_reads.fetch_add(1, Ordering::Relaxed);
                    if failed == 0 {
                        warn!("{} read failed: {}", self.reader.source(), err);
                    }
                }
            }

            if self.shared.stop.load(Ordering::Acquire) {
                break;
            }
            if !self.poll_interval.is_zero() {
                thread::sleep(self.poll_interval);
            }
        }

        let failed = self.shared.failed_reads.load(Ordering::Relaxed);
        if failed > 1 {
            debug!("{} reads failed while sampling", failed);
        }
    }
}
