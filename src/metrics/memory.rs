use std::fmt;

use log::debug;

use super::types::{MemoryMetric, MemorySample};

#[cfg(not(any(unix, windows)))]
compile_error!("peak-memory-sampler only supports Unix-like targets and Windows");

#[derive(Debug)]
pub enum MemoryReadError {
    SyscallFailed(&'static str, std::io::Error),
    ProcessUnavailable(String),
}

impl fmt::Display for MemoryReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryReadError::SyscallFailed(call, err) => write!(f, "{} failed: {}", call, err),
            MemoryReadError::ProcessUnavailable(reason) => {
                write!(f, "current process unavailable: {}", reason)
            }
        }
    }
}

impl std::error::Error for MemoryReadError {}

/// Source of memory readings for the current process.
///
/// The sampler owns its reader and calls it from the polling thread only.
pub trait MemoryReader: Send + 'static {
    fn sample(&mut self) -> Result<MemorySample, MemoryReadError>;

    fn metric(&self) -> MemoryMetric;

    fn source(&self) -> &'static str;
}

impl<R: MemoryReader + ?Sized> MemoryReader for Box<R> {
    fn sample(&mut self) -> Result<MemorySample, MemoryReadError> {
        (**self).sample()
    }

    fn metric(&self) -> MemoryMetric {
        (**self).metric()
    }

    fn source(&self) -> &'static str {
        (**self).source()
    }
}

/// Reads the current footprint of this process in bytes.
///
/// Failures degrade to zero: callers only ever take a maximum, and a zero
/// reading cannot raise one.
pub fn read_current_memory() -> u64 {
    let mut reader = PlatformReader::new();
    match reader.sample() {
        Ok(sample) => sample.process_pmem,
        Err(err) => {
            debug!("{} read failed: {}", reader.source(), err);
            0
        }
    }
}

pub use platform::PlatformReader;

#[cfg(unix)]
mod platform {
    use std::mem::MaybeUninit;

    use super::{MemoryMetric, MemoryReadError, MemoryReader, MemorySample};

    // ru_maxrss is in bytes on Apple platforms and kilobytes everywhere else.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    const MAXRSS_UNIT: u64 = 1;
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    const MAXRSS_UNIT: u64 = 1024;

    /// `getrusage(RUSAGE_SELF)` high-water mark of the resident set.
    #[derive(Debug, Default)]
    pub struct PlatformReader;

    impl PlatformReader {
        pub fn new() -> Self {
            PlatformReader
        }
    }

    impl MemoryReader for PlatformReader {
        fn sample(&mut self) -> Result<MemorySample, MemoryReadError> {
            let mut usage = MaybeUninit::<libc::rusage>::uninit();
            let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
            if result != 0 {
                return Err(MemoryReadError::SyscallFailed(
                    "getrusage",
                    std::io::Error::last_os_error(),
                ));
            }
            let usage = unsafe { usage.assume_init() };
            let max_rss = usage.ru_maxrss.max(0) as u64;
            Ok(MemorySample::from_bytes(max_rss.saturating_mul(MAXRSS_UNIT)))
        }

        fn metric(&self) -> MemoryMetric {
            MemoryMetric::PeakResident
        }

        fn source(&self) -> &'static str {
            "libc::getrusage"
        }
    }
}

#[cfg(windows)]
mod platform {
    use sysinfo::{Pid, ProcessRefreshKind, System};

    use super::{MemoryMetric, MemoryReadError, MemoryReader, MemorySample};

    /// Working-set size of the current process. `sysinfo` reports
    /// `WorkingSetSize` from the process memory counters as `Process::memory`,
    /// but only refreshes it when the refresh kind asks for memory.
    pub struct PlatformReader {
        system: System,
        pid: Result<Pid, &'static str>,
    }

    impl PlatformReader {
        pub fn new() -> Self {
            PlatformReader {
                system: System::new(),
                pid: sysinfo::get_current_pid(),
            }
        }
    }

    impl Default for PlatformReader {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryReader for PlatformReader {
        fn sample(&mut self) -> Result<MemorySample, MemoryReadError> {
            let pid = self
                .pid
                .map_err(|reason| MemoryReadError::ProcessUnavailable(reason.to_string()))?;
            if !self
                .system
                .refresh_process_specifics(pid, ProcessRefreshKind::new().with_memory())
            {
                return Err(MemoryReadError::ProcessUnavailable(format!(
                    "pid {} not refreshed",
                    pid
                )));
            }
            self.system
                .process(pid)
                .map(|process| MemorySample::from_bytes(process.memory()))
                .ok_or_else(|| MemoryReadError::ProcessUnavailable(format!("pid {} missing", pid)))
        }

        fn metric(&self) -> MemoryMetric {
            MemoryMetric::WorkingSet
        }

        fn source(&self) -> &'static str {
            "sysinfo::process_memory"
        }
    }
}
