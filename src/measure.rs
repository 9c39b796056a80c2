//! Timing and memory instrumentation.

use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// The outcome of a measured call together with its wall-clock duration.
#[derive(Debug)]
pub struct Timed<T> {
    /// Whatever the call returned, errors included.
    pub value: T,
    /// Time from just before the call to just after it returned.
    pub elapsed: Duration,
}

/// Run `operation` once and time it on the monotonic clock.
///
/// The return value is passed through untouched, so a failing operation
/// still yields the time it took to fail.
pub fn measure<T, F>(operation: F) -> Timed<T>
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let value = operation();
    Timed {
        value,
        elapsed: start.elapsed(),
    }
}

/// Point samples of the running process' memory.
pub trait MemoryProbe {
    /// Current resident memory in bytes, if it can be read.
    fn sample(&mut self) -> Option<u64>;

    /// Ask the runtime to reclaim freed memory before the next sample.
    ///
    /// Best effort; the default does nothing.
    fn reclaim(&mut self) {}
}

/// Resident set size of the current process, read through sysinfo.
///
/// Allocations in Rust are returned to the allocator when dropped, and there
/// is no collector to run, so `reclaim` keeps the default no-op.
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    /// Create a probe for the current process.
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| log::warn!("unable to determine own pid: {}", e))
            .ok();

        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemory {
    fn sample(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(|process| process.memory())
    }
}

/// Bytes to mebibytes, for display.
pub fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn measures_elapsed_time() {
        let timed = measure(|| {
            thread::sleep(Duration::from_millis(20));
            7
        });
        assert_eq!(timed.value, 7);
        assert!(timed.elapsed >= Duration::from_millis(20));
    }

    #[test]
    fn errors_pass_through_with_duration() {
        let timed = measure(|| -> Result<(), String> {
            thread::sleep(Duration::from_millis(5));
            Err("boom".to_string())
        });
        assert_eq!(timed.value, Err("boom".to_string()));
        assert!(timed.elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn process_memory_is_nonzero() {
        let mut probe = ProcessMemory::new();
        let bytes = probe.sample().expect("resident memory is readable");
        assert!(bytes > 0);
        probe.reclaim();
    }

    #[test]
    fn megabytes() {
        assert_eq!(to_mb(3 * 1024 * 1024), 3.0);
    }
}
