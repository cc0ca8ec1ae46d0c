//! Memory pressure back-off (A4, spec §4.6 phase 6 / §5): a periodic
//! heap-watermark sample shared by parsing, carrier discovery, and flow
//! tracing. There is no GC to force in Rust, so "force a major collection"
//! becomes "resample RSS now" — the monitor still only samples every
//! `SAMPLE_INTERVAL` calls rather than on every tick, to keep the `sysinfo`
//! refresh off the hot path.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sysinfo::{Pid, System};

const SAMPLE_INTERVAL: usize = 20;

pub struct MemoryMonitor {
    system: Mutex<System>,
    pid: Pid,
    cap_bytes: u64,
    ticks: AtomicUsize,
    last_sample_bytes: AtomicU64,
    tripped: std::sync::atomic::AtomicBool,
}

impl MemoryMonitor {
    pub fn new(max_memory_mb: u64) -> Self {
        let pid = Pid::from_u32(std::process::id());
        Self {
            system: Mutex::new(System::new()),
            pid,
            cap_bytes: max_memory_mb * 1024 * 1024,
            ticks: AtomicUsize::new(0),
            last_sample_bytes: AtomicU64::new(0),
            tripped: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Call once per file/source processed. Resamples every
    /// `SAMPLE_INTERVAL` calls; returns `true` once the cap has been
    /// exceeded, at which point the caller must stop processing further
    /// work in the current phase and return partial results.
    pub fn tick(&self) -> bool {
        if self.tripped.load(Ordering::Relaxed) {
            return true;
        }
        let count = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if count % SAMPLE_INTERVAL != 0 {
            return false;
        }

        let mut system = self.system.lock();
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        let Some(process) = system.process(self.pid) else { return false };
        let used = process.memory();
        self.last_sample_bytes.store(used, Ordering::Relaxed);

        if used > self.cap_bytes {
            self.tripped.store(true, Ordering::Relaxed);
            tracing::warn!(used_mb = used / 1024 / 1024, cap_mb = self.cap_bytes / 1024 / 1024, "memory pressure: shedding remaining work");
            true
        } else {
            false
        }
    }

    pub fn has_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }

    pub fn last_sample_mb(&self) -> u64 {
        self.last_sample_bytes.load(Ordering::Relaxed) / 1024 / 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_trip_under_a_generous_cap() {
        let monitor = MemoryMonitor::new(u64::MAX / (1024 * 1024));
        for _ in 0..SAMPLE_INTERVAL + 1 {
            assert!(!monitor.tick());
        }
        assert!(!monitor.has_tripped());
    }

    #[test]
    fn trips_immediately_under_a_zero_cap() {
        let monitor = MemoryMonitor::new(0);
        for _ in 0..SAMPLE_INTERVAL {
            monitor.tick();
        }
        assert!(monitor.has_tripped());
    }
}
