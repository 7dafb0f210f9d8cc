/*
 * Scheduler Statistics
 *
 * Field set grounded on the original C `sched_stats_t`/`sched_proc_stats_t`.
 * `SharedStats` wraps an owned, explicitly-constructed value in a
 * `spin::Mutex` for callers that want to read stats from outside the
 * context driving `sched_tick`.
 */

use bitflags::bitflags;
use spin::Mutex;

bitflags! {
    /// Selects which fields a diagnostic dump prints for each process.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcDumpFlags: u8 {
        const STATE    = 0b0001;
        const PRIORITY = 0b0010;
        const RUNTIME  = 0b0100;
        const WAITTIME = 0b1000;
        const ALL = Self::STATE.bits() | Self::PRIORITY.bits() | Self::RUNTIME.bits() | Self::WAITTIME.bits();
    }
}

/// Aggregate, dispatcher-wide statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedStats {
    pub total_schedules: u64,
    pub context_switches: u64,
    pub idle_ticks: u64,
    pub busy_ticks: u64,
    pub runnable_count: u32,
    pub preemptions: u32,
    pub voluntary_yields: u32,
    pub quantum_expirations: u64,
}

/// Per-process statistics (original C `sched_proc_stats_t`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcStats {
    pub total_runtime: u64,
    pub total_waittime: u64,
    pub times_scheduled: u32,
    pub last_scheduled: u64,
}

/// `SchedStats`/`ProcStats` behind a lock, for callers driving the
/// dispatcher from one context and reading stats from another.
#[derive(Debug, Default)]
pub struct SharedStats {
    inner: Mutex<SchedStats>,
}

impl SharedStats {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(SchedStats {
                total_schedules: 0,
                context_switches: 0,
                idle_ticks: 0,
                busy_ticks: 0,
                runnable_count: 0,
                preemptions: 0,
                voluntary_yields: 0,
                quantum_expirations: 0,
            }),
        }
    }

    pub fn snapshot(&self) -> SchedStats {
        *self.inner.lock()
    }

    pub fn update(&self, f: impl FnOnce(&mut SchedStats)) {
        f(&mut self.inner.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_stats_round_trips() {
        let s = SharedStats::new();
        s.update(|st| st.total_schedules += 1);
        assert_eq!(s.snapshot().total_schedules, 1);
    }
}
