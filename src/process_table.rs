/*
 * Process Table
 *
 * A fixed-capacity array of process control blocks keyed by identifier;
 * the scheduling core reads `state` and `base_priority`, and writes only
 * `state`. Kept inside this crate, rather than behind a trait, because
 * the Dispatcher owns it directly and shares it with the process
 * subsystem.
 *
 * Grounded on the Process/Thread split in scheduler/process.rs and
 * scheduler/thread.rs, trimmed down to the fields this crate's
 * scheduling core actually reads.
 */

use crate::error::SchedError;

/// Number of process table slots. Matches the fixed-capacity
/// `MAX_THREADS`-style sizing seen elsewhere and the original C
/// reference's `RT_MAX_TASKS` pool sizing.
pub const NPROC: usize = 256;

/// Process identifier. `-1` denotes "none".
pub type Pid = i32;

/// Sentinel for "no process".
pub const NONE_PID: Pid = -1;

/// Process liveness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Free,
    Ready,
    Curr,
    Sleep,
    Wait,
    Susp,
}

/// One process control block.
#[derive(Debug, Clone, Copy)]
pub struct ProcessControlBlock {
    pub state: ProcState,
    pub base_priority: u8,
}

impl ProcessControlBlock {
    const fn free() -> Self {
        Self {
            state: ProcState::Free,
            base_priority: 0,
        }
    }
}

/// Fixed-capacity array of process control blocks, indexed by pid.
pub struct ProcessTable {
    slots: [ProcessControlBlock; NPROC],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            slots: [ProcessControlBlock::free(); NPROC],
        }
    }

    fn index(pid: Pid) -> Result<usize, SchedError> {
        if pid < 0 || pid as usize >= NPROC {
            Err(SchedError::InvalidPid)
        } else {
            Ok(pid as usize)
        }
    }

    /// Register a pid with the given base priority, transitioning it to
    /// `Ready`. Mirrors the original C `sched_new_process(pid)` entry
    /// point, named but unimplemented in the distilled spec's table.
    pub fn create(&mut self, pid: Pid, base_priority: u8) -> Result<(), SchedError> {
        let idx = Self::index(pid)?;
        self.slots[idx] = ProcessControlBlock {
            state: ProcState::Ready,
            base_priority,
        };
        Ok(())
    }

    pub fn state(&self, pid: Pid) -> Option<ProcState> {
        let idx = (pid >= 0 && (pid as usize) < NPROC).then_some(pid as usize)?;
        Some(self.slots[idx].state)
    }

    pub fn base_priority(&self, pid: Pid) -> Option<u8> {
        let idx = (pid >= 0 && (pid as usize) < NPROC).then_some(pid as usize)?;
        Some(self.slots[idx].base_priority)
    }

    /// Validated state write. Returns `FreeSlot` when the pid has never
    /// been `create`d, `InvalidPid` when it's out of range.
    pub fn set_state(&mut self, pid: Pid, state: ProcState) -> Result<(), SchedError> {
        let idx = Self::index(pid)?;
        if self.slots[idx].state == ProcState::Free && state != ProcState::Free {
            return Err(SchedError::FreeSlot);
        }
        self.slots[idx].state = state;
        Ok(())
    }

    pub fn set_base_priority(&mut self, pid: Pid, priority: u8) -> Result<(), SchedError> {
        let idx = Self::index(pid)?;
        if self.slots[idx].state == ProcState::Free {
            return Err(SchedError::FreeSlot);
        }
        self.slots[idx].base_priority = priority;
        Ok(())
    }

    pub fn is_free(&self, pid: Pid) -> bool {
        self.state(pid)
            .map(|s| s == ProcState::Free)
            .unwrap_or(true)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_read_back() {
        let mut t = ProcessTable::new();
        t.create(3, 50).unwrap();
        assert_eq!(t.state(3), Some(ProcState::Ready));
        assert_eq!(t.base_priority(3), Some(50));
    }

    #[test]
    fn out_of_range_pid_is_invalid() {
        let t = ProcessTable::new();
        assert_eq!(t.state(NPROC as Pid), None);
        let mut t = ProcessTable::new();
        assert_eq!(t.set_state(-1, ProcState::Ready), Err(SchedError::InvalidPid));
        assert_eq!(
            t.set_state(NPROC as Pid, ProcState::Ready),
            Err(SchedError::InvalidPid)
        );
    }

    #[test]
    fn free_slot_rejects_state_write() {
        let mut t = ProcessTable::new();
        assert_eq!(t.set_state(5, ProcState::Ready), Err(SchedError::FreeSlot));
    }

    #[test]
    fn free_slot_is_detected() {
        let mut t = ProcessTable::new();
        assert!(t.is_free(7));
        t.create(7, 10).unwrap();
        assert!(!t.is_free(7));
    }
}
