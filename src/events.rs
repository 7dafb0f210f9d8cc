/*
 * Scheduler Event Definitions
 *
 * The Dispatcher translates kernel-facing operations into these events
 * and forwards them to the active policy via `SchedPolicy::on_event`.
 */

use crate::process_table::Pid;

/// Events the dispatcher reports to the active policy.
#[derive(Debug, Clone, Copy)]
pub enum SchedEvent {
    /// A new process was registered and is ready to run.
    Created { pid: Pid, base_priority: u8 },
    /// A waiting/sleeping process became runnable.
    Woke { pid: Pid },
    /// The running process voluntarily gave up the CPU.
    Yielded { pid: Pid },
    /// The running process was forced off the CPU (not a quantum expiry).
    Preempted { pid: Pid },
    /// A process blocked (moved to `Wait`/`Susp`).
    Blocked { pid: Pid },
    /// A process exited.
    Exited { pid: Pid },
    /// Timer interrupt tick.
    Tick { now: u64 },
    /// A process's priority changed externally (`setpriority`/`nice`).
    PriorityChanged { pid: Pid, old: u8, new: u8 },
}

impl SchedEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SchedEvent::Created { .. } => "Created",
            SchedEvent::Woke { .. } => "Woke",
            SchedEvent::Yielded { .. } => "Yielded",
            SchedEvent::Preempted { .. } => "Preempted",
            SchedEvent::Blocked { .. } => "Blocked",
            SchedEvent::Exited { .. } => "Exited",
            SchedEvent::Tick { .. } => "Tick",
            SchedEvent::PriorityChanged { .. } => "PriorityChanged",
        }
    }
}
