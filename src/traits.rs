/*
 * Scheduler Trait Definitions
 *
 * Splits the policy interface (`SchedPolicy`, implemented by each of the
 * six algorithms) from the mechanism capability (`PolicyCtx`), which is
 * the only way a policy can query or mutate dispatcher/process-table
 * state — keeping policies from touching the process table directly.
 */

use crate::events::SchedEvent;
use crate::process_table::{Pid, ProcState};

/// Time slice duration in timer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSliceTicks(pub u32);

impl TimeSliceTicks {
    pub const DEFAULT: TimeSliceTicks = TimeSliceTicks(10);
}

/// A scheduling decision returned by `SchedPolicy::pick_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDecision {
    /// pid to run next, or `None` to idle.
    pub next: Option<Pid>,
    pub timeslice: TimeSliceTicks,
}

impl DispatchDecision {
    pub fn run(pid: Pid, timeslice: TimeSliceTicks) -> Self {
        Self {
            next: Some(pid),
            timeslice,
        }
    }

    pub fn idle() -> Self {
        Self {
            next: None,
            timeslice: TimeSliceTicks::DEFAULT,
        }
    }
}

/// Capability boundary between a policy and the dispatcher/process table.
///
/// Policies reach kernel state only through this trait, matching the
/// teacher's `KernelSchedCtx` — it doubles as documentation of exactly
/// what a policy is allowed to see or mutate.
pub trait PolicyCtx {
    /// Current process table state of `pid`, if it exists.
    fn proc_state(&self, pid: Pid) -> Option<ProcState>;
    /// `true` when `pid` exists and is `Ready` or `Curr`.
    fn is_runnable(&self, pid: Pid) -> bool;
    /// The pid currently occupying the CPU, if any.
    fn current(&self) -> Option<Pid>;
    /// Base priority recorded in the process table.
    fn base_priority(&self, pid: Pid) -> Option<u8>;
    /// Current monotonic tick count.
    fn now_ticks(&self) -> u64;
    /// Configured Round-Robin-style quantum (dispatcher cross-cutting
    /// state).
    fn quantum(&self) -> u32;

    /// Transition `pid` to `Ready` in the process table.
    fn make_ready(&mut self, pid: Pid);
    /// Transition `pid` to `Curr` in the process table.
    fn make_current(&mut self, pid: Pid);
    /// Ask the dispatcher to reschedule at the next opportunity.
    fn request_resched(&mut self);
    /// Record that the running pid was retired for exhausting its
    /// allotted timeslice, as opposed to blocking, yielding, or being
    /// preempted by a priority change.
    fn note_quantum_expired(&mut self);
    /// Route a diagnostic line through the console log sink.
    fn log(&self, level: log::Level, message: &str);
}

/// A scheduling policy: Round-Robin, Priority, MLFQ, Lottery, CFS, or
/// Real-Time. Exactly one is active in a `Dispatcher` at a time.
pub trait SchedPolicy: Send {
    /// React to a scheduling event, updating internal ready structures.
    fn on_event(&mut self, ctx: &mut dyn PolicyCtx, event: SchedEvent);

    /// Choose the next pid to run (or `None` to idle).
    fn pick_next(&mut self, ctx: &mut dyn PolicyCtx) -> DispatchDecision;

    /// Notification that a context switch from `prev` to `next` completed.
    fn on_switched(&mut self, ctx: &mut dyn PolicyCtx, prev: Option<Pid>, next: Option<Pid>);

    /// Validate this policy's internal invariants.
    fn validate(&self, ctx: &dyn PolicyCtx) -> bool;

    /// Update `pid`'s priority. Returns `false` when the policy has no
    /// notion of external priority control (e.g. Real-Time).
    fn set_priority(&mut self, ctx: &mut dyn PolicyCtx, pid: Pid, priority: u8) -> bool;

    /// Read back a policy-interpreted priority for `pid`.
    fn get_priority(&self, pid: Pid) -> Option<u8>;

    /// Short, stable name for diagnostics.
    fn name(&self) -> &'static str;

    /// Downcast escape hatch for policy-specific APIs that don't belong on
    /// the uniform interface (e.g. Lottery's direct ticket control).
    fn as_any_mut(&mut self) -> &mut dyn core::any::Any;
}
