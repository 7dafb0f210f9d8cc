/*
 * Dispatcher — Mechanism Layer
 *
 * Holds the active policy (`Box<dyn SchedPolicy>`), translates every
 * public operation into a `SchedEvent`, and drives context switches based
 * on the `DispatchDecision`s the policy returns. `Dispatcher` is the one
 * stable surface the rest of a kernel (or a test) talks to.
 *
 * All scheduler state is packaged into this single owned value — there
 * is no global/static scheduler instance, and callers construct as many
 * `Dispatcher`s as they like.
 */

use alloc::boxed::Box;
use core::fmt::Write;

use crate::context::ContextSwitcher;
use crate::error::SchedError;
use crate::events::SchedEvent;
use crate::policies;
use crate::process_table::{Pid, ProcState, ProcessTable, NPROC};
use crate::stats::{ProcDumpFlags, ProcStats, SchedStats};
use crate::traits::{DispatchDecision, PolicyCtx, SchedPolicy};
use crate::{PolicyKind, DEFAULT_QUANTUM, MAX_QUANTUM, MIN_QUANTUM, PRIORITY_MAX, PRIORITY_MIN};

/// Borrowed view of dispatcher state that implements `PolicyCtx`,
/// constructed fresh for each call into the active policy so that a
/// policy can never outlive or alias the fields it was lent.
struct DispatcherCtx<'a> {
    table: &'a mut ProcessTable,
    current: &'a mut Option<Pid>,
    need_resched: &'a mut bool,
    quantum_expirations: &'a mut u64,
    tick: u64,
    quantum: u32,
}

impl PolicyCtx for DispatcherCtx<'_> {
    fn proc_state(&self, pid: Pid) -> Option<ProcState> {
        self.table.state(pid)
    }

    fn is_runnable(&self, pid: Pid) -> bool {
        matches!(
            self.table.state(pid),
            Some(ProcState::Ready) | Some(ProcState::Curr)
        )
    }

    fn current(&self) -> Option<Pid> {
        *self.current
    }

    fn base_priority(&self, pid: Pid) -> Option<u8> {
        self.table.base_priority(pid)
    }

    fn now_ticks(&self) -> u64 {
        self.tick
    }

    fn quantum(&self) -> u32 {
        self.quantum
    }

    fn make_ready(&mut self, pid: Pid) {
        let _ = self.table.set_state(pid, ProcState::Ready);
    }

    fn make_current(&mut self, pid: Pid) {
        let _ = self.table.set_state(pid, ProcState::Curr);
    }

    fn request_resched(&mut self) {
        *self.need_resched = true;
    }

    fn note_quantum_expired(&mut self) {
        *self.quantum_expirations += 1;
    }

    fn log(&self, level: log::Level, message: &str) {
        log::log!(level, "{}", message);
    }
}

/// The scheduling core. One instance owns one process table, one active
/// policy, and all cross-cutting mechanism state.
pub struct Dispatcher {
    process_table: ProcessTable,
    policy: Option<Box<dyn SchedPolicy>>,
    policy_kind: Option<PolicyKind>,
    context_switcher: Box<dyn ContextSwitcher>,

    current: Option<Pid>,
    need_resched: bool,
    system_ticks: u64,
    quantum: u32,

    /// Save/restore nesting primitive standing in for the external
    /// interrupt-masking collaborator.
    interrupts_enabled: bool,

    stats: SchedStats,
    proc_stats: [ProcStats; NPROC],
}

impl Dispatcher {
    /// Construct an uninitialized dispatcher. `schedule()` is a no-op
    /// until `init` installs a policy.
    pub fn new(context_switcher: Box<dyn ContextSwitcher>) -> Self {
        Self {
            process_table: ProcessTable::new(),
            policy: None,
            policy_kind: None,
            context_switcher,
            current: None,
            need_resched: false,
            system_ticks: 0,
            quantum: DEFAULT_QUANTUM,
            interrupts_enabled: true,
            stats: SchedStats::default(),
            proc_stats: [ProcStats::default(); NPROC],
        }
    }

    /// Enter a critical section, returning the prior interrupt-enabled
    /// state so the caller can restore it (nests by save/restore).
    fn enter_critical(&mut self) -> bool {
        let prev = self.interrupts_enabled;
        self.interrupts_enabled = false;
        prev
    }

    fn exit_critical(&mut self, prev: bool) {
        self.interrupts_enabled = prev;
    }

    fn ctx(&mut self) -> DispatcherCtx<'_> {
        DispatcherCtx {
            table: &mut self.process_table,
            current: &mut self.current,
            need_resched: &mut self.need_resched,
            quantum_expirations: &mut self.stats.quantum_expirations,
            tick: self.system_ticks,
            quantum: self.quantum,
        }
    }

    fn valid_pid(&self, pid: Pid) -> bool {
        pid >= 0 && (pid as usize) < NPROC
    }

    // ========================================================================
    // Policy install / switch / introspection
    // ========================================================================

    /// Install and start `kind` as the active policy.
    pub fn init(&mut self, kind: PolicyKind) {
        let prev = self.enter_critical();
        self.policy = Some(policies::make(kind));
        self.policy_kind = Some(kind);
        self.repopulate_ready_set();
        self.exit_critical(prev);
    }

    /// Tear down the current policy and install `kind`, preserving
    /// aggregate stats and re-enqueueing every currently-Ready/Curr pid
    /// into the new policy's ready structures.
    pub fn switch(&mut self, kind: PolicyKind) {
        let prev = self.enter_critical();
        self.policy = Some(policies::make(kind));
        self.policy_kind = Some(kind);
        self.repopulate_ready_set();
        self.exit_critical(prev);
    }

    fn repopulate_ready_set(&mut self) {
        let Some(policy) = self.policy.as_mut() else {
            return;
        };
        for pid in 0..NPROC as Pid {
            if matches!(
                self.process_table.state(pid),
                Some(ProcState::Ready) | Some(ProcState::Curr)
            ) {
                let base_priority = self.process_table.base_priority(pid).unwrap_or(PRIORITY_MIN);
                let mut ctx = DispatcherCtx {
                    table: &mut self.process_table,
                    current: &mut self.current,
                    need_resched: &mut self.need_resched,
                    quantum_expirations: &mut self.stats.quantum_expirations,
                    tick: self.system_ticks,
                    quantum: self.quantum,
                };
                policy.on_event(&mut ctx, SchedEvent::Created { pid, base_priority });
            }
        }
    }

    pub fn policy_name(&self) -> Option<&'static str> {
        self.policy.as_ref().map(|p| p.name())
    }

    pub fn policy_kind(&self) -> Option<PolicyKind> {
        self.policy_kind
    }

    /// Downcast the active policy to a concrete type for policy-specific
    /// APIs (e.g. Lottery's direct ticket control) that don't belong on
    /// the uniform `SchedPolicy` interface.
    pub fn policy_as<T: 'static>(&mut self) -> Option<&mut T> {
        self.policy.as_mut()?.as_any_mut().downcast_mut::<T>()
    }

    // ========================================================================
    // schedule / resched / yield / preempt
    // ========================================================================

    /// Clear `need_resched`, ask the policy for a decision, and context
    /// switch if the chosen pid differs from the current one. No-op when
    /// uninitialized.
    pub fn schedule(&mut self) -> Option<Pid> {
        let Some(mut policy) = self.policy.take() else {
            return self.current;
        };
        let prev_cs = self.enter_critical();
        self.need_resched = false;

        let prev = self.current;
        let decision: DispatchDecision = {
            let mut ctx = self.ctx();
            policy.pick_next(&mut ctx)
        };

        if decision.next != prev {
            if let Some(pid) = prev {
                if self.process_table.state(pid) == Some(ProcState::Curr) {
                    self.process_table.set_state(pid, ProcState::Ready).ok();
                }
            }
            self.context_switcher
                .context_switch(prev.unwrap_or(-1), decision.next.unwrap_or(-1));
            self.current = decision.next;
            if let Some(pid) = decision.next {
                self.process_table
                    .set_state(pid, ProcState::Curr)
                    .ok();
                if self.valid_pid(pid) {
                    self.proc_stats[pid as usize].times_scheduled += 1;
                    self.proc_stats[pid as usize].last_scheduled = self.system_ticks;
                }
            }
            self.stats.context_switches += 1;
            {
                let mut ctx = self.ctx();
                policy.on_switched(&mut ctx, prev, decision.next);
            }
        }
        self.stats.total_schedules += 1;

        self.policy = Some(policy);
        self.exit_critical(prev_cs);
        self.current
    }

    /// Set `need_resched` and immediately call `schedule()`.
    pub fn resched(&mut self) -> Option<Pid> {
        self.need_resched = true;
        self.schedule()
    }

    /// Voluntary yield: the current pid gives up the CPU.
    pub fn yield_now(&mut self) -> Option<Pid> {
        let Some(pid) = self.current else {
            return self.schedule();
        };
        self.stats.voluntary_yields += 1;
        self.process_table.set_state(pid, ProcState::Ready).ok();
        self.dispatch_event(SchedEvent::Yielded { pid });
        self.resched()
    }

    /// Forced reschedule (e.g. higher-priority pid became runnable).
    pub fn preempt(&mut self) -> Option<Pid> {
        if let Some(pid) = self.current {
            self.stats.preemptions += 1;
            self.process_table.set_state(pid, ProcState::Ready).ok();
            self.dispatch_event(SchedEvent::Preempted { pid });
        }
        self.resched()
    }

    fn dispatch_event(&mut self, event: SchedEvent) {
        let Some(mut policy) = self.policy.take() else {
            return;
        };
        {
            let mut ctx = self.ctx();
            policy.on_event(&mut ctx, event);
        }
        self.policy = Some(policy);
    }

    // ========================================================================
    // Lifecycle hooks (silent on an unknown pid)
    // ========================================================================

    /// Register `pid` as ready to run, creating it in the process table on
    /// first use. Silent no-op on an out-of-range pid.
    pub fn sched_ready(&mut self, pid: Pid, base_priority: u8) {
        if !self.valid_pid(pid) {
            return;
        }
        if self.process_table.is_free(pid) {
            self.process_table.create(pid, base_priority).ok();
        } else {
            self.process_table.set_state(pid, ProcState::Ready).ok();
        }
        self.dispatch_event(SchedEvent::Created { pid, base_priority });
    }

    /// Move `pid` to `Wait`. Silent no-op on bad/free pid.
    pub fn sched_block(&mut self, pid: Pid) {
        if !self.valid_pid(pid) || self.process_table.is_free(pid) {
            return;
        }
        self.process_table.set_state(pid, ProcState::Wait).ok();
        if self.current == Some(pid) {
            self.current = None;
            self.need_resched = true;
        }
        self.dispatch_event(SchedEvent::Blocked { pid });
    }

    /// Move `pid` from a waiting state back to `Ready`. Silent no-op on
    /// bad/free pid.
    pub fn sched_wakeup(&mut self, pid: Pid) {
        if !self.valid_pid(pid) || self.process_table.is_free(pid) {
            return;
        }
        self.process_table.set_state(pid, ProcState::Ready).ok();
        self.dispatch_event(SchedEvent::Woke { pid });
    }

    /// Terminate `pid`, freeing its process table slot. Silent no-op on
    /// bad/free pid.
    pub fn sched_exit(&mut self, pid: Pid) {
        if !self.valid_pid(pid) || self.process_table.is_free(pid) {
            return;
        }
        self.dispatch_event(SchedEvent::Exited { pid });
        self.process_table.set_state(pid, ProcState::Free).ok();
        if self.current == Some(pid) {
            self.current = None;
            self.need_resched = true;
        }
    }

    // ========================================================================
    // Priority control
    // ========================================================================

    pub fn setpriority(&mut self, pid: Pid, priority: u8) -> Result<(), SchedError> {
        if !self.valid_pid(pid) {
            return Err(SchedError::InvalidPid);
        }
        if self.process_table.is_free(pid) {
            return Err(SchedError::FreeSlot);
        }
        let clamped = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        let old = self.process_table.base_priority(pid).unwrap_or(PRIORITY_MIN);
        self.process_table.set_base_priority(pid, clamped).ok();

        if let Some(mut policy) = self.policy.take() {
            {
                let mut ctx = self.ctx();
                policy.set_priority(&mut ctx, pid, clamped);
            }
            self.policy = Some(policy);
        }
        self.dispatch_event(SchedEvent::PriorityChanged {
            pid,
            old,
            new: clamped,
        });

        let is_ready_or_current = matches!(
            self.process_table.state(pid),
            Some(ProcState::Ready) | Some(ProcState::Curr)
        );
        if is_ready_or_current {
            self.need_resched = true;
        }
        Ok(())
    }

    pub fn getpriority(&self, pid: Pid) -> Result<u8, SchedError> {
        if !self.valid_pid(pid) {
            return Err(SchedError::InvalidPid);
        }
        if self.process_table.is_free(pid) {
            return Err(SchedError::FreeSlot);
        }
        if let Some(policy) = self.policy.as_ref() {
            if let Some(p) = policy.get_priority(pid) {
                return Ok(p);
            }
        }
        Ok(self.process_table.base_priority(pid).unwrap_or(PRIORITY_MIN))
    }

    /// Adjust the current pid's priority by `delta` (negative raises
    /// importance, matching POSIX `nice` sign convention inverted onto
    /// this scheduler's "higher number = more important" scale is left to
    /// the caller; this just clamps and applies the signed delta).
    pub fn nice(&mut self, delta: i32) -> Result<u8, SchedError> {
        let pid = self.current.ok_or(SchedError::InvalidPid)?;
        let current = self.getpriority(pid)?;
        let next = (current as i32 + delta).clamp(PRIORITY_MIN as i32, PRIORITY_MAX as i32) as u8;
        self.setpriority(pid, next)?;
        Ok(next)
    }

    // ========================================================================
    // Quantum control
    // ========================================================================

    pub fn sched_set_quantum(&mut self, quantum: u32) {
        self.quantum = quantum.clamp(MIN_QUANTUM, MAX_QUANTUM);
    }

    pub fn sched_get_quantum(&self) -> u32 {
        self.quantum
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Per-timer-interrupt entry point. Returns whether a reschedule is
    /// now pending.
    pub fn sched_tick(&mut self) -> bool {
        let prev_cs = self.enter_critical();
        self.system_ticks += 1;
        if let Some(pid) = self.current {
            if self.valid_pid(pid) {
                self.proc_stats[pid as usize].total_runtime += 1;
            }
            self.stats.busy_ticks += 1;
        } else {
            self.stats.idle_ticks += 1;
        }
        for pid in 0..NPROC as Pid {
            if self.current == Some(pid) {
                continue;
            }
            if self.process_table.state(pid) == Some(ProcState::Ready) {
                self.proc_stats[pid as usize].total_waittime += 1;
            }
        }
        let now = self.system_ticks;
        self.dispatch_event(SchedEvent::Tick { now });
        self.exit_critical(prev_cs);
        self.need_resched
    }

    pub fn now_ticks(&self) -> u64 {
        self.system_ticks
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn need_resched(&self) -> bool {
        self.need_resched
    }

    // ========================================================================
    // Observability
    // ========================================================================

    pub fn sched_get_stats(&self) -> SchedStats {
        let mut stats = self.stats;
        stats.runnable_count = (0..NPROC as Pid)
            .filter(|&pid| {
                matches!(
                    self.process_table.state(pid),
                    Some(ProcState::Ready) | Some(ProcState::Curr)
                )
            })
            .count() as u32;
        stats
    }

    pub fn sched_get_proc_stats(&self, pid: Pid) -> Option<ProcStats> {
        if !self.valid_pid(pid) {
            return None;
        }
        Some(self.proc_stats[pid as usize])
    }

    pub fn sched_reset_stats(&mut self) {
        self.stats = SchedStats::default();
        self.proc_stats = [ProcStats::default(); NPROC];
    }

    /// Format a human-readable stats table through the console log sink.
    pub fn sched_print_stats(&self) {
        let stats = self.sched_get_stats();
        log::info!(
            "policy={} ticks={} schedules={} switches={} runnable={} preempt={} yields={}",
            self.policy_name().unwrap_or("none"),
            self.system_ticks,
            stats.total_schedules,
            stats.context_switches,
            stats.runnable_count,
            stats.preemptions,
            stats.voluntary_yields,
        );
    }

    /// Log one line per live process, restricted to the fields `flags`
    /// selects.
    pub fn sched_dump(&self, flags: ProcDumpFlags) {
        for pid in 0..NPROC as Pid {
            if self.process_table.is_free(pid) {
                continue;
            }
            let mut line: heapless::String<96> = heapless::String::new();
            let _ = write!(line, "pid={pid}");
            if flags.contains(ProcDumpFlags::STATE) {
                let _ = write!(line, " state={:?}", self.process_table.state(pid));
            }
            if flags.contains(ProcDumpFlags::PRIORITY) {
                let _ = write!(
                    line,
                    " base_priority={}",
                    self.process_table.base_priority(pid).unwrap_or(0)
                );
            }
            if flags.contains(ProcDumpFlags::RUNTIME) {
                let _ = write!(line, " runtime={}", self.proc_stats[pid as usize].total_runtime);
            }
            if flags.contains(ProcDumpFlags::WAITTIME) {
                let _ = write!(line, " waittime={}", self.proc_stats[pid as usize].total_waittime);
            }
            log::info!("{}", line);
        }
    }

    pub fn sched_validate(&self) -> bool {
        match self.policy.as_ref() {
            Some(policy) => {
                let ctx = DispatcherCtxRo {
                    table: &self.process_table,
                    current: self.current,
                    tick: self.system_ticks,
                    quantum: self.quantum,
                };
                policy.validate(&ctx)
            }
            None => true,
        }
    }
}

/// Read-only counterpart of `DispatcherCtx`, used only by `sched_validate`
/// (validation never mutates).
struct DispatcherCtxRo<'a> {
    table: &'a ProcessTable,
    current: Option<Pid>,
    tick: u64,
    quantum: u32,
}

impl PolicyCtx for DispatcherCtxRo<'_> {
    fn proc_state(&self, pid: Pid) -> Option<ProcState> {
        self.table.state(pid)
    }

    fn is_runnable(&self, pid: Pid) -> bool {
        matches!(
            self.table.state(pid),
            Some(ProcState::Ready) | Some(ProcState::Curr)
        )
    }

    fn current(&self) -> Option<Pid> {
        self.current
    }

    fn base_priority(&self, pid: Pid) -> Option<u8> {
        self.table.base_priority(pid)
    }

    fn now_ticks(&self) -> u64 {
        self.tick
    }

    fn quantum(&self) -> u32 {
        self.quantum
    }

    fn make_ready(&mut self, _pid: Pid) {}
    fn make_current(&mut self, _pid: Pid) {}
    fn request_resched(&mut self) {}
    fn note_quantum_expired(&mut self) {}

    fn log(&self, level: log::Level, message: &str) {
        log::log!(level, "{}", message);
    }
}
