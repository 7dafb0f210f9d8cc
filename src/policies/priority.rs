/*
 * Priority Scheduling Policy
 *
 * Strict priority order with two independent starvation defenses: a
 * periodic global aging pass (every `aging_interval` ticks, every waiter's
 * `current_priority` rises by a fixed amount) and a per-node anti-
 * starvation boost once an individual waiter's `wait_time` exceeds a
 * threshold. Grounded on the original C `priority_insert_ordered` /
 * `priority_age_all` / `priority_check_starvation` / `PRIO_IO_BONUS`
 * (examples/original_source/priority.h); the ready list is a priority-
 * sorted `NodeList` backed by the same pool-allocated free list the
 * original keeps its node storage in, rather than a raw intrusive
 * pointer structure.
 */

use crate::events::SchedEvent;
use crate::pool::NodeList;
use crate::process_table::{Pid, NPROC};
use crate::traits::{DispatchDecision, PolicyCtx, SchedPolicy, TimeSliceTicks};
use crate::PRIORITY_MAX;

/// Boost applied on wake and on an anti-starvation trigger (original C
/// `PRIO_IO_BONUS`).
const PRIO_IO_BONUS: u8 = 5;

/// Default periodic aging interval and per-tick increment.
const DEFAULT_AGING_INTERVAL: u64 = 10;
const DEFAULT_AGING_AMOUNT: u8 = 1;

/// Default ticks a ready waiter tolerates before an individual
/// anti-starvation boost fires, independent of the periodic aging pass.
const DEFAULT_STARVATION_THRESHOLD: u64 = 30;

#[derive(Debug, Clone, Copy)]
struct PrioNode {
    pid: Pid,
    base_priority: u8,
    current_priority: u8,
    wait_time: u64,
}

/// Counters mirroring the original C `prio_stats_t`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityStats {
    pub priority_changes: u32,
    pub aging_boosts: u32,
    pub starvation_boosts: u32,
    pub preemptions: u32,
}

pub struct PriorityPolicy {
    /// Sorted descending by `current_priority`; ties broken by arrival
    /// order (stable insert keeps earlier arrivals ahead of later ones
    /// at the same priority).
    ready: NodeList<PrioNode, NPROC>,
    running: Option<PrioNode>,
    aging_enabled: bool,
    aging_interval: u64,
    aging_amount: u8,
    ticks_since_aging: u64,
    starvation_threshold: u64,
    stats: PriorityStats,
}

impl PriorityPolicy {
    pub fn new() -> Self {
        Self {
            ready: NodeList::new(),
            running: None,
            aging_enabled: true,
            aging_interval: DEFAULT_AGING_INTERVAL,
            aging_amount: DEFAULT_AGING_AMOUNT,
            ticks_since_aging: 0,
            starvation_threshold: DEFAULT_STARVATION_THRESHOLD,
            stats: PriorityStats::default(),
        }
    }

    pub fn stats(&self) -> PriorityStats {
        self.stats
    }

    fn insert_ordered(&mut self, node: PrioNode) {
        let before = self.ready.position(|n| n.current_priority < node.current_priority);
        self.ready.insert_before(before, node);
    }

    fn remove(&mut self, pid: Pid) -> Option<PrioNode> {
        self.ready.remove_by(|n| n.pid == pid)
    }

    fn resort(&mut self) {
        self.ready.sort_by(|a, b| b.current_priority.cmp(&a.current_priority));
    }

    /// Configure the periodic global aging pass.
    pub fn set_aging(&mut self, interval: u64, amount: u8) {
        self.aging_interval = interval.max(1);
        self.aging_amount = amount;
    }

    /// Configure the per-node anti-starvation threshold.
    pub fn set_starvation_threshold(&mut self, threshold: u64) {
        self.starvation_threshold = threshold;
    }
}

impl SchedPolicy for PriorityPolicy {
    fn on_event(&mut self, ctx: &mut dyn PolicyCtx, event: SchedEvent) {
        match event {
            SchedEvent::Created { pid, base_priority } => {
                self.insert_ordered(PrioNode {
                    pid,
                    base_priority,
                    current_priority: base_priority,
                    wait_time: 0,
                });
            }

            SchedEvent::Woke { pid } => {
                let base_priority = ctx.base_priority(pid).unwrap_or(0);
                let boosted = base_priority.saturating_add(PRIO_IO_BONUS).min(PRIORITY_MAX);
                self.insert_ordered(PrioNode {
                    pid,
                    base_priority,
                    current_priority: boosted,
                    wait_time: 0,
                });
            }

            SchedEvent::Yielded { pid: _ } => {
                if let Some(mut node) = self.running.take() {
                    node.wait_time = 0;
                    self.insert_ordered(node);
                }
            }

            SchedEvent::Preempted { pid: _ } => {
                if let Some(mut node) = self.running.take() {
                    node.wait_time = 0;
                    self.insert_ordered(node);
                    self.stats.preemptions += 1;
                }
            }

            SchedEvent::Blocked { pid } | SchedEvent::Exited { pid } => {
                self.remove(pid);
                if self.running.map(|n| n.pid) == Some(pid) {
                    self.running = None;
                }
            }

            SchedEvent::Tick { .. } => {
                if !self.aging_enabled {
                    return;
                }

                self.ticks_since_aging += 1;
                let run_aging = self.ticks_since_aging >= self.aging_interval;
                if run_aging {
                    self.ticks_since_aging = 0;
                }

                let aging_amount = self.aging_amount;
                let starvation_threshold = self.starvation_threshold;
                let mut changed = false;
                let mut starvation_hits = 0u32;
                self.ready.for_each_mut(|node| {
                    if run_aging && node.current_priority < PRIORITY_MAX {
                        node.current_priority =
                            node.current_priority.saturating_add(aging_amount).min(PRIORITY_MAX);
                        changed = true;
                    }

                    node.wait_time += 1;
                    if node.wait_time > starvation_threshold {
                        node.current_priority =
                            node.current_priority.saturating_add(PRIO_IO_BONUS).min(PRIORITY_MAX);
                        node.wait_time = 0;
                        starvation_hits += 1;
                        changed = true;
                    }
                });
                self.stats.starvation_boosts += starvation_hits;
                if run_aging {
                    self.stats.aging_boosts += 1;
                }
                if changed {
                    self.resort();
                }
            }

            SchedEvent::PriorityChanged { pid, new, .. } => {
                let mut hit = false;
                self.ready.for_each_mut(|node| {
                    if node.pid == pid {
                        node.base_priority = new;
                        node.current_priority = new;
                        hit = true;
                    }
                });
                if let Some(node) = self.running.as_mut() {
                    if node.pid == pid {
                        node.base_priority = new;
                        node.current_priority = new;
                        hit = true;
                    }
                }
                if hit {
                    self.stats.priority_changes += 1;
                }
                self.resort();
            }
        }
    }

    fn pick_next(&mut self, ctx: &mut dyn PolicyCtx) -> DispatchDecision {
        if let Some(node) = self.running {
            if ctx.current() == Some(node.pid) && ctx.is_runnable(node.pid) {
                return DispatchDecision::run(node.pid, TimeSliceTicks(ctx.quantum()));
            }
            self.running = None;
        }

        while let Some(node) = self.ready.pop_front() {
            if ctx.is_runnable(node.pid) || ctx.current() == Some(node.pid) {
                self.running = Some(node);
                return DispatchDecision::run(node.pid, TimeSliceTicks(ctx.quantum()));
            }
        }
        DispatchDecision::idle()
    }

    fn on_switched(&mut self, _ctx: &mut dyn PolicyCtx, _prev: Option<Pid>, _next: Option<Pid>) {}

    fn validate(&self, ctx: &dyn PolicyCtx) -> bool {
        let mut sorted = true;
        let mut prev_priority: Option<u8> = None;
        for node in self.ready.iter() {
            if let Some(p) = prev_priority {
                if node.current_priority > p {
                    sorted = false;
                }
            }
            prev_priority = Some(node.current_priority);
        }
        let all_runnable = self.ready.iter().all(|n| ctx.is_runnable(n.pid));
        sorted && all_runnable
    }

    fn set_priority(&mut self, _ctx: &mut dyn PolicyCtx, pid: Pid, priority: u8) -> bool {
        let mut hit = false;
        self.ready.for_each_mut(|node| {
            if node.pid == pid {
                node.base_priority = priority;
                node.current_priority = priority;
                hit = true;
            }
        });
        if let Some(node) = self.running.as_mut() {
            if node.pid == pid {
                node.base_priority = priority;
                node.current_priority = priority;
                hit = true;
            }
        }
        if hit {
            self.resort();
        }
        hit
    }

    fn get_priority(&self, pid: Pid) -> Option<u8> {
        self.ready
            .iter()
            .find(|n| n.pid == pid)
            .or_else(|| self.running.iter().find(|n| n.pid == pid))
            .map(|n| n.current_priority)
    }

    fn name(&self) -> &'static str {
        "priority"
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NullContextSwitcher;
    use crate::dispatcher::Dispatcher;
    use crate::PolicyKind;
    use alloc::boxed::Box;

    #[test]
    fn highest_priority_runs_first() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.init(PolicyKind::Priority);
        d.sched_ready(1, 10);
        d.sched_ready(2, 90);
        d.sched_ready(3, 50);
        assert_eq!(d.schedule(), Some(2));
    }

    #[test]
    fn redundant_schedule_call_does_not_reorder_ready_list() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.init(PolicyKind::Priority);
        d.sched_ready(1, 90);
        d.sched_ready(2, 50);
        assert_eq!(d.schedule(), Some(1));

        // setpriority() on the running pid unconditionally requests a
        // reschedule; it must not be mistaken for a yield/preempt.
        d.setpriority(1, 91).unwrap();
        assert_eq!(d.schedule(), Some(1));
        assert_eq!(d.schedule(), Some(1));
    }

    #[test]
    fn waking_gets_io_bonus() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.init(PolicyKind::Priority);
        d.sched_ready(1, 10);
        d.sched_block(1);
        d.sched_wakeup(1);
        assert_eq!(d.getpriority(1), Ok(15));
    }

    struct TestCtx {
        table: crate::process_table::ProcessTable,
        current: Option<Pid>,
    }

    impl PolicyCtx for TestCtx {
        fn proc_state(&self, pid: Pid) -> Option<crate::process_table::ProcState> {
            self.table.state(pid)
        }
        fn is_runnable(&self, pid: Pid) -> bool {
            matches!(
                self.table.state(pid),
                Some(crate::process_table::ProcState::Ready)
                    | Some(crate::process_table::ProcState::Curr)
            )
        }
        fn current(&self) -> Option<Pid> {
            self.current
        }
        fn base_priority(&self, pid: Pid) -> Option<u8> {
            self.table.base_priority(pid)
        }
        fn now_ticks(&self) -> u64 {
            0
        }
        fn quantum(&self) -> u32 {
            10
        }
        fn make_ready(&mut self, _pid: Pid) {}
        fn make_current(&mut self, _pid: Pid) {}
        fn request_resched(&mut self) {}
        fn note_quantum_expired(&mut self) {}
        fn log(&self, _level: log::Level, _message: &str) {}
    }

    #[test]
    fn periodic_aging_boosts_every_waiter() {
        let mut p = PriorityPolicy::new();
        p.aging_interval = 3;
        p.aging_amount = 1;
        p.starvation_threshold = 1_000_000; // isolate the periodic pass

        let mut table = crate::process_table::ProcessTable::new();
        table.create(1, 10).unwrap();
        let mut ctx = TestCtx {
            table,
            current: None,
        };

        p.on_event(&mut ctx, SchedEvent::Created { pid: 1, base_priority: 10 });
        assert_eq!(p.get_priority(1), Some(10));

        for _ in 0..3 {
            p.on_event(&mut ctx, SchedEvent::Tick { now: 0 });
        }
        assert_eq!(p.get_priority(1), Some(11));
    }

    #[test]
    fn starvation_boost_fires_independent_of_aging() {
        let mut p = PriorityPolicy::new();
        p.aging_interval = 1_000_000; // isolate the starvation pass
        p.starvation_threshold = 2;

        let mut table = crate::process_table::ProcessTable::new();
        table.create(1, 10).unwrap();
        let mut ctx = TestCtx {
            table,
            current: None,
        };

        p.on_event(&mut ctx, SchedEvent::Created { pid: 1, base_priority: 10 });
        for _ in 0..3 {
            p.on_event(&mut ctx, SchedEvent::Tick { now: 0 });
        }
        assert_eq!(p.get_priority(1), Some(15));
    }
}
