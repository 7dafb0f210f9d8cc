/*
 * Round-Robin Scheduling Policy
 *
 * FIFO ready queue with an equal, configurable timeslice for every pid,
 * trimmed of any boot-mode handling (this crate has no notion of a
 * boot/normal scheduler mode), with quantum expiry added from the
 * original C `rr_node_t.time_remaining` / `round_robin_tick`
 * (examples/original_source/round_robin.h).
 */

use crate::events::SchedEvent;
use crate::pool::NodeList;
use crate::process_table::{Pid, NPROC};
use crate::traits::{DispatchDecision, PolicyCtx, SchedPolicy, TimeSliceTicks};

/// Counters mirroring the original C `rr_stats_t`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RrStats {
    pub total_processes: u64,
    pub total_context_switches: u64,
    pub total_quantum_expires: u64,
    pub max_queue_length: u32,
}

pub struct RoundRobinPolicy {
    ready_queue: NodeList<Pid, NPROC>,
    /// The pid `pick_next` last handed out, if it's still entitled to run.
    running: Option<Pid>,
    /// Ticks the current pid has run within its slice; reset on rotation.
    ticks_in_slice: u32,
    stats: RrStats,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self {
            ready_queue: NodeList::new(),
            running: None,
            ticks_in_slice: 0,
            stats: RrStats::default(),
        }
    }

    pub fn stats(&self) -> RrStats {
        self.stats
    }

    fn enqueue_if_absent(&mut self, pid: Pid) {
        if self.running != Some(pid) && !self.ready_queue.contains(|&p| p == pid) {
            self.ready_queue.push_back(pid);
            self.stats.max_queue_length = self.stats.max_queue_length.max(self.ready_queue.len() as u32);
        }
    }
}

impl SchedPolicy for RoundRobinPolicy {
    fn on_event(&mut self, ctx: &mut dyn PolicyCtx, event: SchedEvent) {
        match event {
            SchedEvent::Created { pid, .. } => {
                self.stats.total_processes += 1;
                self.enqueue_if_absent(pid);
            }

            SchedEvent::Woke { pid } => self.enqueue_if_absent(pid),

            SchedEvent::Yielded { pid } | SchedEvent::Preempted { pid } => {
                if self.running == Some(pid) {
                    self.running = None;
                }
                self.enqueue_if_absent(pid);
            }

            SchedEvent::Blocked { pid } | SchedEvent::Exited { pid } => {
                if self.running == Some(pid) {
                    self.running = None;
                }
                self.ready_queue.retain(|&p| p != pid);
            }

            SchedEvent::Tick { .. } => {
                if let Some(pid) = ctx.current() {
                    self.ticks_in_slice += 1;
                    if self.ticks_in_slice >= ctx.quantum() {
                        self.ticks_in_slice = 0;
                        self.stats.total_quantum_expires += 1;
                        ctx.note_quantum_expired();
                        if self.running == Some(pid) {
                            self.running = None;
                            self.enqueue_if_absent(pid);
                        }
                        ctx.request_resched();
                    }
                }
            }

            SchedEvent::PriorityChanged { .. } => {}
        }
    }

    fn pick_next(&mut self, ctx: &mut dyn PolicyCtx) -> DispatchDecision {
        if let Some(pid) = self.running {
            if ctx.current() == Some(pid) && ctx.is_runnable(pid) {
                return DispatchDecision::run(pid, TimeSliceTicks(ctx.quantum()));
            }
            self.running = None;
        }

        let attempts = self.ready_queue.len();
        for _ in 0..attempts {
            let Some(pid) = self.ready_queue.pop_front() else {
                break;
            };
            if ctx.is_runnable(pid) || ctx.current() == Some(pid) {
                self.running = Some(pid);
                self.ticks_in_slice = 0;
                return DispatchDecision::run(pid, TimeSliceTicks(ctx.quantum()));
            }
            // Not runnable (e.g. raced with a Block): drop it, it rejoins
            // the queue via Woke when it becomes runnable again.
        }
        DispatchDecision::idle()
    }

    fn on_switched(&mut self, _ctx: &mut dyn PolicyCtx, _prev: Option<Pid>, next: Option<Pid>) {
        if next.is_some() {
            self.stats.total_context_switches += 1;
        }
    }

    fn validate(&self, ctx: &dyn PolicyCtx) -> bool {
        let queue_ok = self.ready_queue.iter().all(|&pid| ctx.is_runnable(pid));
        let running_ok = self
            .running
            .map(|pid| ctx.is_runnable(pid) && ctx.current() == Some(pid))
            .unwrap_or(true);
        queue_ok && running_ok
    }

    fn set_priority(&mut self, _ctx: &mut dyn PolicyCtx, _pid: Pid, _priority: u8) -> bool {
        false
    }

    fn get_priority(&self, _pid: Pid) -> Option<u8> {
        None
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::context::NullContextSwitcher;
    use crate::PolicyKind;
    use alloc::boxed::Box;

    #[test]
    fn rotates_through_ready_pids_in_order() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.init(PolicyKind::RoundRobin);
        d.sched_ready(1, 50);
        d.sched_ready(2, 50);
        d.sched_ready(3, 50);

        assert_eq!(d.schedule(), Some(1));
        d.yield_now();
        assert_eq!(d.current(), Some(2));
        d.yield_now();
        assert_eq!(d.current(), Some(3));
        d.yield_now();
        assert_eq!(d.current(), Some(1));
    }

    #[test]
    fn quantum_expiry_requests_reschedule() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.sched_set_quantum(2);
        d.init(PolicyKind::RoundRobin);
        d.sched_ready(1, 50);
        d.sched_ready(2, 50);
        d.schedule();
        assert!(!d.sched_tick());
        assert!(d.sched_tick());
    }

    #[test]
    fn idles_with_no_ready_pids() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.init(PolicyKind::RoundRobin);
        assert_eq!(d.schedule(), None);
    }

    #[test]
    fn redundant_schedule_call_does_not_rotate_the_cursor() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.init(PolicyKind::RoundRobin);
        d.sched_ready(1, 50);
        d.sched_ready(2, 50);
        d.sched_ready(3, 50);
        assert_eq!(d.schedule(), Some(1));

        // setpriority() on the running pid unconditionally requests a
        // reschedule; it must not be mistaken for a quantum expiry.
        d.setpriority(1, 60).unwrap();
        assert_eq!(d.schedule(), Some(1));
        assert_eq!(d.schedule(), Some(1));
    }

    #[test]
    fn stats_track_processes_and_context_switches() {
        let mut d = Dispatcher::new(Box::new(NullContextSwitcher::default()));
        d.init(PolicyKind::RoundRobin);
        d.sched_ready(1, 50);
        d.sched_ready(2, 50);
        d.schedule();
        d.yield_now();
        let stats = d.policy_as::<RoundRobinPolicy>().unwrap().stats();
        assert_eq!(stats.total_processes, 2);
        assert_eq!(stats.total_context_switches, 2);
    }
}
