/*
 * Scheduling Policies
 *
 * Each module implements `SchedPolicy` for one of the six supported
 * scheduling algorithms. `make` is the factory the dispatcher calls from
 * `init`/`switch`, collapsing per-policy construction into one switch.
 */

pub mod cfs;
pub mod lottery;
pub mod mlfq;
pub mod priority;
pub mod realtime;
pub mod round_robin;

use alloc::boxed::Box;

pub use cfs::CfsPolicy;
pub use lottery::LotteryPolicy;
pub use mlfq::MlfqPolicy;
pub use priority::PriorityPolicy;
pub use realtime::RealTimePolicy;
pub use round_robin::RoundRobinPolicy;

use crate::traits::SchedPolicy;
use crate::PolicyKind;

/// Construct the named policy, freshly initialized.
pub fn make(kind: PolicyKind) -> Box<dyn SchedPolicy> {
    match kind {
        PolicyKind::RoundRobin => Box::new(RoundRobinPolicy::new()),
        PolicyKind::Priority => Box::new(PriorityPolicy::new()),
        PolicyKind::Mlfq => Box::new(MlfqPolicy::new()),
        PolicyKind::Lottery => Box::new(LotteryPolicy::new()),
        PolicyKind::Cfs => Box::new(CfsPolicy::new()),
        PolicyKind::RealTime(algo) => Box::new(RealTimePolicy::new(algo)),
    }
}
