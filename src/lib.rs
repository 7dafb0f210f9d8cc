//! Pluggable process scheduling core.
//!
//! Six interchangeable scheduling policies (Round-Robin, Priority, MLFQ,
//! Lottery, CFS, Real-Time) live behind one [`Dispatcher`]. The dispatcher
//! owns cross-cutting mechanism (tick counter, `need_resched`, stats, the
//! active policy's ops vtable) and forwards every operation to a
//! `Box<dyn SchedPolicy>`. Policies never touch the process table directly;
//! they reach it only through [`PolicyCtx`], the capability boundary
//! mirrored on `KernelSchedCtx` in the crate this was grounded on.
//!
//! The crate is `no_std` in non-test builds; `cfg(test)` pulls in `std` so
//! ordinary `#[test]` functions work without a custom test harness.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod pool;
pub mod process_table;
pub mod rng;
pub mod stats;
pub mod traits;

pub mod policies;

pub use context::{ContextSwitcher, NullContextSwitcher};
pub use dispatcher::Dispatcher;
pub use error::SchedError;
pub use events::SchedEvent;
pub use process_table::{Pid, ProcState, ProcessTable, NPROC};
pub use traits::{DispatchDecision, PolicyCtx, SchedPolicy};

/// Minimum priority value accepted by `setpriority`/`nice`.
pub const PRIORITY_MIN: u8 = 0;
/// Maximum priority value accepted by `setpriority`/`nice`.
pub const PRIORITY_MAX: u8 = 99;
/// Default Round-Robin quantum, in ticks.
pub const DEFAULT_QUANTUM: u32 = 10;
/// Minimum quantum accepted by `sched_set_quantum`.
pub const MIN_QUANTUM: u32 = 1;
/// Maximum quantum accepted by `sched_set_quantum`.
pub const MAX_QUANTUM: u32 = 1000;

/// Selects which scheduling policy a `Dispatcher` installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    RoundRobin,
    Priority,
    Mlfq,
    Lottery,
    Cfs,
    RealTime(RtAlgorithm),
}

/// Real-time sub-algorithm, selected through the `RealTime` policy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtAlgorithm {
    Edf,
    Rms,
    Dms,
    Llf,
}
