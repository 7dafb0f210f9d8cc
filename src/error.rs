/*
 * Scheduler Error Sentinel
 *
 * A single generic error sentinel, returned from syscall-shaped entry
 * points on bad input; everything else (pool exhaustion, invariant
 * violations) is handled without an error type.
 */

use core::fmt;

/// Generic system-error sentinel returned by the few entry points that
/// validate their input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchedError {
    /// The pid is outside `[0, NPROC)`.
    InvalidPid,
    /// The pid refers to a `Free` process table slot.
    FreeSlot,
    /// `scheduler_switch` was asked for a policy it doesn't recognize.
    UnknownPolicy,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::InvalidPid => write!(f, "pid out of range"),
            SchedError::FreeSlot => write!(f, "pid refers to a free process table slot"),
            SchedError::UnknownPolicy => write!(f, "unknown scheduling policy"),
        }
    }
}
