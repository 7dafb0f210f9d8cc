/*
 * Context Switcher
 *
 * `context_switch(old_pid, new_pid)` is a single external operation
 * whose implementation is entirely out of scope here — the dispatcher
 * only needs to know when to call it, not how it works, so it's modeled
 * as a narrow trait the caller implements and hands to `Dispatcher::init`.
 */

use crate::process_table::Pid;

/// The external context-switch primitive.
pub trait ContextSwitcher: Send {
    /// Save `old`'s register state and restore `new`'s. `old` is
    /// `NONE_PID` when switching away from idle.
    fn context_switch(&mut self, old: Pid, new: Pid);
}

/// A `ContextSwitcher` that does nothing but remember the last switch,
/// for tests and for callers that haven't wired up real hardware yet.
#[derive(Debug, Default)]
pub struct NullContextSwitcher {
    pub switches: u64,
    pub last: Option<(Pid, Pid)>,
}

impl ContextSwitcher for NullContextSwitcher {
    fn context_switch(&mut self, old: Pid, new: Pid) {
        self.switches += 1;
        self.last = Some((old, new));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_switcher_records_calls() {
        let mut cs = NullContextSwitcher::default();
        cs.context_switch(-1, 3);
        assert_eq!(cs.switches, 1);
        assert_eq!(cs.last, Some((-1, 3)));
    }
}
