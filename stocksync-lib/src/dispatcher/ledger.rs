use std::collections::HashSet;
use std::fmt::{self, Display};

use log::warn;
use serde::Serialize;

use crate::TaskId;

/// Snapshot of a dispatcher's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Tasks that were delivered (or discarded after shutdown)
    pub finished: usize,
    /// Tasks admitted to the pending queue
    pub total: usize,
    /// Executors currently running
    pub in_flight: usize,
}

impl Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tasks({}/{})", self.finished, self.total)
    }
}

/// The dispatcher's shared bookkeeping.
///
/// Every compound read-check-update happens through one method call, so a
/// single lock acquisition covers it.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    in_flight: HashSet<TaskId>,
    total: usize,
    finished: usize,
    sealed: bool,
}

impl Ledger {
    /// Count one more admitted task. Returns `false` once sealed.
    pub(crate) fn admit(&mut self) -> bool {
        if self.sealed {
            return false;
        }
        self.total += 1;
        true
    }

    /// Mark the task as running. Returns `false` if the identifier is
    /// already in flight.
    pub(crate) fn begin(&mut self, id: &TaskId) -> bool {
        self.in_flight.insert(id.clone())
    }

    /// Account for an executed task and release its identifier
    pub(crate) fn complete(&mut self, id: &TaskId) {
        if !self.in_flight.remove(id) {
            warn!("Task {id} completed but was not in flight");
        }
        self.finish();
    }

    /// Account for a duplicate that was delivered without being executed
    pub(crate) fn reject_duplicate(&mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        debug_assert!(self.finished < self.total, "more tasks finished than admitted");
        self.finished = (self.finished + 1).min(self.total);
    }

    /// No further tasks will be admitted
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    /// All admitted tasks are accounted for and no more will come
    pub(crate) const fn is_complete(&self) -> bool {
        self.sealed && self.finished == self.total
    }

    pub(crate) fn progress(&self) -> Progress {
        Progress {
            finished: self.finished,
            total: self.total,
            in_flight: self.in_flight.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_in_flight_is_rejected() {
        let mut ledger = Ledger::default();
        let id = TaskId::from("42-7");
        assert!(ledger.admit());
        assert!(ledger.admit());

        assert!(ledger.begin(&id));
        assert!(!ledger.begin(&id));
        ledger.reject_duplicate();
        ledger.complete(&id);

        assert_eq!(
            ledger.progress(),
            Progress {
                finished: 2,
                total: 2,
                in_flight: 0
            }
        );
    }

    #[test]
    fn test_identifier_can_be_reused_after_completion() {
        let mut ledger = Ledger::default();
        let id = TaskId::from("42-7");
        ledger.admit();
        ledger.admit();

        assert!(ledger.begin(&id));
        ledger.complete(&id);
        assert!(ledger.begin(&id));
        ledger.complete(&id);
        assert_eq!(ledger.progress().finished, 2);
    }

    #[test]
    fn test_completion_requires_seal() {
        let mut ledger = Ledger::default();
        assert!(!ledger.is_complete());

        ledger.seal();
        assert!(ledger.is_complete());
        assert!(!ledger.admit());
        assert_eq!(ledger.progress().total, 0);
    }

    #[test]
    fn test_progress_display() {
        let progress = Progress {
            finished: 3,
            total: 10,
            in_flight: 2,
        };
        assert_eq!(progress.to_string(), "tasks(3/10)");
    }
}
