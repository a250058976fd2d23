//! Unidirectional process monitors.
//!
//! A monitor lets an observer learn that another process terminated without
//! being affected by it. When the observed process exits, every observer
//! receives `{:DOWN, ref, :process, pid, reason}` and the monitor is
//! consumed.

use rustc_hash::FxHashMap;

use super::process::{ExitReason, Pid, Reference};
use crate::term::Term;

/// One observer/observed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monitor {
    pub observer: Pid,
    pub observed: Pid,
}

/// All live monitors, keyed by their reference.
#[derive(Debug, Default)]
pub struct MonitorTable {
    by_ref: FxHashMap<Reference, Monitor>,
}

impl MonitorTable {
    pub fn new() -> Self {
        MonitorTable::default()
    }

    pub fn insert(&mut self, mref: Reference, observer: Pid, observed: Pid) {
        self.by_ref.insert(mref, Monitor { observer, observed });
    }

    /// Remove a monitor, returning it if it was live.
    pub fn remove(&mut self, mref: Reference) -> Option<Monitor> {
        self.by_ref.remove(&mref)
    }

    pub fn get(&self, mref: Reference) -> Option<&Monitor> {
        self.by_ref.get(&mref)
    }

    /// Remove and return every monitor observing `observed`, ordered by
    /// reference so DOWN messages go out in creation order.
    pub fn take_observing(&mut self, observed: Pid) -> Vec<(Reference, Pid)> {
        let mut taken: Vec<(Reference, Pid)> = self
            .by_ref
            .iter()
            .filter(|(_, m)| m.observed == observed)
            .map(|(r, m)| (*r, m.observer))
            .collect();
        taken.sort_by_key(|(r, _)| *r);
        for (mref, _) in &taken {
            self.by_ref.remove(mref);
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }
}

/// Build the `{:DOWN, ref, :process, pid, reason}` message.
pub fn down_message(mref: Reference, observed: Pid, reason: &ExitReason) -> Term {
    Term::tuple([
        Term::atom("DOWN"),
        Term::Ref(mref),
        Term::atom("process"),
        Term::Pid(observed),
        reason.to_term(),
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
