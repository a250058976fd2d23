//! Bidirectional process linking and exit signal rules.
//!
//! Links connect two processes so that the termination of either one sends
//! an exit signal to the other. What a signal does to its target depends on
//! the reason and on the target's `trap_exit` flag.
//!
//! ## Exit Signal Rules
//!
//! - **Kill**: always terminates the target, which exits with `:killed`.
//!   Trapping does not help.
//! - **Trapping target**: any other reason is delivered as a
//!   `{:EXIT, from, reason}` message.
//! - **Normal**: delivered as an `{:EXIT, from, :normal}` message. The
//!   target keeps running.
//! - **Anything else**: terminates the target with the same reason, which in
//!   turn cascades through the target's own links.

use rustc_hash::FxHashMap;

use super::process::{ExitReason, Pid, Process};
use crate::term::Term;

/// What an exit signal does to the process receiving it.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitAction {
    /// Deliver the signal as an `{:EXIT, from, reason}` message.
    Deliver,
    /// Terminate the target with the given reason.
    Terminate(ExitReason),
}

/// Decide the effect of an exit signal carrying `reason` on a target whose
/// `trap_exit` flag is `trapping`.
pub fn exit_action(reason: &ExitReason, trapping: bool) -> ExitAction {
    match reason {
        ExitReason::Kill => ExitAction::Terminate(ExitReason::Killed),
        _ if trapping => ExitAction::Deliver,
        ExitReason::Normal => ExitAction::Deliver,
        other => ExitAction::Terminate(other.clone()),
    }
}

/// Build the `{:EXIT, from, reason}` message delivered to a trapping (or
/// normally signalled) process.
pub fn exit_message(from: Option<Pid>, reason: &ExitReason) -> Term {
    let from = from.map(Term::Pid).unwrap_or(Term::Nil);
    Term::tuple([Term::atom("EXIT"), from, reason.to_term()])
}

/// Create a bidirectional link between two live processes.
///
/// Idempotent. Linking a process to itself is a no-op.
pub fn link(processes: &mut FxHashMap<Pid, Process>, a: Pid, b: Pid) {
    if a == b {
        return;
    }
    if let Some(proc) = processes.get_mut(&a) {
        proc.links.insert(b);
    }
    if let Some(proc) = processes.get_mut(&b) {
        proc.links.insert(a);
    }
}

/// Remove a bidirectional link. Missing processes or links are ignored.
pub fn unlink(processes: &mut FxHashMap<Pid, Process>, a: Pid, b: Pid) {
    if let Some(proc) = processes.get_mut(&a) {
        proc.links.remove(&b);
    }
    if let Some(proc) = processes.get_mut(&b) {
        proc.links.remove(&a);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
