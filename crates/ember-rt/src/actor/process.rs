//! Process Control Block (PCB) for Ember processes.
//!
//! Each guest process is a cooperatively scheduled unit with its own PID,
//! status, mailbox, links, flags and private dictionary. The PCB is owned
//! exclusively by the [`ProcessSystem`](super::ProcessSystem); process
//! bodies only reach it through syscalls.

use std::fmt;

use rustc_hash::FxHashSet;

use super::mailbox::Mailbox;
use crate::term::{Term, TermMap};

// ---------------------------------------------------------------------------
// Pid
// ---------------------------------------------------------------------------

/// Unique identifier for a process.
///
/// PIDs are assigned sequentially by the owning `ProcessSystem`, so they are
/// unique within one runtime instance and usable as map keys everywhere.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub(crate) u64);

impl Pid {
    /// Return the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#PID<0.{}.0>", self.0)
    }
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// A unique token, used to key monitors and returned by `make_ref`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference(pub(crate) u64);

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "REF({})", self.0)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#Reference<0.0.0.{}>", self.0)
    }
}

// ---------------------------------------------------------------------------
// ProcessStatus
// ---------------------------------------------------------------------------

/// The execution state of a process.
///
/// `Stopped -> Running <-> {Sleeping, Suspended} -> Exiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Spawned but its body has not started yet.
    Stopped,
    /// Runnable or currently executing.
    Running,
    /// Waiting for a sleep timer.
    Sleeping,
    /// Blocked in a selective receive with no matching message.
    Suspended,
    /// Terminated; the PCB is being torn down.
    Exiting,
}

// ---------------------------------------------------------------------------
// ExitReason
// ---------------------------------------------------------------------------

/// Why a process terminated.
///
/// Exit reasons are guest values: anything that is not one of the
/// well-known atoms is carried verbatim in [`ExitReason::Error`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    /// The body returned.
    Normal,
    /// Untrappable kill request. Never the reason a process dies with: a
    /// killed process exits with [`ExitReason::Killed`].
    Kill,
    /// The process was killed.
    Killed,
    /// The target of a link or monitor did not exist.
    NoProc,
    /// Any other guest value (a raised term, a custom exit reason).
    Error(Term),
}

impl ExitReason {
    /// Map a guest value to an exit reason, recognising the reserved atoms.
    pub fn from_term(term: Term) -> Self {
        match &term {
            Term::Atom(a) => match a.as_str() {
                "normal" => ExitReason::Normal,
                "kill" => ExitReason::Kill,
                "killed" => ExitReason::Killed,
                "noproc" => ExitReason::NoProc,
                _ => ExitReason::Error(term),
            },
            _ => ExitReason::Error(term),
        }
    }

    pub fn to_term(&self) -> Term {
        match self {
            ExitReason::Normal => Term::atom("normal"),
            ExitReason::Kill => Term::atom("kill"),
            ExitReason::Killed => Term::atom("killed"),
            ExitReason::NoProc => Term::atom("noproc"),
            ExitReason::Error(term) => term.clone(),
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_term())
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of reductions a process may use per scheduler slice.
///
/// One reduction is one resume of the process coroutine, i.e. one syscall.
pub const DEFAULT_REDUCTIONS: u32 = 2000;

/// Default coroutine stack size: 256 KiB.
///
/// Stacks are lazily committed virtual memory, so the reservation is cheap.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

// ---------------------------------------------------------------------------
// Process (the PCB)
// ---------------------------------------------------------------------------

/// The Process Control Block.
pub struct Process {
    /// Unique process identifier.
    pub pid: Pid,

    /// Current execution state.
    pub status: ProcessStatus,

    /// FIFO mailbox with content-addressed removal.
    pub mailbox: Mailbox,

    /// Linked processes. Symmetric: if `b` is in `a.links`, `a` is in
    /// `b.links`.
    pub links: FxHashSet<Pid>,

    /// Monitors this process holds as the observer.
    pub monitors: FxHashSet<Reference>,

    /// When true, exit signals are delivered as `{:EXIT, from, reason}`
    /// messages instead of terminating the process.
    pub trap_exit: bool,

    /// Other process flags, keyed by flag name.
    pub flags: TermMap,

    /// Private process dictionary.
    pub dictionary: TermMap,

    /// Reductions consumed over the process lifetime.
    pub reductions: u64,
}

impl Process {
    pub fn new(pid: Pid) -> Self {
        Process {
            pid,
            status: ProcessStatus::Stopped,
            mailbox: Mailbox::new(),
            links: FxHashSet::default(),
            monitors: FxHashSet::default(),
            trap_exit: false,
            flags: TermMap::new(),
            dictionary: TermMap::new(),
            reductions: 0,
        }
    }

    /// Set a process flag, returning its previous value.
    ///
    /// `trap_exit` is interpreted by the exit machinery and takes a boolean;
    /// every other flag is stored verbatim.
    pub fn set_flag(&mut self, flag: &str, value: Term) -> Term {
        if flag == "trap_exit" {
            let old = self.trap_exit;
            self.trap_exit = value.is_truthy();
            return Term::Boolean(old);
        }
        self.flags
            .insert(Term::atom(flag), value)
            .unwrap_or(Term::Nil)
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("status", &self.status)
            .field("links", &self.links)
            .field("trap_exit", &self.trap_exit)
            .field("mailbox_len", &self.mailbox.len())
            .field("reductions", &self.reductions)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
