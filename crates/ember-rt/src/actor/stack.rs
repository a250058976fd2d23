//! Corosensei-based stackful coroutines for Ember processes.
//!
//! Each process body runs on its own coroutine stack. A body never touches
//! scheduler state directly: every runtime operation it performs through its
//! [`Context`] is a syscall. The coroutine yields a [`Syscall`] to the
//! scheduler, the scheduler performs it against the process table, and it
//! resumes the coroutine with the matching [`Reply`]. Every resume costs
//! one reduction, so a body that only computes never yields and a body that
//! talks to the runtime is preempted at its syscalls.

use std::time::{Duration, Instant};

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use super::process::{ExitReason, Pid, Reference};
use super::scheduler::Dest;
use crate::dispatch::{clause, Clause};
use crate::error::{Result, RuntimeError};
use crate::pattern::variable;
use crate::term::Term;

/// The code a process runs. Returning `Ok` exits with `:normal`; returning
/// an error exits with that error as the reason.
pub type ProcessBody = Box<dyn FnOnce(&Context<'_>) -> Result<()>>;

// ---------------------------------------------------------------------------
// Syscalls
// ---------------------------------------------------------------------------

/// A request from a process body to the scheduler.
pub(crate) enum Syscall {
    Yield,
    Spawn {
        body: ProcessBody,
        link: bool,
        monitor: bool,
    },
    Send {
        dest: Dest,
        message: Term,
    },
    SendAfter {
        pid: Pid,
        message: Term,
        after: Duration,
    },
    Receive {
        clauses: Vec<Clause>,
        deadline: Option<Instant>,
    },
    Sleep(Duration),
    Link(Pid),
    Unlink(Pid),
    Monitor(Pid),
    Demonitor(Reference),
    Exit {
        target: Pid,
        reason: ExitReason,
    },
    Register(String),
    Unregister(String),
    Whereis(String),
    Registered,
    ProcessFlag {
        flag: String,
        value: Term,
    },
    Put {
        key: Term,
        value: Term,
    },
    Get(Term),
    Erase(Term),
    GetKeys,
    IsAlive(Pid),
    List,
    MakeRef,
}

impl Syscall {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Syscall::Yield => "yield",
            Syscall::Spawn { .. } => "spawn",
            Syscall::Send { .. } => "send",
            Syscall::SendAfter { .. } => "send_after",
            Syscall::Receive { .. } => "receive",
            Syscall::Sleep(_) => "sleep",
            Syscall::Link(_) => "link",
            Syscall::Unlink(_) => "unlink",
            Syscall::Monitor(_) => "monitor",
            Syscall::Demonitor(_) => "demonitor",
            Syscall::Exit { .. } => "exit",
            Syscall::Register(_) => "register",
            Syscall::Unregister(_) => "unregister",
            Syscall::Whereis(_) => "whereis",
            Syscall::Registered => "registered",
            Syscall::ProcessFlag { .. } => "process_flag",
            Syscall::Put { .. } => "put",
            Syscall::Get(_) => "get",
            Syscall::Erase(_) => "erase",
            Syscall::GetKeys => "get_keys",
            Syscall::IsAlive(_) => "is_alive",
            Syscall::List => "list",
            Syscall::MakeRef => "make_ref",
        }
    }
}

/// Outcome of a selective receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// The clause at index `clause` accepted a message.
    Message { clause: usize, bindings: Vec<Term> },
    Timeout,
}

/// The scheduler's answer to a syscall.
#[derive(Debug)]
pub(crate) enum Reply {
    /// First resume of a fresh coroutine.
    Start,
    Ok,
    Error(RuntimeError),
    Spawned {
        pid: Pid,
        monitor: Option<Reference>,
    },
    Ref(Reference),
    Term(Term),
    Terms(Vec<Term>),
    Bool(bool),
    Pid(Option<Pid>),
    Pids(Vec<Pid>),
    Names(Vec<String>),
    Received(Received),
}

fn unexpected(syscall: &str, reply: Reply) -> ! {
    unreachable!("scheduler answered {syscall} with {reply:?}")
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A process's handle on the runtime, passed to its body.
pub struct Context<'a> {
    yielder: &'a Yielder<Reply, Syscall>,
    pid: Pid,
}

impl Context<'_> {
    fn call(&self, syscall: Syscall) -> Reply {
        self.yielder.suspend(syscall)
    }

    /// PID of the running process.
    pub fn self_pid(&self) -> Pid {
        self.pid
    }

    /// Give up the rest of the time slice.
    pub fn yield_now(&self) {
        self.call(Syscall::Yield);
    }

    pub fn spawn<F>(&self, body: F) -> Pid
    where
        F: FnOnce(&Context<'_>) -> Result<()> + 'static,
    {
        self.spawn_with(Box::new(body), false, false).0
    }

    /// Spawn a process linked to this one.
    pub fn spawn_link<F>(&self, body: F) -> Pid
    where
        F: FnOnce(&Context<'_>) -> Result<()> + 'static,
    {
        self.spawn_with(Box::new(body), true, false).0
    }

    /// Spawn a process monitored by this one.
    pub fn spawn_monitor<F>(&self, body: F) -> (Pid, Reference)
    where
        F: FnOnce(&Context<'_>) -> Result<()> + 'static,
    {
        match self.spawn_with(Box::new(body), false, true) {
            (pid, Some(mref)) => (pid, mref),
            (_, None) => unreachable!("spawn_monitor returned no reference"),
        }
    }

    fn spawn_with(&self, body: ProcessBody, link: bool, monitor: bool) -> (Pid, Option<Reference>) {
        match self.call(Syscall::Spawn { body, link, monitor }) {
            Reply::Spawned { pid, monitor } => (pid, monitor),
            other => unexpected("spawn", other),
        }
    }

    /// Send a message. Sending to a dead pid is silently dropped; sending
    /// to an unregistered name is an error.
    pub fn send(&self, dest: impl Into<Dest>, message: impl Into<Term>) -> Result<()> {
        let syscall = Syscall::Send {
            dest: dest.into(),
            message: message.into(),
        };
        self.unit("send", syscall)
    }

    /// Deliver `message` to `pid` once `after` has elapsed.
    pub fn send_after(&self, pid: Pid, message: impl Into<Term>, after: Duration) {
        let syscall = Syscall::SendAfter {
            pid,
            message: message.into(),
            after,
        };
        // Never fails: delivery to a dead pid is dropped when the timer fires.
        let _ = self.unit("send_after", syscall);
    }

    /// Low-level selective receive: wait for the first message some clause
    /// accepts, or until `timeout` elapses.
    pub fn select(&self, clauses: &[Clause], timeout: Option<Duration>) -> Received {
        let deadline = timeout.map(|t| Instant::now() + t);
        let syscall = Syscall::Receive {
            clauses: clauses.to_vec(),
            deadline,
        };
        match self.call(syscall) {
            Reply::Received(received) => received,
            other => unexpected("receive", other),
        }
    }

    /// Wait for a message one of `clauses` accepts and run that clause.
    /// Messages no clause accepts stay in the mailbox.
    pub fn receive(&self, clauses: &[Clause]) -> Result<Term> {
        match self.select(clauses, None) {
            Received::Message { clause, bindings } => clauses[clause].invoke(bindings),
            Received::Timeout => unreachable!("receive without a deadline timed out"),
        }
    }

    /// Like [`Context::receive`], but runs `on_timeout` once if no message
    /// matches within `timeout`.
    pub fn receive_timeout<F>(&self, clauses: &[Clause], timeout: Duration, on_timeout: F) -> Result<Term>
    where
        F: FnOnce() -> Result<Term>,
    {
        match self.select(clauses, Some(timeout)) {
            Received::Message { clause, bindings } => clauses[clause].invoke(bindings),
            Received::Timeout => on_timeout(),
        }
    }

    /// Take the oldest message, whatever it is.
    pub fn receive_any(&self) -> Term {
        let any = clause(vec![variable()], |mut bound| Ok(bound.remove(0)));
        match self.select(&[any], None) {
            Received::Message { mut bindings, .. } => bindings.remove(0),
            Received::Timeout => unreachable!("receive without a deadline timed out"),
        }
    }

    /// Suspend the process for at least `duration`.
    pub fn sleep(&self, duration: Duration) {
        self.call(Syscall::Sleep(duration));
    }

    /// Link to `pid`. Linking to a process that does not exist sends this
    /// process a `:noproc` exit signal.
    pub fn link(&self, pid: Pid) {
        self.call(Syscall::Link(pid));
    }

    pub fn unlink(&self, pid: Pid) {
        self.call(Syscall::Unlink(pid));
    }

    pub fn monitor(&self, pid: Pid) -> Reference {
        match self.call(Syscall::Monitor(pid)) {
            Reply::Ref(mref) => mref,
            other => unexpected("monitor", other),
        }
    }

    /// Remove a monitor. Returns `false` if it had already fired or been
    /// removed.
    pub fn demonitor(&self, mref: Reference) -> bool {
        self.boolean("demonitor", Syscall::Demonitor(mref))
    }

    /// Send an exit signal to `target`.
    pub fn exit(&self, target: Pid, reason: ExitReason) {
        self.call(Syscall::Exit { target, reason });
    }

    /// Terminate the current process with `reason`. Meant to be returned
    /// from the body: `return ctx.exit_self(reason)`.
    pub fn exit_self<T>(&self, reason: ExitReason) -> Result<T> {
        Err(RuntimeError::Exit(reason))
    }

    /// Register the current process under `name`.
    pub fn register(&self, name: &str) -> Result<()> {
        self.unit("register", Syscall::Register(name.to_string()))
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.boolean("unregister", Syscall::Unregister(name.to_string()))
    }

    pub fn whereis(&self, name: &str) -> Option<Pid> {
        match self.call(Syscall::Whereis(name.to_string())) {
            Reply::Pid(pid) => pid,
            other => unexpected("whereis", other),
        }
    }

    pub fn registered(&self) -> Vec<String> {
        match self.call(Syscall::Registered) {
            Reply::Names(names) => names,
            other => unexpected("registered", other),
        }
    }

    /// Set a process flag, returning its previous value.
    pub fn process_flag(&self, flag: &str, value: impl Into<Term>) -> Term {
        let syscall = Syscall::ProcessFlag {
            flag: flag.to_string(),
            value: value.into(),
        };
        self.term("process_flag", syscall)
    }

    /// Store `value` in the process dictionary, returning the previous value
    /// or `nil`.
    pub fn put(&self, key: impl Into<Term>, value: impl Into<Term>) -> Term {
        let syscall = Syscall::Put {
            key: key.into(),
            value: value.into(),
        };
        self.term("put", syscall)
    }

    pub fn get(&self, key: impl Into<Term>) -> Term {
        self.term("get", Syscall::Get(key.into()))
    }

    pub fn erase(&self, key: impl Into<Term>) -> Term {
        self.term("erase", Syscall::Erase(key.into()))
    }

    pub fn get_keys(&self) -> Vec<Term> {
        match self.call(Syscall::GetKeys) {
            Reply::Terms(keys) => keys,
            other => unexpected("get_keys", other),
        }
    }

    pub fn is_alive(&self, pid: Pid) -> bool {
        self.boolean("is_alive", Syscall::IsAlive(pid))
    }

    /// PIDs of all live processes, ascending.
    pub fn list(&self) -> Vec<Pid> {
        match self.call(Syscall::List) {
            Reply::Pids(pids) => pids,
            other => unexpected("list", other),
        }
    }

    pub fn make_ref(&self) -> Reference {
        match self.call(Syscall::MakeRef) {
            Reply::Ref(r) => r,
            other => unexpected("make_ref", other),
        }
    }

    fn unit(&self, name: &str, syscall: Syscall) -> Result<()> {
        match self.call(syscall) {
            Reply::Ok => Ok(()),
            Reply::Error(err) => Err(err),
            other => unexpected(name, other),
        }
    }

    fn boolean(&self, name: &str, syscall: Syscall) -> bool {
        match self.call(syscall) {
            Reply::Bool(b) => b,
            other => unexpected(name, other),
        }
    }

    fn term(&self, name: &str, syscall: Syscall) -> Term {
        match self.call(syscall) {
            Reply::Term(t) => t,
            other => unexpected(name, other),
        }
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("pid", &self.pid).finish()
    }
}

// ---------------------------------------------------------------------------
// CoroutineHandle
// ---------------------------------------------------------------------------

/// What a resumed coroutine did.
pub(crate) enum Step {
    /// The body issued a syscall and is waiting for its reply.
    Syscall(Syscall),
    /// The body finished.
    Exited(ExitReason),
}

/// A handle wrapping a corosensei `Coroutine` for one process.
///
/// `!Send`: coroutines stay on the thread that created them, which is the
/// thread owning the `ProcessSystem`.
pub(crate) struct CoroutineHandle {
    coro: Coroutine<Reply, Syscall, ExitReason, DefaultStack>,
}

impl CoroutineHandle {
    pub(crate) fn new(pid: Pid, body: ProcessBody, stack_size: usize) -> std::io::Result<Self> {
        let stack = DefaultStack::new(stack_size)?;
        let coro = Coroutine::with_stack(stack, move |yielder: &Yielder<Reply, Syscall>, _start: Reply| {
            let ctx = Context { yielder, pid };
            match body(&ctx) {
                Ok(()) => ExitReason::Normal,
                Err(err) => err.into_exit_reason(),
            }
        });
        Ok(CoroutineHandle { coro })
    }

    /// Resume with `reply`. Panics inside the body propagate to the caller.
    pub(crate) fn resume(&mut self, reply: Reply) -> Step {
        match self.coro.resume(reply) {
            CoroutineResult::Yield(syscall) => Step::Syscall(syscall),
            CoroutineResult::Return(reason) => Step::Exited(reason),
        }
    }

    pub(crate) fn done(&self) -> bool {
        self.coro.done()
    }
}

impl std::fmt::Debug for CoroutineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoroutineHandle")
            .field("done", &self.done())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::DEFAULT_STACK_SIZE;

    fn body<F>(f: F) -> ProcessBody
    where
        F: FnOnce(&Context<'_>) -> Result<()> + 'static,
    {
        Box::new(f)
    }

    #[test]
    fn test_coroutine_runs_to_completion() {
        let body = body(|_ctx| Ok(()));
        let mut handle = CoroutineHandle::new(Pid(1), body, DEFAULT_STACK_SIZE).unwrap();

        assert!(matches!(handle.resume(Reply::Start), Step::Exited(ExitReason::Normal)));
        assert!(handle.done());
    }

    #[test]
    fn test_coroutine_yields_syscalls() {
        let body = body(|ctx| {
            ctx.yield_now();
            let old = ctx.put("k", 1);
            assert_eq!(old, Term::Nil);
            Ok(())
        });
        let mut handle = CoroutineHandle::new(Pid(1), body, DEFAULT_STACK_SIZE).unwrap();

        assert!(matches!(handle.resume(Reply::Start), Step::Syscall(Syscall::Yield)));
        assert!(matches!(handle.resume(Reply::Ok), Step::Syscall(Syscall::Put { .. })));
        assert!(matches!(handle.resume(Reply::Term(Term::Nil)), Step::Exited(ExitReason::Normal)));
    }

    #[test]
    fn test_error_becomes_exit_reason() {
        let body = body(|_ctx| Err(RuntimeError::raise("boom")));
        let mut handle = CoroutineHandle::new(Pid(1), body, DEFAULT_STACK_SIZE).unwrap();

        match handle.resume(Reply::Start) {
            Step::Exited(reason) => assert_eq!(reason, ExitReason::Error(Term::from("boom"))),
            Step::Syscall(s) => panic!("unexpected syscall {}", s.name()),
        }
    }

    #[test]
    fn test_exit_self_reason() {
        let body = body(|ctx| ctx.exit_self(ExitReason::Killed));
        let mut handle = CoroutineHandle::new(Pid(1), body, DEFAULT_STACK_SIZE).unwrap();
        assert!(matches!(handle.resume(Reply::Start), Step::Exited(ExitReason::Killed)));
    }

    #[test]
    fn test_dropping_suspended_coroutine() {
        let body = body(|ctx| {
            ctx.yield_now();
            Ok(())
        });
        let mut handle = CoroutineHandle::new(Pid(1), body, DEFAULT_STACK_SIZE).unwrap();
        assert!(matches!(handle.resume(Reply::Start), Step::Syscall(Syscall::Yield)));
        assert!(!handle.done());
        drop(handle);
    }
}
