//! Cooperative reduction-counting scheduler.
//!
//! A [`ProcessSystem`] owns every piece of runtime state: the process table,
//! per-process task queues, pending receives, links, monitors, the name
//! registry and the timer queue. It runs on the thread that created it and
//! is deliberately `!Send`, since the coroutines it drives cannot migrate.
//!
//! ## Scheduling
//!
//! Each process has a FIFO queue of tasks (resume with a syscall reply, or
//! retry a pending receive). [`ProcessSystem::tick`] walks the processes in
//! pid order and runs up to `reductions` tasks from each before moving on,
//! repeating until every queue is empty or `tick_budget` reductions have been
//! spent. [`ProcessSystem::run`] alternates ticks with firing due timers and
//! returns once nothing is runnable and no live timer is pending.
//!
//! ## Termination
//!
//! When a process terminates its task queue, pending receive and coroutine
//! are dropped, so any task or timer still naming it becomes a no-op. Its
//! links are removed on both sides and signalled, its monitors fire and its
//! registered name is released.
//!
//! Exit signals caused by a termination are queued and drained in a loop, so
//! a cascade through a long chain of links runs in constant host stack.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use super::link::{self, exit_action, exit_message, ExitAction};
use super::mailbox::Mailbox;
use super::monitor::{down_message, MonitorTable};
use super::process::{
    ExitReason, Pid, Process, ProcessStatus, Reference, DEFAULT_REDUCTIONS, DEFAULT_STACK_SIZE,
};
use super::registry::ProcessRegistry;
use super::stack::{Context, CoroutineHandle, ProcessBody, Received, Reply, Step, Syscall};
use super::timer::{TimerEvent, TimerId, TimerQueue};
use crate::dispatch::Clause;
use crate::error::{Result, RuntimeError};
use crate::term::Term;

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Default reductions a tick may spend before returning control.
pub const DEFAULT_TICK_BUDGET: u32 = 100_000;

/// Tunables for a [`ProcessSystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Reductions a process may use before the scheduler moves on.
    pub reductions: u32,
    /// Reductions one tick may spend across all processes.
    pub tick_budget: u32,
    /// Coroutine stack size per process, in bytes.
    pub stack_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            reductions: DEFAULT_REDUCTIONS,
            tick_budget: DEFAULT_TICK_BUDGET,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by `EMBER_REDUCTIONS`, `EMBER_TICK_BUDGET` and
    /// `EMBER_STACK_SIZE`. Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            reductions: env_value("EMBER_REDUCTIONS").unwrap_or(defaults.reductions),
            tick_budget: env_value("EMBER_TICK_BUDGET").unwrap_or(defaults.tick_budget),
            stack_size: env_value("EMBER_STACK_SIZE").unwrap_or(defaults.stack_size),
        }
        .clamped()
    }

    /// Raise zero budgets to one so every tick makes progress.
    fn clamped(mut self) -> Self {
        self.reductions = self.reductions.max(1);
        self.tick_budget = self.tick_budget.max(1);
        self
    }

    pub fn with_reductions(mut self, reductions: u32) -> Self {
        self.reductions = reductions.max(1);
        self
    }

    pub fn with_tick_budget(mut self, tick_budget: u32) -> Self {
        self.tick_budget = tick_budget.max(1);
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid scheduler setting");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Dest
// ---------------------------------------------------------------------------

/// Where a message goes: a pid, or a registered name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dest {
    Pid(Pid),
    Name(String),
}

impl From<Pid> for Dest {
    fn from(pid: Pid) -> Self {
        Dest::Pid(pid)
    }
}

impl From<&str> for Dest {
    fn from(name: &str) -> Self {
        Dest::Name(name.to_string())
    }
}

impl From<String> for Dest {
    fn from(name: String) -> Self {
        Dest::Name(name)
    }
}

// ---------------------------------------------------------------------------
// Internal bookkeeping
// ---------------------------------------------------------------------------

enum Task {
    Resume(Reply),
    /// A message arrived while the process was blocked in a receive.
    RetryReceive,
}

struct PendingReceive {
    clauses: Vec<Clause>,
    /// Identifies this particular wait so stale timeouts are ignored.
    token: u64,
    timeout: Option<TimerId>,
}

/// An exit signal waiting to be applied: `(from, target, reason)`.
type ExitSignal = (Option<Pid>, Pid, ExitReason);

enum Flow {
    /// Resume the process with this reply.
    Continue(Reply),
    /// The process is waiting on a message or timer.
    Park,
}

/// Remove the first message any clause accepts. Guards are guest code and
/// run on the scheduler stack, so a panic in one is caught and returned as
/// the receiving process's exit reason.
fn select_message(
    mailbox: &mut Mailbox,
    clauses: &[Clause],
) -> std::result::Result<Option<Received>, ExitReason> {
    let scan = panic::catch_unwind(AssertUnwindSafe(|| {
        mailbox.take_first(|msg| {
            clauses
                .iter()
                .enumerate()
                .find_map(|(i, c)| c.select(std::slice::from_ref(msg)).map(|b| (i, b)))
        })
    }));
    match scan {
        Ok(found) => Ok(found.map(|(_, (clause, bindings))| Received::Message { clause, bindings })),
        Err(payload) => Err(panic_reason(payload.as_ref())),
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> ExitReason {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "process panicked".to_string());
    ExitReason::Error(Term::Str(message))
}

// ---------------------------------------------------------------------------
// ProcessSystem
// ---------------------------------------------------------------------------

/// A single-threaded actor runtime.
pub struct ProcessSystem {
    config: SchedulerConfig,
    next_pid: u64,
    next_ref: u64,
    next_token: u64,
    processes: FxHashMap<Pid, Process>,
    coroutines: FxHashMap<Pid, CoroutineHandle>,
    /// Ordered by pid so ticks are deterministic.
    queues: BTreeMap<Pid, VecDeque<Task>>,
    receiving: FxHashMap<Pid, PendingReceive>,
    registry: ProcessRegistry,
    monitors: MonitorTable,
    timers: TimerQueue,
    /// Exit reasons of terminated processes.
    exited: FxHashMap<Pid, ExitReason>,
}

impl Default for ProcessSystem {
    fn default() -> Self {
        ProcessSystem::new(SchedulerConfig::default())
    }
}

impl ProcessSystem {
    pub fn new(config: SchedulerConfig) -> Self {
        ProcessSystem {
            config: config.clamped(),
            next_pid: 0,
            next_ref: 0,
            next_token: 0,
            processes: FxHashMap::default(),
            coroutines: FxHashMap::default(),
            queues: BTreeMap::new(),
            receiving: FxHashMap::default(),
            registry: ProcessRegistry::new(),
            monitors: MonitorTable::new(),
            timers: TimerQueue::new(),
            exited: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // Spawning

    /// Spawn a process. It starts running on the next tick.
    pub fn spawn<F>(&mut self, body: F) -> Pid
    where
        F: FnOnce(&Context<'_>) -> Result<()> + 'static,
    {
        self.spawn_process(Box::new(body))
    }

    /// Spawn a process linked to `parent`.
    pub fn spawn_link<F>(&mut self, parent: Pid, body: F) -> Pid
    where
        F: FnOnce(&Context<'_>) -> Result<()> + 'static,
    {
        let pid = self.spawn_process(Box::new(body));
        self.link(parent, pid);
        pid
    }

    /// Spawn a process monitored by `observer`.
    pub fn spawn_monitor<F>(&mut self, observer: Pid, body: F) -> (Pid, Reference)
    where
        F: FnOnce(&Context<'_>) -> Result<()> + 'static,
    {
        let pid = self.spawn_process(Box::new(body));
        let mref = self.monitor(observer, pid);
        (pid, mref)
    }

    fn spawn_process(&mut self, body: ProcessBody) -> Pid {
        self.next_pid += 1;
        let pid = Pid(self.next_pid);

        match CoroutineHandle::new(pid, body, self.config.stack_size) {
            Ok(handle) => {
                self.coroutines.insert(pid, handle);
                self.processes.insert(pid, Process::new(pid));
                self.queues
                    .insert(pid, VecDeque::from([Task::Resume(Reply::Start)]));
                debug!(%pid, "spawned process");
            }
            Err(err) => {
                warn!(%pid, error = %err, "failed to allocate process stack");
                let reason = ExitReason::Error(Term::tuple([
                    Term::atom("system_limit"),
                    Term::string(err.to_string()),
                ]));
                self.exited.insert(pid, reason);
            }
        }
        pid
    }

    // Messaging

    /// Send a message. Dropped silently if the pid is dead; an error if the
    /// name is not registered.
    pub fn send(&mut self, dest: impl Into<Dest>, message: impl Into<Term>) -> Result<()> {
        let pid = self.resolve(dest.into())?;
        self.deliver(pid, message.into());
        Ok(())
    }

    /// Deliver `message` to `pid` once `after` has elapsed.
    pub fn send_after(&mut self, pid: Pid, message: impl Into<Term>, after: Duration) {
        let event = TimerEvent::Deliver {
            pid,
            message: message.into(),
        };
        self.timers.push(Instant::now() + after, event);
    }

    fn resolve(&self, dest: Dest) -> Result<Pid> {
        match dest {
            Dest::Pid(pid) => Ok(pid),
            Dest::Name(name) => self
                .registry
                .whereis(&name)
                .ok_or(RuntimeError::UnregisteredName(name)),
        }
    }

    fn deliver(&mut self, pid: Pid, message: Term) -> bool {
        let Some(process) = self.processes.get_mut(&pid) else {
            trace!(%pid, "dropping message to dead process");
            return false;
        };
        process.mailbox.deliver(message);
        if process.status == ProcessStatus::Suspended {
            self.enqueue(pid, Task::RetryReceive);
        }
        true
    }

    fn enqueue(&mut self, pid: Pid, task: Task) {
        if let Some(queue) = self.queues.get_mut(&pid) {
            queue.push_back(task);
        }
    }

    // Links and monitors

    /// Link two processes. If either is dead the live one receives a
    /// `:noproc` exit signal instead.
    pub fn link(&mut self, a: Pid, b: Pid) {
        match (self.is_alive(a), self.is_alive(b)) {
            (true, true) => {
                link::link(&mut self.processes, a, b);
                debug!(%a, %b, "linked");
            }
            (true, false) => self.signal_exit(Some(b), a, ExitReason::NoProc),
            (false, true) => self.signal_exit(Some(a), b, ExitReason::NoProc),
            (false, false) => {}
        }
    }

    pub fn unlink(&mut self, a: Pid, b: Pid) {
        link::unlink(&mut self.processes, a, b);
    }

    /// Monitor `observed` on behalf of `observer`. Monitoring a process that
    /// does not exist delivers an immediate `:noproc` DOWN message.
    pub fn monitor(&mut self, observer: Pid, observed: Pid) -> Reference {
        let mref = self.make_ref();
        if !self.is_alive(observed) {
            self.deliver(observer, down_message(mref, observed, &ExitReason::NoProc));
            return mref;
        }
        self.monitors.insert(mref, observer, observed);
        if let Some(process) = self.processes.get_mut(&observer) {
            process.monitors.insert(mref);
        }
        debug!(%observer, %observed, %mref, "monitor installed");
        mref
    }

    /// Remove a monitor. Returns `false` if it had already fired.
    pub fn demonitor(&mut self, mref: Reference) -> bool {
        match self.monitors.remove(mref) {
            Some(monitor) => {
                if let Some(process) = self.processes.get_mut(&monitor.observer) {
                    process.monitors.remove(&mref);
                }
                true
            }
            None => false,
        }
    }

    // Exit signals

    /// Send an exit signal to `target`. `from` is `None` for signals sent by
    /// the host rather than by a process.
    pub fn exit(&mut self, from: Option<Pid>, target: Pid, reason: ExitReason) {
        self.signal_exit(from, target, reason);
    }

    fn signal_exit(&mut self, from: Option<Pid>, target: Pid, reason: ExitReason) {
        self.propagate_exits(VecDeque::from([(from, target, reason)]));
    }

    fn terminate(&mut self, pid: Pid, reason: ExitReason) {
        let mut signals = VecDeque::new();
        self.release(pid, reason, &mut signals);
        self.propagate_exits(signals);
    }

    /// Apply queued exit signals until none remain. Terminations caused along
    /// the way append their own link signals to the back of the queue.
    fn propagate_exits(&mut self, mut signals: VecDeque<ExitSignal>) {
        while let Some((from, target, reason)) = signals.pop_front() {
            let Some(process) = self.processes.get(&target) else {
                continue;
            };
            match exit_action(&reason, process.trap_exit) {
                ExitAction::Deliver => {
                    self.deliver(target, exit_message(from, &reason));
                }
                ExitAction::Terminate(reason) => self.release(target, reason, &mut signals),
            }
        }
    }

    /// Remove `pid` from every table, fire its monitors and queue an exit
    /// signal for each linked process.
    fn release(&mut self, pid: Pid, reason: ExitReason, signals: &mut VecDeque<ExitSignal>) {
        let Some(mut process) = self.processes.remove(&pid) else {
            return;
        };
        process.status = ProcessStatus::Exiting;
        debug!(%pid, %reason, "process exiting");

        self.queues.remove(&pid);
        if let Some(timeout) = self.receiving.remove(&pid).and_then(|p| p.timeout) {
            self.timers.cancel(timeout);
        }
        let coroutine = self.coroutines.remove(&pid);
        self.registry.cleanup_process(pid);

        for mref in &process.monitors {
            self.monitors.remove(*mref);
        }
        for (mref, observer) in self.monitors.take_observing(pid) {
            if let Some(observer_proc) = self.processes.get_mut(&observer) {
                observer_proc.monitors.remove(&mref);
            }
            self.deliver(observer, down_message(mref, pid, &reason));
        }

        let mut linked: Vec<Pid> = process.links.iter().copied().collect();
        linked.sort();
        for other in &linked {
            if let Some(other_proc) = self.processes.get_mut(other) {
                other_proc.links.remove(&pid);
            }
        }
        signals.extend(linked.into_iter().map(|other| (Some(pid), other, reason.clone())));
        self.exited.insert(pid, reason);

        drop(coroutine);
    }

    // Registry

    pub fn register(&mut self, name: &str, pid: Pid) -> Result<()> {
        if !self.is_alive(pid) {
            return Err(RuntimeError::raise(Term::tuple([
                Term::atom("noproc"),
                Term::Pid(pid),
            ])));
        }
        self.registry.register(name, pid)?;
        debug!(name, %pid, "registered");
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    pub fn whereis(&self, name: &str) -> Option<Pid> {
        self.registry.whereis(name)
    }

    pub fn registered(&self) -> Vec<String> {
        self.registry.registered()
    }

    // Introspection

    /// Set a process flag on `pid`, returning the previous value, or `None`
    /// if the process is not alive.
    pub fn process_flag(&mut self, pid: Pid, flag: &str, value: impl Into<Term>) -> Option<Term> {
        let process = self.processes.get_mut(&pid)?;
        Some(process.set_flag(flag, value.into()))
    }

    pub fn is_alive(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    /// All live pids, ascending.
    pub fn list(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.processes.keys().copied().collect();
        pids.sort();
        pids
    }

    pub fn status(&self, pid: Pid) -> Option<ProcessStatus> {
        self.processes.get(&pid).map(|p| p.status)
    }

    /// Why `pid` terminated, if it has.
    pub fn exit_reason(&self, pid: Pid) -> Option<&ExitReason> {
        self.exited.get(&pid)
    }

    pub fn mailbox_len(&self, pid: Pid) -> Option<usize> {
        self.processes.get(&pid).map(|p| p.mailbox.len())
    }

    /// Pending messages of `pid`, oldest first.
    pub fn messages(&self, pid: Pid) -> Vec<Term> {
        self.processes
            .get(&pid)
            .map(|p| p.mailbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Links of `pid`, ascending.
    pub fn links(&self, pid: Pid) -> Vec<Pid> {
        let mut links: Vec<Pid> = self
            .processes
            .get(&pid)
            .map(|p| p.links.iter().copied().collect())
            .unwrap_or_default();
        links.sort();
        links
    }

    pub fn make_ref(&mut self) -> Reference {
        self.next_ref += 1;
        Reference(self.next_ref)
    }

    // Running

    /// True if some process has work queued.
    pub fn has_runnable(&self) -> bool {
        self.queues.values().any(|q| !q.is_empty())
    }

    /// Run processes round-robin until no work is queued or the tick budget
    /// is spent. Returns the reductions used.
    pub fn tick(&mut self) -> u32 {
        let mut spent = 0;
        loop {
            let runnable: Vec<Pid> = self
                .queues
                .iter()
                .filter(|(_, q)| !q.is_empty())
                .map(|(pid, _)| *pid)
                .collect();
            if runnable.is_empty() {
                break;
            }
            for pid in runnable {
                if spent >= self.config.tick_budget {
                    trace!(spent, "tick budget exhausted");
                    return spent;
                }
                let limit = self.config.reductions.min(self.config.tick_budget - spent);
                spent += self.run_slice(pid, limit);
            }
        }
        trace!(spent, "tick complete");
        spent
    }

    /// Tick and fire due timers until nothing is runnable, without waiting
    /// for future timers.
    pub fn run_until_idle(&mut self) {
        loop {
            self.fire_timers(Instant::now());
            if !self.has_runnable() {
                break;
            }
            self.tick();
        }
    }

    /// Run until nothing is runnable and no live timer remains, sleeping the
    /// thread while waiting for the next deadline.
    pub fn run(&mut self) {
        loop {
            self.run_until_idle();
            self.prune_stale_timers();
            match self.timers.next_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    }
                }
                None => break,
            }
        }
    }

    fn run_slice(&mut self, pid: Pid, limit: u32) -> u32 {
        let mut used = 0;
        while used < limit {
            let Some(task) = self.queues.get_mut(&pid).and_then(VecDeque::pop_front) else {
                break;
            };
            used += 1;
            let reply = match task {
                Task::Resume(reply) => reply,
                Task::RetryReceive => match self.retry_receive(pid) {
                    Some(reply) => reply,
                    None => continue,
                },
            };
            let Some(syscall) = self.resume(pid, reply) else {
                break;
            };
            trace!(%pid, syscall = syscall.name(), "syscall");
            match self.handle_syscall(pid, syscall) {
                Flow::Continue(reply) => self.enqueue(pid, Task::Resume(reply)),
                Flow::Park => {}
            }
        }
        if let Some(process) = self.processes.get_mut(&pid) {
            process.reductions += used as u64;
        }
        used
    }

    /// Resume `pid` and return the syscall it issued, or `None` if it
    /// terminated.
    fn resume(&mut self, pid: Pid, reply: Reply) -> Option<Syscall> {
        let handle = self.coroutines.get_mut(&pid)?;
        if let Some(process) = self.processes.get_mut(&pid) {
            process.status = ProcessStatus::Running;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handle.resume(reply)));
        match outcome {
            Ok(Step::Syscall(syscall)) => Some(syscall),
            Ok(Step::Exited(reason)) => {
                self.terminate(pid, reason);
                None
            }
            Err(payload) => {
                self.terminate(pid, panic_reason(payload.as_ref()));
                None
            }
        }
    }

    fn retry_receive(&mut self, pid: Pid) -> Option<Reply> {
        let pending = self.receiving.get(&pid)?;
        let process = self.processes.get_mut(&pid)?;
        match select_message(&mut process.mailbox, &pending.clauses) {
            Ok(found) => {
                let found = found?;
                if let Some(timeout) = self.receiving.remove(&pid).and_then(|p| p.timeout) {
                    self.timers.cancel(timeout);
                }
                Some(Reply::Received(found))
            }
            Err(reason) => {
                self.terminate(pid, reason);
                None
            }
        }
    }

    fn begin_receive(&mut self, pid: Pid, clauses: Vec<Clause>, deadline: Option<Instant>) -> Flow {
        let Some(process) = self.processes.get_mut(&pid) else {
            return Flow::Park;
        };
        match select_message(&mut process.mailbox, &clauses) {
            Ok(Some(found)) => return Flow::Continue(Reply::Received(found)),
            Ok(None) => {}
            Err(reason) => {
                self.terminate(pid, reason);
                return Flow::Park;
            }
        }
        if deadline.is_some_and(|d| d <= Instant::now()) {
            return Flow::Continue(Reply::Received(Received::Timeout));
        }

        if let Some(process) = self.processes.get_mut(&pid) {
            process.status = ProcessStatus::Suspended;
        }
        self.next_token += 1;
        let token = self.next_token;
        let timeout = deadline.map(|deadline| {
            self.timers
                .push(deadline, TimerEvent::ReceiveTimeout { pid, token })
        });
        self.receiving.insert(
            pid,
            PendingReceive {
                clauses,
                token,
                timeout,
            },
        );
        Flow::Park
    }

    fn handle_syscall(&mut self, pid: Pid, syscall: Syscall) -> Flow {
        let reply = match syscall {
            Syscall::Yield => Reply::Ok,
            Syscall::Spawn {
                body,
                link,
                monitor,
            } => {
                let child = self.spawn_process(body);
                if link {
                    self.link(pid, child);
                }
                let monitor = monitor.then(|| self.monitor(pid, child));
                Reply::Spawned {
                    pid: child,
                    monitor,
                }
            }
            Syscall::Send { dest, message } => match self.send(dest, message) {
                Ok(()) => Reply::Ok,
                Err(err) => Reply::Error(err),
            },
            Syscall::SendAfter {
                pid: dest,
                message,
                after,
            } => {
                self.send_after(dest, message, after);
                Reply::Ok
            }
            Syscall::Receive { clauses, deadline } => {
                return self.begin_receive(pid, clauses, deadline);
            }
            Syscall::Sleep(duration) => {
                if let Some(process) = self.processes.get_mut(&pid) {
                    process.status = ProcessStatus::Sleeping;
                }
                self.timers
                    .push(Instant::now() + duration, TimerEvent::Wake(pid));
                return Flow::Park;
            }
            Syscall::Link(other) => {
                self.link(pid, other);
                Reply::Ok
            }
            Syscall::Unlink(other) => {
                self.unlink(pid, other);
                Reply::Ok
            }
            Syscall::Monitor(other) => Reply::Ref(self.monitor(pid, other)),
            Syscall::Demonitor(mref) => Reply::Bool(self.demonitor(mref)),
            Syscall::Exit { target, reason } => {
                self.signal_exit(Some(pid), target, reason);
                Reply::Ok
            }
            Syscall::Register(name) => match self.register(&name, pid) {
                Ok(()) => Reply::Ok,
                Err(err) => Reply::Error(err),
            },
            Syscall::Unregister(name) => Reply::Bool(self.unregister(&name)),
            Syscall::Whereis(name) => Reply::Pid(self.whereis(&name)),
            Syscall::Registered => Reply::Names(self.registered()),
            Syscall::ProcessFlag { flag, value } => {
                Reply::Term(self.process_flag(pid, &flag, value).unwrap_or(Term::Nil))
            }
            Syscall::Put { key, value } => Reply::Term(
                self.dictionary(pid, |dict| dict.insert(key, value))
                    .unwrap_or(Term::Nil),
            ),
            Syscall::Get(key) => Reply::Term(
                self.dictionary(pid, |dict| dict.get(&key).cloned())
                    .unwrap_or(Term::Nil),
            ),
            Syscall::Erase(key) => Reply::Term(
                self.dictionary(pid, |dict| dict.remove(&key))
                    .unwrap_or(Term::Nil),
            ),
            Syscall::GetKeys => Reply::Terms(
                self.dictionary(pid, |dict| Some(dict.keys().cloned().collect()))
                    .unwrap_or_default(),
            ),
            Syscall::IsAlive(other) => Reply::Bool(self.is_alive(other)),
            Syscall::List => Reply::Pids(self.list()),
            Syscall::MakeRef => Reply::Ref(self.make_ref()),
        };
        Flow::Continue(reply)
    }

    fn dictionary<T>(
        &mut self,
        pid: Pid,
        f: impl FnOnce(&mut crate::term::TermMap) -> Option<T>,
    ) -> Option<T> {
        self.processes.get_mut(&pid).and_then(|p| f(&mut p.dictionary))
    }

    // Timers

    fn fire_timers(&mut self, now: Instant) {
        while let Some(event) = self.timers.pop_due(now) {
            match event {
                TimerEvent::Wake(pid) => {
                    if self.status(pid) == Some(ProcessStatus::Sleeping) {
                        self.enqueue(pid, Task::Resume(Reply::Ok));
                    }
                }
                TimerEvent::ReceiveTimeout { pid, token } => {
                    if self.receiving.get(&pid).is_some_and(|p| p.token == token) {
                        self.receiving.remove(&pid);
                        trace!(%pid, "receive timed out");
                        self.enqueue(pid, Task::Resume(Reply::Received(Received::Timeout)));
                    }
                }
                TimerEvent::Deliver { pid, message } => {
                    self.deliver(pid, message);
                }
            }
        }
    }

    fn timer_is_live(&self, event: &TimerEvent) -> bool {
        match event {
            TimerEvent::Wake(pid) => self.status(*pid) == Some(ProcessStatus::Sleeping),
            TimerEvent::ReceiveTimeout { pid, token } => self
                .receiving
                .get(pid)
                .is_some_and(|p| p.token == *token),
            TimerEvent::Deliver { pid, .. } => self.is_alive(*pid),
        }
    }

    /// Drop timers at the head of the queue that no longer concern a
    /// waiting process, so `run` does not sleep for them.
    fn prune_stale_timers(&mut self) {
        while let Some(event) = self.timers.peek() {
            if self.timer_is_live(event) {
                break;
            }
            self.timers.pop();
        }
    }
}

impl std::fmt::Debug for ProcessSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSystem")
            .field("config", &self.config)
            .field("live", &self.processes.len())
            .field("timers", &self.timers)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::dispatch::clause;
    use crate::pattern::{literal, variable};

    type Log = Rc<RefCell<Vec<Term>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<Term> {
        log.borrow().clone()
    }

    /// A process that blocks forever on a message nobody sends.
    fn park(ctx: &Context<'_>) -> Result<()> {
        let never = clause(vec![literal(Term::atom("never"))], |_| Ok(Term::Nil));
        ctx.receive(&[never])?;
        Ok(())
    }

    #[test]
    fn test_spawn_runs_to_normal_exit() {
        let mut system = ProcessSystem::default();
        let pid = system.spawn(|_ctx| Ok(()));
        assert!(system.is_alive(pid));
        assert_eq!(system.status(pid), Some(ProcessStatus::Stopped));

        system.run_until_idle();
        assert!(!system.is_alive(pid));
        assert_eq!(system.exit_reason(pid), Some(&ExitReason::Normal));
        assert!(system.list().is_empty());
    }

    #[test]
    fn test_host_send_and_receive() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        let pid = system.spawn(move |ctx| {
            let msg = ctx.receive_any();
            out.borrow_mut().push(msg);
            Ok(())
        });

        system.run_until_idle();
        assert_eq!(system.status(pid), Some(ProcessStatus::Suspended));

        system.send(pid, Term::atom("hello")).unwrap();
        system.run_until_idle();
        assert_eq!(entries(&seen), vec![Term::atom("hello")]);
        assert!(!system.is_alive(pid));
    }

    #[test]
    fn test_selective_receive_skips_unmatched() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        let pid = system.spawn(move |ctx| {
            let want_a = clause(vec![literal(Term::atom("a"))], |_| Ok(Term::atom("a")));
            let first = ctx.receive(&[want_a])?;
            out.borrow_mut().push(first);
            out.borrow_mut().push(ctx.receive_any());
            Ok(())
        });
        system.send(pid, Term::atom("b")).unwrap();
        system.send(pid, Term::atom("a")).unwrap();

        system.run_until_idle();
        assert_eq!(entries(&seen), vec![Term::atom("a"), Term::atom("b")]);
    }

    #[test]
    fn test_receive_timeout_runs_once() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        let pid = system.spawn(move |ctx| {
            let any = clause(vec![variable()], |b| Ok(b[0].clone()));
            let result = ctx.receive_timeout(&[any], Duration::from_millis(20), || {
                Ok(Term::atom("timeout"))
            })?;
            out.borrow_mut().push(result);
            Ok(())
        });

        let started = Instant::now();
        system.run();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(entries(&seen), vec![Term::atom("timeout")]);
        assert_eq!(system.exit_reason(pid), Some(&ExitReason::Normal));
    }

    #[test]
    fn test_message_beats_timeout() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        let pid = system.spawn(move |ctx| {
            let any = clause(vec![variable()], |b| Ok(b[0].clone()));
            let result = ctx.receive_timeout(&[any], Duration::from_secs(30), || {
                Ok(Term::atom("timeout"))
            })?;
            out.borrow_mut().push(result);
            Ok(())
        });
        system.run_until_idle();
        system.send(pid, 7).unwrap();

        // The stale 30s timer must not keep `run` waiting.
        let started = Instant::now();
        system.run();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(entries(&seen), vec![Term::from(7)]);
    }

    #[test]
    fn test_round_robin_fairness() {
        let trace: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
        let config = SchedulerConfig::default().with_reductions(10);
        let mut system = ProcessSystem::new(config);
        for _ in 0..2 {
            let trace = trace.clone();
            system.spawn(move |ctx| {
                for _ in 0..100 {
                    trace.borrow_mut().push(ctx.self_pid().as_u64());
                    ctx.yield_now();
                }
                Ok(())
            });
        }
        system.run_until_idle();

        let trace = trace.borrow();
        assert_eq!(trace.len(), 200);
        let mut longest = 0;
        let mut run = 0;
        for (i, pid) in trace.iter().enumerate() {
            run = if i > 0 && trace[i - 1] == *pid { run + 1 } else { 1 };
            longest = longest.max(run);
        }
        assert!(longest <= 10, "a process ran {longest} reductions in a row");
    }

    #[test]
    fn test_tick_budget_bounds_a_tick() {
        let config = SchedulerConfig::default().with_tick_budget(5);
        let mut system = ProcessSystem::new(config);
        system.spawn(|ctx| {
            for _ in 0..100 {
                ctx.yield_now();
            }
            Ok(())
        });
        assert_eq!(system.tick(), 5);
        assert!(system.has_runnable());
    }

    #[test]
    fn test_link_cascade_terminates_partner() {
        let mut system = ProcessSystem::default();
        let parent = system.spawn(park);
        let child = system.spawn_link(parent, |_ctx| Err(RuntimeError::raise("boom")));
        assert_eq!(system.links(parent), vec![child]);

        system.run_until_idle();
        let boom = ExitReason::Error(Term::from("boom"));
        assert_eq!(system.exit_reason(child), Some(&boom));
        assert_eq!(system.exit_reason(parent), Some(&boom));
        assert!(system.list().is_empty());
    }

    #[test]
    fn test_normal_exit_is_delivered_not_fatal() {
        let mut system = ProcessSystem::default();
        let parent = system.spawn(park);
        let child = system.spawn_link(parent, |_ctx| Ok(()));

        system.run_until_idle();
        assert!(system.is_alive(parent));
        assert!(system.links(parent).is_empty());
        assert_eq!(
            system.messages(parent),
            vec![exit_message(Some(child), &ExitReason::Normal)]
        );
    }

    #[test]
    fn test_trap_exit_converts_signal_to_message() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        let parent = system.spawn(move |ctx| {
            assert_eq!(ctx.process_flag("trap_exit", true), Term::Boolean(false));
            let child = ctx.spawn_link(|_ctx| Err(RuntimeError::raise("boom")));
            out.borrow_mut().push(Term::Pid(child));
            out.borrow_mut().push(ctx.receive_any());
            Ok(())
        });

        system.run_until_idle();
        let seen = entries(&seen);
        let child = seen[0].as_pid().unwrap();
        assert_eq!(
            seen[1],
            Term::tuple([Term::atom("EXIT"), Term::Pid(child), Term::from("boom")])
        );
        assert_eq!(system.exit_reason(parent), Some(&ExitReason::Normal));
    }

    #[test]
    fn test_kill_ignores_trap_exit() {
        let mut system = ProcessSystem::default();
        let pid = system.spawn(|ctx| {
            ctx.process_flag("trap_exit", true);
            park(ctx)
        });
        system.run_until_idle();

        system.exit(None, pid, ExitReason::Kill);
        assert_eq!(system.exit_reason(pid), Some(&ExitReason::Killed));
    }

    #[test]
    fn test_exit_signal_from_process() {
        let mut system = ProcessSystem::default();
        let victim = system.spawn(park);
        system.spawn(move |ctx| {
            ctx.exit(victim, ExitReason::from_term(Term::atom("shutdown")));
            Ok(())
        });

        system.run_until_idle();
        assert_eq!(
            system.exit_reason(victim),
            Some(&ExitReason::Error(Term::atom("shutdown")))
        );
    }

    #[test]
    fn test_monitor_receives_down() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        system.spawn(move |ctx| {
            let (pid, mref) = ctx.spawn_monitor(|_ctx| Ok(()));
            let down = ctx.receive_any();
            assert_eq!(down, down_message(mref, pid, &ExitReason::Normal));
            out.borrow_mut().push(down);
            Ok(())
        });

        system.run_until_idle();
        assert_eq!(entries(&seen).len(), 1);
    }

    #[test]
    fn test_monitor_unknown_pid_is_noproc() {
        let mut system = ProcessSystem::default();
        let observer = system.spawn(park);
        let ghost = Pid(999);

        let mref = system.monitor(observer, ghost);
        assert_eq!(
            system.messages(observer),
            vec![down_message(mref, ghost, &ExitReason::NoProc)]
        );
        assert!(!system.demonitor(mref));
    }

    #[test]
    fn test_demonitor_suppresses_down() {
        let mut system = ProcessSystem::default();
        let observer = system.spawn(park);
        let observed = system.spawn(park);
        let mref = system.monitor(observer, observed);
        system.run_until_idle();

        assert!(system.demonitor(mref));
        system.exit(None, observed, ExitReason::Kill);
        assert_eq!(system.mailbox_len(observer), Some(0));
    }

    #[test]
    fn test_registry_lifecycle() {
        let mut system = ProcessSystem::default();
        let server = system.spawn(|ctx| {
            ctx.register("server")?;
            park(ctx)
        });
        system.run_until_idle();
        assert_eq!(system.whereis("server"), Some(server));
        assert_eq!(system.registered(), vec!["server".to_string()]);

        system.send("server", Term::atom("ping")).unwrap();
        assert_eq!(system.mailbox_len(server), Some(1));

        let other = system.spawn(park);
        assert!(matches!(
            system.register("server", other),
            Err(RuntimeError::NameTaken { .. })
        ));

        system.exit(None, server, ExitReason::Kill);
        assert_eq!(system.whereis("server"), None);
        assert_eq!(
            system.send("server", 1),
            Err(RuntimeError::UnregisteredName("server".to_string()))
        );
    }

    #[test]
    fn test_send_to_dead_pid_is_dropped() {
        let mut system = ProcessSystem::default();
        let pid = system.spawn(|_ctx| Ok(()));
        system.run_until_idle();
        assert!(system.send(pid, 1).is_ok());
    }

    #[test]
    fn test_sleep_waits() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        let pid = system.spawn(move |ctx| {
            ctx.sleep(Duration::from_millis(15));
            out.borrow_mut().push(Term::atom("woke"));
            Ok(())
        });

        system.run_until_idle();
        assert_eq!(system.status(pid), Some(ProcessStatus::Sleeping));
        let started = Instant::now();
        system.run();
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(entries(&seen), vec![Term::atom("woke")]);
    }

    #[test]
    fn test_send_after_delivers_later() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        let pid = system.spawn(move |ctx| {
            out.borrow_mut().push(ctx.receive_any());
            Ok(())
        });
        system.send_after(pid, Term::atom("tick"), Duration::from_millis(10));

        system.run_until_idle();
        assert!(system.is_alive(pid));
        system.run();
        assert_eq!(entries(&seen), vec![Term::atom("tick")]);
    }

    #[test]
    fn test_panic_becomes_exit_reason() {
        let mut system = ProcessSystem::default();
        let watcher = system.spawn(park);
        let pid = system.spawn(|_ctx| panic!("kaboom"));
        let mref = system.monitor(watcher, pid);

        system.run_until_idle();
        let reason = ExitReason::Error(Term::from("kaboom"));
        assert_eq!(system.exit_reason(pid), Some(&reason));
        assert_eq!(system.messages(watcher), vec![down_message(mref, pid, &reason)]);
    }

    #[test]
    fn test_process_dictionary() {
        let seen = log();
        let mut system = ProcessSystem::default();
        let out = seen.clone();
        system.spawn(move |ctx| {
            assert_eq!(ctx.put("k", 1), Term::Nil);
            assert_eq!(ctx.put("k", 2), Term::from(1));
            assert_eq!(ctx.get_keys(), vec![Term::from("k")]);
            out.borrow_mut().push(ctx.get("k"));
            out.borrow_mut().push(ctx.erase("k"));
            out.borrow_mut().push(ctx.get("k"));
            Ok(())
        });

        system.run_until_idle();
        assert_eq!(entries(&seen), vec![Term::from(2), Term::from(2), Term::Nil]);
    }

    #[test]
    fn test_link_to_dead_pid_signals_noproc() {
        let mut system = ProcessSystem::default();
        let dead = system.spawn(|_ctx| Ok(()));
        system.run_until_idle();

        let pid = system.spawn(move |ctx| {
            ctx.link(dead);
            park(ctx)
        });
        system.run_until_idle();
        assert_eq!(system.exit_reason(pid), Some(&ExitReason::NoProc));
    }

    #[test]
    fn test_long_link_chain_cascades() {
        let config = SchedulerConfig::default().with_stack_size(16 * 1024);
        let mut system = ProcessSystem::new(config);
        let first = system.spawn(park);
        let mut last = first;
        for _ in 0..5_000 {
            last = system.spawn_link(last, park);
        }

        let boom = ExitReason::Error(Term::atom("boom"));
        system.exit(None, first, boom.clone());
        assert!(system.list().is_empty());
        assert_eq!(system.exit_reason(last), Some(&boom));
    }

    #[test]
    fn test_panicking_receive_guard_exits_process() {
        fn guarded(ctx: &Context<'_>) -> Result<()> {
            let positive = clause(vec![variable()], |b| Ok(b[0].clone())).when(|b| {
                match b[0].as_int() {
                    Some(n) => n > 0,
                    None => panic!("guard saw a non-integer"),
                }
            });
            ctx.receive(&[positive])?;
            Ok(())
        }

        let mut system = ProcessSystem::default();
        let early = system.spawn(guarded);
        let late = system.spawn(guarded);
        let watcher = system.spawn(park);
        let mref = system.monitor(watcher, late);
        system.send(early, Term::atom("oops")).unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| system.run_until_idle()));
        assert!(outcome.is_ok());
        let reason = ExitReason::Error(Term::from("guard saw a non-integer"));
        assert_eq!(system.exit_reason(early), Some(&reason));
        assert_eq!(system.status(late), Some(ProcessStatus::Suspended));

        system.send(late, Term::atom("oops")).unwrap();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| system.run_until_idle()));
        assert!(outcome.is_ok());
        assert_eq!(system.exit_reason(late), Some(&reason));
        assert_eq!(system.messages(watcher), vec![down_message(mref, late, &reason)]);
    }

    #[test]
    fn test_zero_budgets_are_clamped() {
        let config = SchedulerConfig {
            reductions: 0,
            tick_budget: 0,
            ..SchedulerConfig::default()
        };
        let mut system = ProcessSystem::new(config);
        assert_eq!(system.config().reductions, 1);
        assert_eq!(system.config().tick_budget, 1);

        let pid = system.spawn(|ctx| {
            ctx.yield_now();
            Ok(())
        });
        system.run_until_idle();
        assert_eq!(system.exit_reason(pid), Some(&ExitReason::Normal));

        std::env::set_var("EMBER_REDUCTIONS", "0");
        std::env::set_var("EMBER_TICK_BUDGET", "0");
        let from_env = SchedulerConfig::from_env();
        std::env::remove_var("EMBER_REDUCTIONS");
        std::env::remove_var("EMBER_TICK_BUDGET");
        assert_eq!(from_env.reductions, 1);
        assert_eq!(from_env.tick_budget, 1);
    }

    #[test]
    fn test_satisfied_receive_cancels_timeout() {
        let mut system = ProcessSystem::default();
        let pid = system.spawn(|ctx| {
            let any = clause(vec![variable()], |b| Ok(b[0].clone()));
            loop {
                let msg = ctx.receive_timeout(&[any.clone()], Duration::from_secs(60), || {
                    Ok(Term::atom("idle"))
                })?;
                if msg == Term::atom("stop") {
                    return Ok(());
                }
            }
        });

        for n in 0..1_000 {
            system.send(pid, n).unwrap();
            system.run_until_idle();
            assert!(system.timers.len() <= 1);
        }
        system.send(pid, Term::atom("stop")).unwrap();
        system.run_until_idle();
        assert_eq!(system.exit_reason(pid), Some(&ExitReason::Normal));
        assert!(system.timers.is_empty());
    }

    #[test]
    fn test_killed_receiver_drops_its_timeout() {
        let mut system = ProcessSystem::default();
        let pid = system.spawn(|ctx| {
            let never = clause(vec![literal(Term::atom("never"))], |_| Ok(Term::Nil));
            ctx.receive_timeout(&[never], Duration::from_secs(60), || Ok(Term::Nil))?;
            Ok(())
        });
        system.run_until_idle();
        assert_eq!(system.timers.len(), 1);

        system.exit(None, pid, ExitReason::Kill);
        assert!(system.timers.is_empty());
    }

    #[test]
    fn test_invalid_env_value_ignored() {
        std::env::set_var("EMBER_TEST_BOGUS_SETTING", "many");
        assert_eq!(env_value::<u32>("EMBER_TEST_BOGUS_SETTING"), None);
        std::env::set_var("EMBER_TEST_GOOD_SETTING", " 42 ");
        assert_eq!(env_value::<u32>("EMBER_TEST_GOOD_SETTING"), Some(42));
    }
}
