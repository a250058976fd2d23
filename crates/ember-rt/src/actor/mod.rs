//! Actor runtime module for Ember.
//!
//! Provides cooperative lightweight processes on a single host thread:
//! Process Control Blocks, a reduction-counting round-robin scheduler, and
//! stackful coroutines via corosensei.
//!
//! ## Architecture
//!
//! - **Process** (`process.rs`): The PCB holding PID, status, mailbox,
//!   links, monitors, flags and the process dictionary.
//! - **Mailbox** (`mailbox.rs`): FIFO inbox with content-addressed removal
//!   for selective receive.
//! - **Stack** (`stack.rs`): Corosensei coroutines. A process body talks to
//!   the runtime only by yielding syscalls through its [`Context`].
//! - **Scheduler** (`scheduler.rs`): The [`ProcessSystem`], which owns all
//!   runtime state and performs every syscall.
//! - **Link** / **Monitor** (`link.rs`, `monitor.rs`): exit signal rules and
//!   `:DOWN` notifications.
//! - **Registry** (`registry.rs`): name to pid bijection.
//! - **Timer** (`timer.rs`): deadlines for receive timeouts, sleeps and
//!   delayed sends.
//!
//! ## Host API
//!
//! ```ignore
//! let mut system = ProcessSystem::default();
//! let pid = system.spawn(|ctx| {
//!     let msg = ctx.receive_any();
//!     tracing::info!(%msg, "got");
//!     Ok(())
//! });
//! system.send(pid, Term::atom("hello"))?;
//! system.run();
//! ```

pub mod link;
pub mod mailbox;
pub mod monitor;
pub mod process;
pub mod registry;
pub mod scheduler;
pub mod stack;
pub mod timer;

pub use link::{exit_action, exit_message, ExitAction};
pub use mailbox::Mailbox;
pub use monitor::{down_message, Monitor, MonitorTable};
pub use process::{
    ExitReason, Pid, Process, ProcessStatus, Reference, DEFAULT_REDUCTIONS, DEFAULT_STACK_SIZE,
};
pub use registry::ProcessRegistry;
pub use scheduler::{Dest, ProcessSystem, SchedulerConfig, DEFAULT_TICK_BUDGET};
pub use stack::{Context, ProcessBody, Received};
pub use timer::{TimerEvent, TimerId, TimerQueue};
