//! Ember runtime library.
//!
//! The runtime support that Ember programs are lowered onto: structural
//! pattern matching, multi-clause dispatch, binary construction and matching,
//! and a cooperative process runtime in the Erlang tradition.
//!
//! ## Modules
//!
//! - [`term`]: the dynamic value model every other module works on
//! - [`pattern`]: pattern constructors and the pattern compiler
//! - [`dispatch`]: clauses, guards and multi-clause functions
//! - [`bitstring`]: segment-based binary construction and binary patterns
//! - [`comprehension`]: `for` comprehensions over lists and binaries
//! - [`actor`]: processes, mailboxes, scheduler, links, monitors, registry
//! - [`error`]: the runtime error taxonomy
//!
//! Patterns are compiled once into closure trees ([`pattern::Matcher`]) and
//! reused for every match; a pattern never walks its own syntax at match
//! time.

pub mod actor;
pub mod bitstring;
pub mod comprehension;
pub mod dispatch;
pub mod error;
pub mod pattern;
pub mod term;

// Re-export the types most callers need.
pub use actor::{Context, Dest, ExitReason, Pid, ProcessSystem, Reference, SchedulerConfig};
pub use bitstring::{BinaryPattern, BitString, BitStringError, Segment};
pub use dispatch::{clause, defmatch, match_guarded, match_or_default, match_pattern, Clause, Function};
pub use error::{Result, RuntimeError};
pub use pattern::{build_match, Matcher, Pattern};
pub use term::{Atom, Term, TermMap};
