//! Runtime error taxonomy.
//!
//! Dispatch and match failures, bitstring construction errors and registry
//! failures are ordinary Rust errors returned to the caller. Exit reasons are
//! not errors: they are values carried by the link/monitor machinery. A
//! process body that returns an `Err` has that error turned into its exit
//! reason by [`RuntimeError::into_exit_reason`].

use thiserror::Error;

use crate::actor::{ExitReason, Pid};
use crate::bitstring::BitStringError;
use crate::term::Term;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;

fn render_args(args: &[Term]) -> String {
    args.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the runtime at the resolving call site.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A single pattern failed to match its value.
    #[error("no match of right hand side value: {value}")]
    BadMatch { value: Term },

    /// No clause of a multi-clause function accepted the arguments.
    #[error("no function clause matching arguments ({})", render_args(.args))]
    FunctionClause { args: Vec<Term> },

    /// No clause bucket exists for the call's argument count.
    #[error("no function clause of arity {arity}")]
    Arity { arity: usize },

    #[error(transparent)]
    BitString(#[from] BitStringError),

    /// `send` to a name nobody registered.
    #[error("no process registered under name {0:?}")]
    UnregisteredName(String),

    /// `register` of a name already owned by another process.
    #[error("name {name:?} is already registered to {pid}")]
    NameTaken { name: String, pid: Pid },

    /// `register` of a process that already has a name.
    #[error("{pid} is already registered as {name:?}")]
    AlreadyRegistered { name: String, pid: Pid },

    /// A guest-level `raise`/`throw` of an arbitrary value.
    #[error("{0}")]
    Raise(Term),

    /// A guest-level `exit(reason)` unwinding the current process body.
    #[error("exit: {0}")]
    Exit(ExitReason),
}

impl RuntimeError {
    /// Convenience for guest code raising a plain value.
    pub fn raise(value: impl Into<Term>) -> Self {
        RuntimeError::Raise(value.into())
    }

    /// Convert an error escaping a process body into that process's exit
    /// reason.
    pub fn into_exit_reason(self) -> ExitReason {
        match self {
            RuntimeError::Exit(reason) => reason,
            RuntimeError::Raise(value) => ExitReason::from_term(value),
            other => ExitReason::Error(other.to_term()),
        }
    }

    /// Render the error as a guest value (`{:badmatch, v}` and friends).
    pub fn to_term(&self) -> Term {
        match self {
            RuntimeError::BadMatch { value } => {
                Term::tuple([Term::atom("badmatch"), value.clone()])
            }
            RuntimeError::FunctionClause { args } => {
                Term::tuple([Term::atom("function_clause"), Term::list(args.iter().cloned())])
            }
            RuntimeError::Arity { arity } => {
                Term::tuple([Term::atom("badarity"), Term::Integer(*arity as i64)])
            }
            RuntimeError::BitString(err) => {
                Term::tuple([Term::atom("badarg"), Term::string(err.to_string())])
            }
            RuntimeError::UnregisteredName(name) => {
                Term::tuple([Term::atom("badarg"), Term::atom(name)])
            }
            RuntimeError::NameTaken { name, .. } | RuntimeError::AlreadyRegistered { name, .. } => {
                Term::tuple([Term::atom("badarg"), Term::atom(name)])
            }
            RuntimeError::Raise(value) => value.clone(),
            RuntimeError::Exit(reason) => reason.to_term(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
