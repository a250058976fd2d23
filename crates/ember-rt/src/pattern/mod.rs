//! Patterns and their compilation into matchers.
//!
//! A [`Pattern`] is a plain description of the shape a value must have. It
//! is compiled once by [`build_match`] into a [`Matcher`], a closure tree
//! that tests a candidate and appends its bindings in pattern order.
//!
//! ## Pattern kinds
//!
//! - `Variable` -- binds anything (optionally named, optionally defaulted)
//! - `Wildcard` -- accepts anything, binds nothing
//! - `HeadTail` -- non-empty list split into first element and rest
//! - `StartsWith` -- string with a literal prefix, binds the remainder
//! - `Capture` -- matches a sub-pattern, then also binds the whole value
//! - `Bound` -- equality against a pinned value, re-binding it
//! - `Type` -- struct of a given name whose fields match a map pattern
//! - `BitStringMatch` -- binary with a segment layout
//! - `List` / `Tuple` -- fixed-length sequence, element by element
//! - `Literal` -- equality against a constant
//! - `Map` -- every listed key present with a matching value

pub mod bindings;
pub mod compile;

use std::sync::Arc;

pub use bindings::{Binding, Bindings};
pub use compile::{build_match, build_sequence, Matcher, SequenceMatcher};

use crate::bitstring::{BinaryPattern, BitStringError, Segment};
use crate::term::{Atom, Term};

// ---------------------------------------------------------------------------
// Variable
// ---------------------------------------------------------------------------

/// A binding slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Named variables take part in the repeated-name consistency check.
    pub name: Option<Arc<str>>,
    /// Value substituted when a top-level clause parameter is omitted.
    pub default: Option<Term>,
    /// Bind positionally even though a name is present.
    pub ignore: bool,
}

impl Variable {
    /// Name used for the consistency check, if this variable has one.
    ///
    /// Names starting with `__` are compiler-generated and never checked.
    pub(crate) fn checked_name(&self) -> Option<&Arc<str>> {
        match &self.name {
            Some(name) if !self.ignore && !name.starts_with("__") => Some(name),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A structural description of a value, compiled by [`build_match`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Variable(Variable),
    Wildcard,
    HeadTail { head: Box<Pattern>, tail: Box<Pattern> },
    StartsWith { prefix: String },
    Capture(Box<Pattern>),
    Bound(Term),
    Type { ctor: Atom, fields: Vec<(Term, Pattern)> },
    BitStringMatch(BinaryPattern),
    List(Vec<Pattern>),
    Tuple(Vec<Pattern>),
    Literal(Term),
    Map(Vec<(Term, Pattern)>),
}

impl Pattern {
    /// The default value of a top-level optional parameter.
    pub fn default_value(&self) -> Option<&Term> {
        match self {
            Pattern::Variable(var) => var.default.as_ref(),
            _ => None,
        }
    }
}

impl From<Term> for Pattern {
    fn from(value: Term) -> Self {
        Pattern::Literal(value)
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// An anonymous variable: binds the candidate positionally.
pub fn variable() -> Pattern {
    Pattern::Variable(Variable {
        name: None,
        default: None,
        ignore: false,
    })
}

/// A named variable. Reusing a name within one pattern requires the bound
/// values to be equal.
pub fn named(name: &str) -> Pattern {
    Pattern::Variable(Variable {
        name: Some(Arc::from(name)),
        default: None,
        ignore: false,
    })
}

/// A named variable that is exempt from the consistency check.
pub fn ignored(name: &str) -> Pattern {
    Pattern::Variable(Variable {
        name: Some(Arc::from(name)),
        default: None,
        ignore: true,
    })
}

/// A parameter that may be omitted by the caller, in which case `default`
/// is substituted before matching.
pub fn optional(name: &str, default: impl Into<Term>) -> Pattern {
    Pattern::Variable(Variable {
        name: Some(Arc::from(name)),
        default: Some(default.into()),
        ignore: false,
    })
}

pub fn wildcard() -> Pattern {
    Pattern::Wildcard
}

pub fn head_tail(head: Pattern, tail: Pattern) -> Pattern {
    Pattern::HeadTail {
        head: Box::new(head),
        tail: Box::new(tail),
    }
}

pub fn starts_with(prefix: impl Into<String>) -> Pattern {
    Pattern::StartsWith {
        prefix: prefix.into(),
    }
}

pub fn capture(pattern: Pattern) -> Pattern {
    Pattern::Capture(Box::new(pattern))
}

pub fn bound(value: impl Into<Term>) -> Pattern {
    Pattern::Bound(value.into())
}

pub fn type_of(ctor: &str, fields: impl IntoIterator<Item = (Term, Pattern)>) -> Pattern {
    Pattern::Type {
        ctor: Atom::new(ctor),
        fields: fields.into_iter().collect(),
    }
}

/// A binary pattern. Fails if a size-less variable segment is not last or
/// a segment specification is invalid.
pub fn bit_string_match(segments: Vec<Segment>) -> Result<Pattern, BitStringError> {
    BinaryPattern::new(segments).map(Pattern::BitStringMatch)
}

pub fn literal(value: impl Into<Term>) -> Pattern {
    Pattern::Literal(value.into())
}

pub fn list(items: impl IntoIterator<Item = Pattern>) -> Pattern {
    Pattern::List(items.into_iter().collect())
}

pub fn tuple(items: impl IntoIterator<Item = Pattern>) -> Pattern {
    Pattern::Tuple(items.into_iter().collect())
}

pub fn map(entries: impl IntoIterator<Item = (Term, Pattern)>) -> Pattern {
    Pattern::Map(entries.into_iter().collect())
}
