//! Compile patterns into matcher closures.
//!
//! `build_match` walks a [`Pattern`] once and produces a tree of closures, one
//! per node, each produced by the resolver for that pattern kind. Matching
//! is transactional: [`Matcher::test`] leaves the bindings exactly as it found
//! them when it fails, so a failed alternative never leaks partial bindings
//! into the next one.

use std::fmt;
use std::sync::Arc;

use super::{Bindings, Pattern, Variable};
use crate::bitstring;
use crate::term::{Atom, Term, TermMap};

type MatchFn = dyn Fn(&Term, &mut Bindings) -> bool + Send + Sync;

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// A compiled pattern. Cheap to clone and shareable across threads.
#[derive(Clone)]
pub struct Matcher(Arc<MatchFn>);

impl Matcher {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: Fn(&Term, &mut Bindings) -> bool + Send + Sync + 'static,
    {
        Matcher(Arc::new(f))
    }

    /// Test `value`, appending bindings on success.
    ///
    /// On failure `bindings` is truncated back to its length on entry.
    pub fn test(&self, value: &Term, bindings: &mut Bindings) -> bool {
        let mark = bindings.len();
        if (self.0)(value, bindings) {
            true
        } else {
            bindings.truncate(mark);
            false
        }
    }

    /// Match `value` from scratch, including the repeated-name check.
    pub fn run(&self, value: &Term) -> Option<Bindings> {
        let mut bindings = Bindings::new();
        (self.test(value, &mut bindings) && bindings.is_consistent()).then_some(bindings)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Matcher(..)")
    }
}

// ---------------------------------------------------------------------------
// SequenceMatcher
// ---------------------------------------------------------------------------

/// A fixed-length sequence of matchers, applied to an argument slice.
///
/// Used for clause parameter lists so calls do not have to box their
/// arguments into a list term first.
#[derive(Clone, Debug)]
pub struct SequenceMatcher {
    items: Arc<[Matcher]>,
}

impl SequenceMatcher {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn test(&self, values: &[Term], bindings: &mut Bindings) -> bool {
        let mark = bindings.len();
        if match_elements(&self.items, values, bindings) {
            true
        } else {
            bindings.truncate(mark);
            false
        }
    }

    pub fn run(&self, values: &[Term]) -> Option<Bindings> {
        let mut bindings = Bindings::new();
        (self.test(values, &mut bindings) && bindings.is_consistent()).then_some(bindings)
    }
}

/// Compile a list of patterns into one sequence matcher.
pub fn build_sequence(patterns: &[Pattern]) -> SequenceMatcher {
    SequenceMatcher {
        items: patterns.iter().map(build_match).collect(),
    }
}

// ---------------------------------------------------------------------------
// build_match
// ---------------------------------------------------------------------------

/// Compile a pattern into a matcher.
pub fn build_match(pattern: &Pattern) -> Matcher {
    match pattern {
        Pattern::Variable(var) => resolve_variable(var),
        Pattern::Wildcard => resolve_wildcard(),
        Pattern::HeadTail { head, tail } => resolve_head_tail(head, tail),
        Pattern::StartsWith { prefix } => resolve_starts_with(prefix),
        Pattern::Capture(inner) => resolve_capture(inner),
        Pattern::Bound(value) => resolve_bound(value),
        Pattern::Type { ctor, fields } => resolve_type(ctor, fields),
        Pattern::BitStringMatch(binary) => bitstring::resolve_binary(binary),
        Pattern::List(items) => resolve_list(items),
        Pattern::Tuple(items) => resolve_tuple(items),
        Pattern::Literal(value) => resolve_literal(value),
        Pattern::Map(entries) => resolve_map(entries),
    }
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

fn resolve_variable(var: &Variable) -> Matcher {
    match var.checked_name().cloned() {
        Some(name) => Matcher::new(move |value, bindings| {
            bindings.push_named(name.clone(), value.clone());
            true
        }),
        None => Matcher::new(|value, bindings| {
            bindings.push(value.clone());
            true
        }),
    }
}

fn resolve_wildcard() -> Matcher {
    Matcher::new(|_, _| true)
}

fn resolve_head_tail(head: &Pattern, tail: &Pattern) -> Matcher {
    let head = build_match(head);
    let tail = build_match(tail);
    Matcher::new(move |value, bindings| match value {
        Term::List(items) if !items.is_empty() => {
            head.test(&items[0], bindings) && tail.test(&Term::List(items[1..].to_vec()), bindings)
        }
        _ => false,
    })
}

fn resolve_starts_with(prefix: &str) -> Matcher {
    let prefix = prefix.to_string();
    Matcher::new(move |value, bindings| {
        match value.as_str().and_then(|s| s.strip_prefix(prefix.as_str())) {
            Some(rest) => {
                bindings.push(Term::Str(rest.to_string()));
                true
            }
            None => false,
        }
    })
}

fn resolve_capture(inner: &Pattern) -> Matcher {
    let inner = build_match(inner);
    Matcher::new(move |value, bindings| {
        if !inner.test(value, bindings) {
            return false;
        }
        bindings.push(value.clone());
        true
    })
}

fn resolve_bound(pinned: &Term) -> Matcher {
    let pinned = pinned.clone();
    Matcher::new(move |value, bindings| {
        if *value != pinned {
            return false;
        }
        bindings.push(pinned.clone());
        true
    })
}

fn resolve_type(ctor: &Atom, fields: &[(Term, Pattern)]) -> Matcher {
    let ctor = ctor.clone();
    let fields = compile_entries(fields);
    Matcher::new(move |value, bindings| match value {
        Term::Struct(s) if s.name == ctor => match_entries(&fields, &s.fields, bindings),
        _ => false,
    })
}

fn resolve_list(items: &[Pattern]) -> Matcher {
    let items: Vec<Matcher> = items.iter().map(build_match).collect();
    Matcher::new(move |value, bindings| match value {
        Term::List(values) => match_elements(&items, values, bindings),
        _ => false,
    })
}

fn resolve_tuple(items: &[Pattern]) -> Matcher {
    let items: Vec<Matcher> = items.iter().map(build_match).collect();
    Matcher::new(move |value, bindings| match value {
        Term::Tuple(values) => match_elements(&items, values, bindings),
        _ => false,
    })
}

fn resolve_literal(expected: &Term) -> Matcher {
    let expected = expected.clone();
    let kind = expected.kind();
    if kind.is_primitive() {
        return Matcher::new(move |value, _| value.kind() == kind && *value == expected);
    }
    Matcher::new(move |value, _| *value == expected)
}

fn resolve_map(entries: &[(Term, Pattern)]) -> Matcher {
    let entries = compile_entries(entries);
    Matcher::new(move |value, bindings| match value {
        Term::Map(map) => match_entries(&entries, map, bindings),
        Term::Struct(s) => match_entries(&entries, &s.fields, bindings),
        _ => false,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn compile_entries(entries: &[(Term, Pattern)]) -> Vec<(Term, Matcher)> {
    entries
        .iter()
        .map(|(key, pattern)| (key.clone(), build_match(pattern)))
        .collect()
}

fn match_elements(items: &[Matcher], values: &[Term], bindings: &mut Bindings) -> bool {
    items.len() == values.len()
        && items
            .iter()
            .zip(values)
            .all(|(matcher, value)| matcher.test(value, bindings))
}

fn match_entries(entries: &[(Term, Matcher)], map: &TermMap, bindings: &mut Bindings) -> bool {
    entries
        .iter()
        .all(|(key, matcher)| map.get(key).is_some_and(|v| matcher.test(v, bindings)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
