//! Guest-language values.
//!
//! Every value that flows through a matcher, a clause body or a mailbox is a
//! [`Term`]. The set of value kinds is closed: capability checks such as
//! "is this a list" are answered by [`Term::kind`] rather than by probing
//! host types at runtime.
//!
//! Equality is strict (`===` in the guest): two terms are equal only when
//! they have the same kind and equal contents, so `1` never equals `1.0`.

use std::fmt;
use std::sync::Arc;

use crate::actor::{Pid, Reference};
use crate::bitstring::BitString;

// ---------------------------------------------------------------------------
// Atom
// ---------------------------------------------------------------------------

/// An interned-by-value symbolic constant (`:ok`, `:EXIT`, ...).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(Arc<str>);

impl Atom {
    pub fn new(name: &str) -> Self {
        Atom(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Atom {
    fn from(name: &str) -> Self {
        Atom::new(name)
    }
}

// ---------------------------------------------------------------------------
// TermKind
// ---------------------------------------------------------------------------

/// The kind of a [`Term`], used wherever the runtime needs to branch on the
/// shape of a value without inspecting its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    Nil,
    Boolean,
    Integer,
    Float,
    Atom,
    String,
    List,
    Tuple,
    Map,
    Struct,
    BitString,
    Pid,
    Reference,
}

impl TermKind {
    /// Primitive kinds are compared by value alone and have no children.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            TermKind::Nil
                | TermKind::Boolean
                | TermKind::Integer
                | TermKind::Float
                | TermKind::Atom
                | TermKind::String
        )
    }
}

// ---------------------------------------------------------------------------
// TermMap
// ---------------------------------------------------------------------------

/// An association map keyed by arbitrary terms.
///
/// Keys may be floats, so the map cannot rely on `Hash`/`Ord`; lookups are
/// linear. Equality ignores insertion order.
#[derive(Debug, Clone, Default)]
pub struct TermMap {
    entries: Vec<(Term, Term)>,
}

impl TermMap {
    pub fn new() -> Self {
        TermMap { entries: Vec::new() }
    }

    pub fn get(&self, key: &Term) -> Option<&Term> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Term) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(&mut self, key: Term, value: Term) -> Option<Term> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &Term) -> Option<Term> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Term, &Term)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Term> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl PartialEq for TermMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

impl FromIterator<(Term, Term)> for TermMap {
    fn from_iter<I: IntoIterator<Item = (Term, Term)>>(iter: I) -> Self {
        let mut map = TermMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Struct
// ---------------------------------------------------------------------------

/// A named record: the guest's "instance of a constructor".
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    pub name: Atom,
    pub fields: TermMap,
}

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

/// A guest-language value.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Atom(Atom),
    Str(String),
    List(Vec<Term>),
    Tuple(Vec<Term>),
    Map(TermMap),
    Struct(Struct),
    BitString(BitString),
    Pid(Pid),
    Ref(Reference),
}

impl Term {
    pub fn atom(name: &str) -> Term {
        Term::Atom(Atom::new(name))
    }

    pub fn string(s: impl Into<String>) -> Term {
        Term::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Term>) -> Term {
        Term::List(items.into_iter().collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = Term>) -> Term {
        Term::Tuple(items.into_iter().collect())
    }

    pub fn map(entries: impl IntoIterator<Item = (Term, Term)>) -> Term {
        Term::Map(entries.into_iter().collect())
    }

    pub fn record(name: &str, fields: impl IntoIterator<Item = (Term, Term)>) -> Term {
        Term::Struct(Struct {
            name: Atom::new(name),
            fields: fields.into_iter().collect(),
        })
    }

    pub fn kind(&self) -> TermKind {
        match self {
            Term::Nil => TermKind::Nil,
            Term::Boolean(_) => TermKind::Boolean,
            Term::Integer(_) => TermKind::Integer,
            Term::Float(_) => TermKind::Float,
            Term::Atom(_) => TermKind::Atom,
            Term::Str(_) => TermKind::String,
            Term::List(_) => TermKind::List,
            Term::Tuple(_) => TermKind::Tuple,
            Term::Map(_) => TermKind::Map,
            Term::Struct(_) => TermKind::Struct,
            Term::BitString(_) => TermKind::BitString,
            Term::Pid(_) => TermKind::Pid,
            Term::Ref(_) => TermKind::Reference,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Term::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Term::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_pid(&self) -> Option<Pid> {
        match self {
            Term::Pid(pid) => Some(*pid),
            _ => None,
        }
    }

    /// True for the atom with the given name.
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Term::Atom(a) if a.as_str() == name)
    }

    /// Guest truthiness: everything except `nil` and `false` is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Term::Nil | Term::Boolean(false))
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Integer(n)
    }
}

impl From<i32> for Term {
    fn from(n: i32) -> Self {
        Term::Integer(n as i64)
    }
}

impl From<f64> for Term {
    fn from(x: f64) -> Self {
        Term::Float(x)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Boolean(b)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Str(s.to_string())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Str(s)
    }
}

impl From<Atom> for Term {
    fn from(a: Atom) -> Self {
        Term::Atom(a)
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Term::List(items)
    }
}

impl From<Pid> for Term {
    fn from(pid: Pid) -> Self {
        Term::Pid(pid)
    }
}

impl From<Reference> for Term {
    fn from(r: Reference) -> Self {
        Term::Ref(r)
    }
}

impl From<BitString> for Term {
    fn from(bs: BitString) -> Self {
        Term::BitString(bs)
    }
}

// ---------------------------------------------------------------------------
// Inspect-style rendering
// ---------------------------------------------------------------------------

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_pairs(f: &mut fmt::Formatter<'_>, map: &TermMap) -> fmt::Result {
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{k} => {v}")?;
    }
    Ok(())
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Nil => f.write_str("nil"),
            Term::Boolean(b) => write!(f, "{b}"),
            Term::Integer(n) => write!(f, "{n}"),
            Term::Float(x) => write!(f, "{x:?}"),
            Term::Atom(a) => write!(f, ":{a}"),
            Term::Str(s) => write!(f, "{s:?}"),
            Term::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Term::Tuple(items) => {
                f.write_str("{")?;
                write_seq(f, items)?;
                f.write_str("}")
            }
            Term::Map(map) => {
                f.write_str("%{")?;
                write_pairs(f, map)?;
                f.write_str("}")
            }
            Term::Struct(s) => {
                write!(f, "%{}{{", s.name)?;
                write_pairs(f, &s.fields)?;
                f.write_str("}")
            }
            Term::BitString(bs) => write!(f, "{bs}"),
            Term::Pid(pid) => write!(f, "{pid}"),
            Term::Ref(r) => write!(f, "{r}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
