//! Ordered bindings produced by a successful match.
//!
//! Every binding-producing pattern appends exactly one entry in left-to-right
//! order, so a clause body receives its variables positionally. Named
//! entries additionally take part in the consistency check: a name that is
//! bound twice in one match must be bound to equal values both times.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::term::Term;

/// One bound value, optionally carrying the variable name that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Option<Arc<str>>,
    pub value: Term,
}

/// The sequence of values a match bound, in pattern order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Append a positional (unnamed) binding.
    pub fn push(&mut self, value: Term) {
        self.entries.push(Binding { name: None, value });
    }

    /// Append a binding that participates in the consistency check.
    pub fn push_named(&mut self, name: Arc<str>, value: Term) {
        self.entries.push(Binding {
            name: Some(name),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every binding past `len`. Used to roll back a failed sub-match.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// True when every repeated name is bound to equal values.
    pub fn is_consistent(&self) -> bool {
        let mut seen: FxHashMap<&str, &Term> = FxHashMap::default();
        for binding in &self.entries {
            let Some(name) = binding.name.as_deref() else {
                continue;
            };
            match seen.get(name) {
                Some(prev) if **prev != binding.value => return false,
                Some(_) => {}
                None => {
                    seen.insert(name, &binding.value);
                }
            }
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.entries.iter()
    }

    /// The bound values in order, discarding names.
    pub fn into_values(self) -> Vec<Term> {
        self.entries.into_iter().map(|b| b.value).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_name_must_agree() {
        let mut b = Bindings::new();
        b.push_named("x".into(), Term::from(1));
        b.push(Term::from(2));
        b.push_named("x".into(), Term::from(1));
        assert!(b.is_consistent());

        b.push_named("x".into(), Term::from(3));
        assert!(!b.is_consistent());
    }

    #[test]
    fn test_positional_entries_never_conflict() {
        let mut b = Bindings::new();
        b.push(Term::from(1));
        b.push(Term::from(2));
        assert!(b.is_consistent());
        assert_eq!(b.into_values(), vec![Term::from(1), Term::from(2)]);
    }

    #[test]
    fn test_truncate_rolls_back() {
        let mut b = Bindings::new();
        b.push(Term::from(1));
        let mark = b.len();
        b.push_named("y".into(), Term::from(2));
        b.truncate(mark);
        assert_eq!(b.into_values(), vec![Term::from(1)]);
    }
}
