//! `for` comprehensions over lists and binaries.
//!
//! A generator pairs a pattern with a source. List generators match the
//! pattern against each element; binary generators cut the source into
//! consecutive chunks of the pattern's fixed width. Elements that do not
//! match are skipped. With several generators the comprehension walks their
//! cartesian product, first generator outermost, and the body receives the
//! bindings of every generator concatenated in order.

use crate::bitstring::{BinaryPattern, BitString};
use crate::dispatch::Guard;
use crate::error::{Result, RuntimeError};
use crate::pattern::{build_match, Matcher, Pattern};
use crate::term::Term;

/// One `pattern <- source` clause of a comprehension.
#[derive(Debug, Clone)]
pub struct Generator {
    matcher: Matcher,
    items: Vec<Term>,
}

impl Generator {
    /// Binding sets for every element the pattern accepts.
    fn bindings(&self) -> Vec<Vec<Term>> {
        self.items
            .iter()
            .filter_map(|item| self.matcher.run(item).map(|b| b.into_values()))
            .collect()
    }
}

/// Generate from the elements of a list.
pub fn list_generator(pattern: &Pattern, source: &Term) -> Result<Generator> {
    let items = source.as_list().ok_or_else(|| RuntimeError::BadMatch {
        value: source.clone(),
    })?;
    Ok(Generator {
        matcher: build_match(pattern),
        items: items.to_vec(),
    })
}

/// Generate from fixed-width chunks of a binary. A trailing chunk shorter
/// than the pattern is ignored.
pub fn bitstring_generator(pattern: &BinaryPattern, source: &BitString) -> Result<Generator> {
    let width = match pattern.fixed_width() {
        Some(width) if width > 0 => width,
        _ => {
            return Err(RuntimeError::BadMatch {
                value: Term::BitString(source.clone()),
            })
        }
    };
    let items = source
        .as_bytes()
        .chunks_exact(width)
        .map(|chunk| Term::BitString(BitString::from(chunk)))
        .collect();
    Ok(Generator {
        matcher: build_match(&Pattern::BitStringMatch(pattern.clone())),
        items,
    })
}

fn product(generators: &[Generator]) -> Vec<Vec<Term>> {
    let mut rows: Vec<Vec<Term>> = vec![Vec::new()];
    for generator in generators {
        let sets = generator.bindings();
        rows = rows
            .iter()
            .flat_map(|prefix| {
                sets.iter().map(move |set| {
                    let mut row = prefix.clone();
                    row.extend(set.iter().cloned());
                    row
                })
            })
            .collect();
    }
    rows
}

fn collect<F>(generators: &[Generator], filter: Option<&Guard>, body: F) -> Result<Vec<Term>>
where
    F: Fn(Vec<Term>) -> Result<Term>,
{
    product(generators)
        .into_iter()
        .filter(|row| filter.map_or(true, |f| f(row.as_slice())))
        .map(body)
        .collect()
}

/// Evaluate a comprehension into a list.
pub fn list_comprehension<F>(
    generators: &[Generator],
    filter: Option<Guard>,
    body: F,
) -> Result<Term>
where
    F: Fn(Vec<Term>) -> Result<Term>,
{
    collect(generators, filter.as_ref(), body).map(Term::List)
}

/// Evaluate a comprehension into a binary. Each body result must be a
/// bitstring or a string and the results are concatenated.
pub fn bitstring_comprehension<F>(
    generators: &[Generator],
    filter: Option<Guard>,
    body: F,
) -> Result<Term>
where
    F: Fn(Vec<Term>) -> Result<Term>,
{
    let mut bytes = Vec::new();
    for value in collect(generators, filter.as_ref(), body)? {
        match value {
            Term::BitString(bits) => bytes.extend_from_slice(bits.as_bytes()),
            Term::Str(s) => bytes.extend_from_slice(s.as_bytes()),
            other => return Err(RuntimeError::BadMatch { value: other }),
        }
    }
    Ok(Term::BitString(BitString::from(bytes)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bitstring::integer;
    use crate::pattern::{literal, tuple, variable};

    fn ints(ns: &[i64]) -> Term {
        Term::list(ns.iter().map(|n| Term::from(*n)))
    }

    #[test]
    fn test_list_comprehension_maps() {
        let gen = list_generator(&variable(), &ints(&[1, 2, 3])).unwrap();
        let out = list_comprehension(&[gen], None, |b| {
            Ok(Term::from(b[0].as_int().unwrap_or(0) * 2))
        })
        .unwrap();
        assert_eq!(out, ints(&[2, 4, 6]));
    }

    #[test]
    fn test_non_matching_elements_skipped() {
        let source = Term::list([
            Term::tuple([Term::atom("ok"), Term::from(1)]),
            Term::atom("error"),
            Term::tuple([Term::atom("ok"), Term::from(2)]),
        ]);
        let gen = list_generator(&tuple([literal(Term::atom("ok")), variable()]), &source).unwrap();
        let out = list_comprehension(&[gen], None, |b| Ok(b[0].clone())).unwrap();
        assert_eq!(out, ints(&[1, 2]));
    }

    #[test]
    fn test_cartesian_product_with_filter() {
        let xs = list_generator(&variable(), &ints(&[1, 2])).unwrap();
        let ys = list_generator(&variable(), &ints(&[10, 20])).unwrap();
        let filter: Guard = Arc::new(|b: &[Term]| b[1] != Term::from(20) || b[0] == Term::from(1));
        let out = list_comprehension(&[xs, ys], Some(filter), |b| {
            Ok(Term::tuple([b[0].clone(), b[1].clone()]))
        })
        .unwrap();
        assert_eq!(
            out,
            Term::list([
                Term::tuple([Term::from(1), Term::from(10)]),
                Term::tuple([Term::from(1), Term::from(20)]),
                Term::tuple([Term::from(2), Term::from(10)]),
            ])
        );
    }

    #[test]
    fn test_bitstring_generator_chunks_pixels() {
        let pattern =
            BinaryPattern::new(vec![integer(variable()), integer(variable()), integer(variable())])
                .unwrap();
        let pixels = BitString::from_bytes(vec![1, 2, 3, 4, 5, 6, 7]);
        let gen = bitstring_generator(&pattern, &pixels).unwrap();
        let out = list_comprehension(&[gen], None, |b| Ok(b[1].clone())).unwrap();
        assert_eq!(out, ints(&[2, 5]));
    }

    #[test]
    fn test_bitstring_comprehension_concatenates() {
        let gen = list_generator(&variable(), &ints(&[65, 66])).unwrap();
        let out = bitstring_comprehension(&[gen], None, |b| {
            let byte = b[0].as_int().unwrap_or(0) as u8;
            Ok(Term::BitString(BitString::from_bytes(vec![byte])))
        })
        .unwrap();
        assert_eq!(out, Term::BitString(BitString::from_bytes(b"AB".to_vec())));
    }

    #[test]
    fn test_list_generator_requires_list() {
        assert!(list_generator(&variable(), &Term::from(1)).is_err());
    }
}
