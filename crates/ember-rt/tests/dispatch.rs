use std::sync::OnceLock;

use ember_rt::pattern::{head_tail, list, literal, named, optional, starts_with, variable, wildcard};
use ember_rt::{build_match, clause, defmatch, match_or_default, Function, RuntimeError, Term};
use proptest::prelude::*;

fn factorial() -> &'static Function {
    static FACT: OnceLock<Function> = OnceLock::new();
    FACT.get_or_init(|| {
        defmatch(vec![
            clause(vec![literal(Term::from(0))], |_| Ok(Term::from(1))),
            clause(vec![variable()], |bound| {
                let n = bound[0].as_int().unwrap_or(0);
                let rest = factorial().call(&[Term::from(n - 1)])?;
                Ok(Term::from(n * rest.as_int().unwrap_or(0)))
            }),
        ])
    })
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_recursive_factorial() {
    assert_eq!(factorial().call(&[Term::from(5)]).unwrap(), Term::from(120));
    assert_eq!(factorial().call(&[Term::from(0)]).unwrap(), Term::from(1));
}

#[test]
fn test_bearer_token_prefix() {
    let bearer = starts_with("Bearer ");
    assert_eq!(
        match_or_default(&bearer, &Term::from("Bearer abc123")),
        Some(vec![Term::from("abc123")])
    );
    assert_eq!(match_or_default(&bearer, &Term::from("Basic abc")), None);
}

#[test]
fn test_trailing_optional_buckets() {
    let f = defmatch(vec![clause(
        vec![named("a"), named("b"), optional("c", 99)],
        |bound| Ok(Term::list(bound)),
    )]);
    assert_eq!(f.arities(), vec![2, 3]);
    assert_eq!(
        f.call(&[Term::from(1), Term::from(2)]).unwrap(),
        Term::list([Term::from(1), Term::from(2), Term::from(99)])
    );
    assert_eq!(f.call(&[Term::from(1)]), Err(RuntimeError::Arity { arity: 1 }));
    assert_eq!(f.call(&[]), Err(RuntimeError::Arity { arity: 0 }));
}

#[test]
fn test_function_clause_error_message() {
    let f = defmatch(vec![clause(vec![literal(Term::atom("ok"))], |_| Ok(Term::Nil))]);
    let err = f.call(&[Term::atom("error")]).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"no function clause matching arguments (:error)");
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_literal_matches_iff_equal(a in any::<i64>(), b in any::<i64>()) {
        let matched = build_match(&literal(Term::from(a))).run(&Term::from(b)).is_some();
        prop_assert_eq!(matched, a == b);
    }

    #[test]
    fn prop_integer_literal_never_matches_float(a in -1000i64..1000) {
        let matched = build_match(&literal(Term::from(a))).run(&Term::from(a as f64));
        prop_assert!(matched.is_none());
    }

    #[test]
    fn prop_head_tail_splits(items in proptest::collection::vec(any::<i64>(), 0..8)) {
        let pattern = head_tail(variable(), variable());
        let value = Term::list(items.iter().map(|n| Term::from(*n)));
        let bound = match_or_default(&pattern, &value);
        match items.split_first() {
            None => prop_assert_eq!(bound, None),
            Some((head, rest)) => prop_assert_eq!(
                bound,
                Some(vec![Term::from(*head), Term::list(rest.iter().map(|n| Term::from(*n)))])
            ),
        }
    }

    #[test]
    fn prop_repeated_name_must_agree(a in 0i64..4, b in 0i64..4) {
        let pattern = list([named("x"), named("x")]);
        let value = Term::list([Term::from(a), Term::from(b)]);
        prop_assert_eq!(match_or_default(&pattern, &value).is_some(), a == b);
    }

    #[test]
    fn prop_first_matching_clause_wins(n in -50i64..50) {
        let f = defmatch(vec![
            clause(vec![variable()], |_| Ok(Term::from(0)))
                .when(|b| b[0].as_int().is_some_and(|n| n > 10)),
            clause(vec![variable()], |_| Ok(Term::from(1)))
                .when(|b| b[0].as_int().is_some_and(|n| n > 0)),
            clause(vec![wildcard()], |_| Ok(Term::from(2))),
        ]);
        let expected = if n > 10 { 0 } else if n > 0 { 1 } else { 2 };
        prop_assert_eq!(f.call(&[Term::from(n)]).unwrap(), Term::from(expected));
    }
}
