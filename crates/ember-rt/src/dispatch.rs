//! Multi-clause functions and single-pattern matching.
//!
//! [`defmatch`] turns an ordered list of [`Clause`]s into a callable
//! [`Function`]. Clauses are bucketed by every arity they accept: a clause
//! with `n` parameters of which `k` are optional serves calls with `n - k`
//! through `n` arguments. A call only ever tries the clauses in its own
//! bucket, in declaration order, and the first clause whose patterns match
//! and whose guard holds runs.
//!
//! Omitted optional arguments are filled from the right: a call that is `g`
//! arguments short receives the defaults of the clause's last `g` optional
//! parameters, inserted at those parameters' positions.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Result, RuntimeError};
use crate::pattern::{build_match, build_sequence, Pattern, SequenceMatcher};
use crate::term::Term;

/// A clause body, called with the clause's bindings in pattern order.
pub type Body = Arc<dyn Fn(Vec<Term>) -> Result<Term> + Send + Sync>;

/// A clause guard, evaluated after a successful match.
pub type Guard = Arc<dyn Fn(&[Term]) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// Clause
// ---------------------------------------------------------------------------

/// One `(patterns, guard, body)` alternative of a function or receive.
#[derive(Clone)]
pub struct Clause {
    params: SequenceMatcher,
    /// `(position, default)` for every top-level parameter with a default.
    optionals: Vec<(usize, Term)>,
    guard: Option<Guard>,
    body: Body,
}

/// Build a clause from its parameter patterns and body.
pub fn clause<F>(patterns: Vec<Pattern>, body: F) -> Clause
where
    F: Fn(Vec<Term>) -> Result<Term> + Send + Sync + 'static,
{
    let optionals = patterns
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.default_value().map(|d| (i, d.clone())))
        .collect();
    Clause {
        params: build_sequence(&patterns),
        optionals,
        guard: None,
        body: Arc::new(body),
    }
}

impl Clause {
    /// Attach a guard. The guard sees the same bindings as the body.
    pub fn when<G>(mut self, guard: G) -> Self
    where
        G: Fn(&[Term]) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Smallest argument count this clause accepts.
    pub fn min_arity(&self) -> usize {
        self.arity() - self.optionals.len()
    }

    /// Match `args` (already padded to full arity) and evaluate the guard.
    /// Returns the bindings if this clause applies.
    pub fn select(&self, args: &[Term]) -> Option<Vec<Term>> {
        let bound = self.params.run(args)?.into_values();
        match &self.guard {
            Some(guard) if !guard(bound.as_slice()) => None,
            _ => Some(bound),
        }
    }

    /// Run the body on bindings produced by [`Clause::select`].
    pub fn invoke(&self, bound: Vec<Term>) -> Result<Term> {
        (self.body)(bound)
    }

    /// Pad a short argument list with this clause's trailing defaults.
    fn fill_defaults<'a>(&self, args: &'a [Term]) -> Cow<'a, [Term]> {
        let gap = self.arity().saturating_sub(args.len());
        if gap == 0 || gap > self.optionals.len() {
            return Cow::Borrowed(args);
        }
        let mut filled = args.to_vec();
        for (index, default) in &self.optionals[self.optionals.len() - gap..] {
            filled.insert(*index, default.clone());
        }
        Cow::Owned(filled)
    }
}

impl fmt::Debug for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clause")
            .field("arity", &self.arity())
            .field("optionals", &self.optionals.len())
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

/// A multi-clause function. Cheap to clone.
#[derive(Clone)]
pub struct Function {
    clauses: Arc<[Clause]>,
    /// arity -> clause indices in declaration order
    buckets: Arc<FxHashMap<usize, Vec<usize>>>,
}

/// Build a multi-clause function from clauses in priority order.
pub fn defmatch(clauses: Vec<Clause>) -> Function {
    let mut buckets: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for (index, clause) in clauses.iter().enumerate() {
        for arity in clause.min_arity()..=clause.arity() {
            buckets.entry(arity).or_default().push(index);
        }
    }
    tracing::trace!(clauses = clauses.len(), arities = buckets.len(), "built function");
    Function {
        clauses: clauses.into(),
        buckets: Arc::new(buckets),
    }
}

impl Function {
    /// Call the function: run the first applicable clause.
    pub fn call(&self, args: &[Term]) -> Result<Term> {
        let (index, bound) = self.resolve(args)?;
        self.clauses[index].invoke(bound)
    }

    /// Find the clause a call would run, and its bindings, without running
    /// it.
    pub fn resolve(&self, args: &[Term]) -> Result<(usize, Vec<Term>)> {
        let bucket = self
            .buckets
            .get(&args.len())
            .ok_or(RuntimeError::Arity { arity: args.len() })?;

        for &index in bucket {
            let clause = &self.clauses[index];
            let filled = clause.fill_defaults(args);
            if let Some(bound) = clause.select(&filled) {
                return Ok((index, bound));
            }
        }
        Err(RuntimeError::FunctionClause {
            args: args.to_vec(),
        })
    }

    /// Every argument count the function accepts, ascending.
    pub fn arities(&self) -> Vec<usize> {
        let mut arities: Vec<usize> = self.buckets.keys().copied().collect();
        arities.sort_unstable();
        arities
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("clauses", &self.clauses.len())
            .field("arities", &self.arities())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Single-pattern matching
// ---------------------------------------------------------------------------

/// Match one value against one pattern, returning the bindings or a
/// `BadMatch` error.
pub fn match_pattern(pattern: &Pattern, value: &Term) -> Result<Vec<Term>> {
    build_match(pattern)
        .run(value)
        .map(|b| b.into_values())
        .ok_or_else(|| RuntimeError::BadMatch {
            value: value.clone(),
        })
}

/// Like [`match_pattern`], but the guard must also accept the bindings.
pub fn match_guarded<G>(pattern: &Pattern, value: &Term, guard: G) -> Result<Vec<Term>>
where
    G: Fn(&[Term]) -> bool,
{
    match match_pattern(pattern, value) {
        Ok(bound) if guard(bound.as_slice()) => Ok(bound),
        Ok(_) => Err(RuntimeError::BadMatch {
            value: value.clone(),
        }),
        Err(err) => Err(err),
    }
}

/// Non-raising variant of [`match_pattern`]: `None` on mismatch.
pub fn match_or_default(pattern: &Pattern, value: &Term) -> Option<Vec<Term>> {
    build_match(pattern).run(value).map(|b| b.into_values())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
