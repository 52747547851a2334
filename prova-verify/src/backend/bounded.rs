#![forbid(unsafe_code)]

//! Exhaustive search over the finite box carved out by the query's own range facts.
//!
//! Top-level conjuncts of the form `x <op> c` bound `x`; every other conjunct is evaluated on
//! each point of the box. Queries whose search variables are unbounded, or whose box exceeds
//! the budget, are reported as `Unknown`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use num::{BigInt, One, ToPrimitive};
use tracing::debug;

use super::{BackendError, Query, SolverBackend, SolverVerdict};
use crate::formula::{Assignment, CmpOp, Sort, Term, Value};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Interval {
    lo: Option<BigInt>,
    hi: Option<BigInt>,
}

impl Interval {
    fn raise_lo(&mut self, v: BigInt) {
        if self.lo.as_ref().is_none_or(|lo| v > *lo) {
            self.lo = Some(v);
        }
    }

    fn lower_hi(&mut self, v: BigInt) {
        if self.hi.as_ref().is_none_or(|hi| v < *hi) {
            self.hi = Some(v);
        }
    }

    fn is_empty(&self) -> bool {
        matches!((&self.lo, &self.hi), (Some(lo), Some(hi)) if lo > hi)
    }

    /// Number of points, if finite.
    fn size(&self) -> Option<BigInt> {
        match (&self.lo, &self.hi) {
            (Some(lo), Some(hi)) if lo > hi => Some(BigInt::from(0)),
            (Some(lo), Some(hi)) => Some(hi - lo + 1),
            _ => None,
        }
    }

    /// Any member, preferring small magnitudes.
    fn witness(&self) -> BigInt {
        match (&self.lo, &self.hi) {
            (Some(lo), _) => lo.clone(),
            (None, Some(hi)) if *hi < BigInt::from(0) => hi.clone(),
            _ => BigInt::from(0),
        }
    }
}

/// `x op c` with the variable on the left, flipping if needed.
fn as_bound(t: &Term) -> Option<(&str, CmpOp, &BigInt, bool)> {
    let (op, a, b, negated) = match t {
        Term::Cmp(op, a, b) => (Some(*op), a.as_ref(), b.as_ref(), false),
        Term::Eq(a, b) => (None, a.as_ref(), b.as_ref(), false),
        Term::Not(inner) => match inner.as_ref() {
            Term::Cmp(op, a, b) => (Some(*op), a.as_ref(), b.as_ref(), true),
            _ => return None,
        },
        _ => return None,
    };
    let (name, c, op) = match (a, b) {
        (Term::Var(n, Sort::Int), Term::Int(c)) => (n.as_str(), c, op),
        (Term::Int(c), Term::Var(n, Sort::Int)) => (n.as_str(), c, op.map(flip)),
        _ => return None,
    };
    match op {
        Some(op) if negated => Some((name, negate(op), c, false)),
        Some(op) => Some((name, op, c, false)),
        None => Some((name, CmpOp::Le, c, true)),
    }
}

fn flip(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Le => CmpOp::Ge,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Ge => CmpOp::Le,
    }
}

fn negate(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Ge,
        CmpOp::Le => CmpOp::Gt,
        CmpOp::Gt => CmpOp::Le,
        CmpOp::Ge => CmpOp::Lt,
    }
}

#[derive(Clone, Debug)]
pub struct BoundedBackend {
    max_assignments: u64,
}

impl BoundedBackend {
    pub fn new(max_assignments: u64) -> Self {
        Self { max_assignments }
    }
}

#[async_trait]
impl SolverBackend for BoundedBackend {
    fn name(&self) -> &'static str {
        "bounded"
    }

    async fn check(&self, query: &Query, timeout: Duration) -> Result<SolverVerdict, BackendError> {
        let query = query.clone();
        let budget = self.max_assignments;
        let deadline = Instant::now() + timeout;
        tokio::task::spawn_blocking(move || search(&query, budget, deadline))
            .await
            .map_err(|e| BackendError::Protocol(format!("bounded search did not finish: {e}")))
    }
}

fn search(query: &Query, budget: u64, deadline: Instant) -> SolverVerdict {
    let vars = query.vars();
    let mut intervals: BTreeMap<&str, Interval> = BTreeMap::new();
    let mut residual: Vec<&Term> = Vec::new();

    for conjunct in query.assertions.iter().flat_map(|a| a.conjuncts()) {
        if conjunct.is_false() {
            return SolverVerdict::Unsat;
        }
        let Some((name, op, c, is_eq)) = as_bound(conjunct) else {
            residual.push(conjunct);
            continue;
        };
        let iv = intervals.entry(name).or_default();
        if is_eq {
            iv.raise_lo(c.clone());
            iv.lower_hi(c.clone());
            continue;
        }
        match op {
            CmpOp::Lt => iv.lower_hi(c - 1),
            CmpOp::Le => iv.lower_hi(c.clone()),
            CmpOp::Gt => iv.raise_lo(c + 1),
            CmpOp::Ge => iv.raise_lo(c.clone()),
        }
    }
    if intervals.values().any(Interval::is_empty) {
        return SolverVerdict::Unsat;
    }

    let mut searched: BTreeMap<String, Sort> = BTreeMap::new();
    for t in &residual {
        t.collect_vars(&mut searched);
    }

    // Variables constrained only by their bounds take any member.
    let mut base = Assignment::new();
    for (name, sort) in &vars {
        if searched.contains_key(name) {
            continue;
        }
        let value = match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(intervals.get(name.as_str()).map(Interval::witness).unwrap_or_default()),
        };
        base.insert(name.clone(), value);
    }

    let mut domains: Vec<(String, Vec<Value>)> = Vec::new();
    let mut total = BigInt::one();
    for (name, sort) in &searched {
        let size = match sort {
            Sort::Bool => BigInt::from(2),
            Sort::Int => match intervals.get(name.as_str()).and_then(Interval::size) {
                Some(size) => size,
                None => return SolverVerdict::Unknown(format!("`{name}` has no finite bounds")),
            },
        };
        total *= &size;
        if total > BigInt::from(budget) {
            return SolverVerdict::Unknown(format!(
                "search space exceeds {budget} assignments; narrow the inputs with `requires`"
            ));
        }
        let values = match sort {
            Sort::Bool => vec![Value::Bool(false), Value::Bool(true)],
            Sort::Int => {
                let iv = &intervals[name.as_str()];
                let lo = iv.lo.clone().unwrap_or_default();
                let n = size.to_u64().unwrap_or(0);
                (0..n).map(|k| Value::Int(&lo + k)).collect()
            }
        };
        domains.push((name.clone(), values));
    }
    debug!(vars = vars.len(), searched = domains.len(), space = %total, "bounded search");

    let mut env = base;
    let mut idx = vec![0usize; domains.len()];
    let mut steps: u64 = 0;
    loop {
        for ((name, values), &i) in domains.iter().zip(&idx) {
            env.insert(name.clone(), values[i].clone());
        }
        if residual.iter().all(|t| t.eval(&env).as_bool()) {
            return SolverVerdict::Sat(env);
        }

        steps += 1;
        if steps % 4096 == 0 && Instant::now() >= deadline {
            return SolverVerdict::Unknown("timeout".to_string());
        }

        // Odometer increment; done when every digit wrapped.
        let mut k = 0;
        loop {
            if k == domains.len() {
                return SolverVerdict::Unsat;
            }
            idx[k] += 1;
            if idx[k] < domains[k].1.len() {
                break;
            }
            idx[k] = 0;
            k += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ArithOp;

    fn x() -> Term {
        Term::var("x", Sort::Int)
    }

    fn run(assertions: Vec<Term>) -> SolverVerdict {
        search(&Query::new(assertions), 1 << 16, Instant::now() + Duration::from_secs(5))
    }

    #[test]
    fn finds_a_witness_inside_the_box() {
        let mut a = vec![Term::cmp(CmpOp::Ge, x(), Term::int(0)), Term::cmp(CmpOp::Le, x(), Term::int(20))];
        a.push(Term::eq(Term::arith(ArithOp::Mul, x(), Term::int(2)), Term::int(14)));
        match run(a) {
            SolverVerdict::Sat(m) => assert_eq!(m["x"], Value::Int(BigInt::from(7))),
            other => panic!("expected sat, got {other:?}"),
        }
    }

    #[test]
    fn exhausting_the_box_is_unsat() {
        let mut a = vec![Term::cmp(CmpOp::Ge, x(), Term::int(0)), Term::cmp(CmpOp::Le, x(), Term::int(20))];
        a.push(Term::cmp(CmpOp::Gt, Term::arith(ArithOp::Mul, x(), Term::int(2)), Term::int(40)));
        assert_eq!(run(a), SolverVerdict::Unsat);
    }

    #[test]
    fn contradictory_bounds_are_unsat_without_search() {
        let a = vec![
            Term::cmp(CmpOp::Gt, x(), Term::int(10)),
            Term::not(Term::cmp(CmpOp::Gt, x(), Term::int(5))),
        ];
        assert_eq!(run(a), SolverVerdict::Unsat);

        let a = vec![
            Term::cmp(CmpOp::Ge, x(), Term::int(9)),
            Term::cmp(CmpOp::Le, Term::int(5), x()),
        ];
        match run(a) {
            SolverVerdict::Sat(m) => assert_eq!(m["x"], Value::Int(BigInt::from(9))),
            other => panic!("expected sat, got {other:?}"),
        }
    }

    #[test]
    fn unbounded_search_variables_are_unknown() {
        let a = vec![Term::eq(Term::arith(ArithOp::Mul, x(), Term::int(2)), Term::int(14))];
        assert!(matches!(run(a), SolverVerdict::Unknown(_)));
    }

    #[test]
    fn budget_is_respected() {
        let verdict = search(
            &Query::new(vec![
                Term::cmp(CmpOp::Ge, x(), Term::int(0)),
                Term::cmp(CmpOp::Le, x(), Term::int(1_000_000)),
                Term::eq(Term::arith(ArithOp::Mod, x(), Term::int(7)), Term::int(3)),
            ]),
            100,
            Instant::now() + Duration::from_secs(5),
        );
        assert!(matches!(verdict, SolverVerdict::Unknown(m) if m.contains("exceeds")));
    }
}
