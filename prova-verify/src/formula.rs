#![forbid(unsafe_code)]

//! Closed first-order formulas over `Int` and `Bool`, the vocabulary shared by every backend.

use std::collections::BTreeMap;
use std::fmt;

use num::{BigInt, Signed, Zero};
use serde::Serialize;

use crate::unbounded::UnboundedValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    Bool,
    Int,
}

impl Sort {
    pub fn smt_name(self) -> &'static str {
        match self {
            Sort::Bool => "Bool",
            Sort::Int => "Int",
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(BigInt::zero()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn smt(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    pub fn apply(self, a: &BigInt, b: &BigInt) -> bool {
        match self {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    /// Total on all inputs: division and remainder by zero yield zero.
    pub fn apply(self, a: &BigInt, b: &BigInt) -> BigInt {
        let (a, b) = (UnboundedValue::from(a.clone()), UnboundedValue::from(b.clone()));
        let out = match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a.checked_div(&b).unwrap_or_else(UnboundedValue::zero),
            ArithOp::Mod => a.checked_rem(&b).unwrap_or_else(UnboundedValue::zero),
        };
        out.into_bigint()
    }

    fn smt(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "div",
            ArithOp::Mod => "mod",
        }
    }
}

/// A concrete value from a model or an evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Int(BigInt),
    Bool(bool),
}

impl Value {
    pub fn as_bool(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn into_int(self) -> BigInt {
        match self {
            Value::Int(i) => i,
            Value::Bool(_) => BigInt::zero(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Solver variable name to value. Missing variables read as the sort's default.
pub type Assignment = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Bool(bool),
    Int(BigInt),
    Var(String, Sort),
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),
    Ite(Box<Term>, Box<Term>, Box<Term>),
    Eq(Box<Term>, Box<Term>),
    Cmp(CmpOp, Box<Term>, Box<Term>),
    Arith(ArithOp, Box<Term>, Box<Term>),
    Neg(Box<Term>),
}

impl Term {
    pub fn int(v: impl Into<BigInt>) -> Term {
        Term::Int(v.into())
    }

    pub fn var(name: impl Into<String>, sort: Sort) -> Term {
        Term::Var(name.into(), sort)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Term::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Term::Bool(false))
    }

    pub fn as_int_lit(&self) -> Option<&BigInt> {
        match self {
            Term::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn not(t: Term) -> Term {
        match t {
            Term::Bool(b) => Term::Bool(!b),
            Term::Not(inner) => *inner,
            other => Term::Not(Box::new(other)),
        }
    }

    pub fn and(terms: impl IntoIterator<Item = Term>) -> Term {
        let mut out = Vec::new();
        for t in terms {
            match t {
                Term::Bool(true) => {}
                Term::Bool(false) => return Term::Bool(false),
                Term::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Term::Bool(true),
            1 => out.remove(0),
            _ => Term::And(out),
        }
    }

    pub fn or(terms: impl IntoIterator<Item = Term>) -> Term {
        let mut out = Vec::new();
        for t in terms {
            match t {
                Term::Bool(false) => {}
                Term::Bool(true) => return Term::Bool(true),
                Term::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Term::Bool(false),
            1 => out.remove(0),
            _ => Term::Or(out),
        }
    }

    pub fn implies(a: Term, b: Term) -> Term {
        match (a, b) {
            (Term::Bool(true), b) => b,
            (Term::Bool(false), _) | (_, Term::Bool(true)) => Term::Bool(true),
            (a, Term::Bool(false)) => Term::not(a),
            (a, b) if a == b => Term::Bool(true),
            (a, b) => Term::Implies(Box::new(a), Box::new(b)),
        }
    }

    /// Boolean `ite`s with a literal branch become connectives.
    pub fn ite(c: Term, t: Term, e: Term) -> Term {
        match (c, t, e) {
            (Term::Bool(true), t, _) => t,
            (Term::Bool(false), _, e) => e,
            (_, t, e) if t == e => t,
            (c, Term::Bool(true), e) => Term::or([c, e]),
            (c, Term::Bool(false), e) => Term::and([Term::not(c), e]),
            (c, t, Term::Bool(false)) => Term::and([c, t]),
            (c, t, Term::Bool(true)) => Term::implies(c, t),
            (c, t, e) => Term::Ite(Box::new(c), Box::new(t), Box::new(e)),
        }
    }

    pub fn eq(a: Term, b: Term) -> Term {
        match (&a, &b) {
            (Term::Int(x), Term::Int(y)) => Term::Bool(x == y),
            (Term::Bool(x), Term::Bool(y)) => Term::Bool(x == y),
            _ if a == b => Term::Bool(true),
            _ => Term::Eq(Box::new(a), Box::new(b)),
        }
    }

    pub fn cmp(op: CmpOp, a: Term, b: Term) -> Term {
        match (&a, &b) {
            (Term::Int(x), Term::Int(y)) => Term::Bool(op.apply(x, y)),
            _ => Term::Cmp(op, Box::new(a), Box::new(b)),
        }
    }

    pub fn arith(op: ArithOp, a: Term, b: Term) -> Term {
        match (&a, &b) {
            (Term::Int(x), Term::Int(y)) => Term::Int(op.apply(x, y)),
            _ => Term::Arith(op, Box::new(a), Box::new(b)),
        }
    }

    pub fn neg(t: Term) -> Term {
        match t {
            Term::Int(i) => Term::Int((-UnboundedValue::from(i)).into_bigint()),
            Term::Neg(inner) => *inner,
            other => Term::Neg(Box::new(other)),
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            Term::Int(_) | Term::Arith(..) | Term::Neg(_) => Sort::Int,
            Term::Var(_, s) => *s,
            Term::Ite(_, t, _) => t.sort(),
            _ => Sort::Bool,
        }
    }

    /// Top-level conjuncts.
    pub fn conjuncts(&self) -> Vec<&Term> {
        match self {
            Term::And(ts) => ts.iter().flat_map(|t| t.conjuncts()).collect(),
            Term::Bool(true) => Vec::new(),
            other => vec![other],
        }
    }

    pub fn free_vars(&self) -> BTreeMap<String, Sort> {
        let mut out = BTreeMap::new();
        self.collect_vars(&mut out);
        out
    }

    pub(crate) fn collect_vars(&self, out: &mut BTreeMap<String, Sort>) {
        match self {
            Term::Bool(_) | Term::Int(_) => {}
            Term::Var(n, s) => {
                out.insert(n.clone(), *s);
            }
            Term::Not(t) | Term::Neg(t) => t.collect_vars(out),
            Term::And(ts) | Term::Or(ts) => ts.iter().for_each(|t| t.collect_vars(out)),
            Term::Implies(a, b) | Term::Eq(a, b) | Term::Cmp(_, a, b) | Term::Arith(_, a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            Term::Ite(c, t, e) => {
                c.collect_vars(out);
                t.collect_vars(out);
                e.collect_vars(out);
            }
        }
    }

    pub fn eval(&self, env: &Assignment) -> Value {
        match self {
            Term::Bool(b) => Value::Bool(*b),
            Term::Int(i) => Value::Int(i.clone()),
            Term::Var(n, s) => env.get(n).cloned().unwrap_or_else(|| s.default_value()),
            Term::Not(t) => Value::Bool(!t.eval(env).as_bool()),
            Term::And(ts) => Value::Bool(ts.iter().all(|t| t.eval(env).as_bool())),
            Term::Or(ts) => Value::Bool(ts.iter().any(|t| t.eval(env).as_bool())),
            Term::Implies(a, b) => Value::Bool(!a.eval(env).as_bool() || b.eval(env).as_bool()),
            Term::Ite(c, t, e) => {
                if c.eval(env).as_bool() {
                    t.eval(env)
                } else {
                    e.eval(env)
                }
            }
            Term::Eq(a, b) => Value::Bool(a.eval(env) == b.eval(env)),
            Term::Cmp(op, a, b) => Value::Bool(op.apply(&a.eval(env).into_int(), &b.eval(env).into_int())),
            Term::Arith(op, a, b) => Value::Int(op.apply(&a.eval(env).into_int(), &b.eval(env).into_int())),
            Term::Neg(t) => Value::Int((-UnboundedValue::from(t.eval(env).into_int())).into_bigint()),
        }
    }
}

fn write_int(f: &mut fmt::Formatter<'_>, i: &BigInt) -> fmt::Result {
    if i.is_negative() {
        write!(f, "(- {})", i.abs())
    } else {
        write!(f, "{i}")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, op: &str, ts: &[Term]) -> fmt::Result {
    write!(f, "({op}")?;
    for t in ts {
        write!(f, " {t}")?;
    }
    write!(f, ")")
}

/// SMT-LIB 2 rendering. Variables are `|quoted|` so source names like `pool.balance` survive.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(i) => write_int(f, i),
            Term::Var(n, _) => write!(f, "|{n}|"),
            Term::Not(t) => write!(f, "(not {t})"),
            Term::And(ts) if ts.is_empty() => write!(f, "true"),
            Term::And(ts) => write_list(f, "and", ts),
            Term::Or(ts) if ts.is_empty() => write!(f, "false"),
            Term::Or(ts) => write_list(f, "or", ts),
            Term::Implies(a, b) => write!(f, "(=> {a} {b})"),
            Term::Ite(c, t, e) => write!(f, "(ite {c} {t} {e})"),
            Term::Eq(a, b) => write!(f, "(= {a} {b})"),
            Term::Cmp(op, a, b) => write!(f, "({} {a} {b})", op.smt()),
            // Division by zero is defined as zero on every backend.
            Term::Arith(op @ (ArithOp::Div | ArithOp::Mod), a, b) => {
                write!(f, "(ite (= {b} 0) 0 ({} {a} {b}))", op.smt())
            }
            Term::Arith(op, a, b) => write!(f, "({} {a} {b})", op.smt()),
            Term::Neg(t) => write!(f, "(- {t})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn x() -> Term {
        Term::var("x", Sort::Int)
    }

    fn ints(pairs: &[(&str, BigInt)]) -> Assignment {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), Value::Int(v.clone())))
            .collect()
    }

    #[test]
    fn constructors_fold_literals_only() {
        assert_eq!(Term::arith(ArithOp::Add, Term::int(2), Term::int(3)), Term::int(5));
        assert_eq!(Term::cmp(CmpOp::Lt, Term::int(2), Term::int(3)), Term::Bool(true));
        assert!(matches!(Term::arith(ArithOp::Add, x(), Term::int(0)), Term::Arith(..)));
        assert_eq!(Term::arith(ArithOp::Div, Term::int(7), Term::int(0)), Term::int(0));
    }

    #[test]
    fn boolean_simplification() {
        let p = Term::cmp(CmpOp::Gt, x(), Term::int(0));
        assert_eq!(Term::and([Term::Bool(true), p.clone()]), p);
        assert_eq!(Term::and([p.clone(), Term::Bool(false)]), Term::Bool(false));
        assert_eq!(Term::and(Vec::new()), Term::Bool(true));
        assert_eq!(Term::implies(p.clone(), Term::Bool(false)), Term::not(p.clone()));
        assert_eq!(Term::not(Term::not(p.clone())), p);
        assert_eq!(Term::ite(Term::var("c", Sort::Bool), x(), x()), x());
        let c = Term::var("c", Sort::Bool);
        assert_eq!(Term::ite(c.clone(), Term::Bool(true), Term::Bool(false)), c);
        assert_eq!(Term::ite(c.clone(), p.clone(), Term::Bool(false)), Term::and([c, p]));
    }

    #[test]
    fn smtlib_rendering() {
        let t = Term::implies(
            Term::cmp(CmpOp::Le, Term::var("pool.balance", Sort::Int), Term::int(-1)),
            Term::eq(Term::arith(ArithOp::Mod, x(), Term::var("y", Sort::Int)), Term::int(0)),
        );
        assert_eq!(
            t.to_string(),
            "(=> (<= |pool.balance| (- 1)) (= (ite (= |y| 0) 0 (mod |x| |y|)) 0))"
        );
    }

    #[test]
    fn evaluation_uses_defaults_for_missing_vars() {
        let mut env = Assignment::new();
        env.insert("x".into(), Value::Int(BigInt::from(6)));
        let t = Term::and([
            Term::cmp(CmpOp::Gt, x(), Term::var("y", Sort::Int)),
            Term::eq(Term::arith(ArithOp::Div, x(), Term::var("y", Sort::Int)), Term::int(0)),
        ]);
        assert_eq!(t.eval(&env), Value::Bool(true));
        assert_eq!(t.free_vars().len(), 2);
    }

    proptest! {
        #[test]
        fn evaluation_follows_ring_laws(a in any::<i64>(), b in any::<i64>(), c in any::<i64>()) {
            let env = ints(&[("a", BigInt::from(a)), ("b", BigInt::from(b)), ("c", BigInt::from(c))]);
            let (va, vb, vc) = (Term::var("a", Sort::Int), Term::var("b", Sort::Int), Term::var("c", Sort::Int));
            let sum = |l: &Term, r: &Term| Term::arith(ArithOp::Add, l.clone(), r.clone());
            let prod = |l: &Term, r: &Term| Term::arith(ArithOp::Mul, l.clone(), r.clone());

            prop_assert_eq!(sum(&va, &vb).eval(&env), sum(&vb, &va).eval(&env));
            prop_assert_eq!(prod(&va, &vb).eval(&env), prod(&vb, &va).eval(&env));
            prop_assert_eq!(sum(&sum(&va, &vb), &vc).eval(&env), sum(&va, &sum(&vb, &vc)).eval(&env));
            prop_assert_eq!(
                prod(&va, &sum(&vb, &vc)).eval(&env),
                sum(&prod(&va, &vb), &prod(&va, &vc)).eval(&env)
            );
            prop_assert_eq!(
                Term::arith(ArithOp::Sub, va.clone(), va.clone()).eval(&env),
                Value::Int(BigInt::zero())
            );
            let negated = Term::Neg(Box::new(Term::Neg(Box::new(va.clone()))));
            prop_assert_eq!(negated.eval(&env), Value::Int(BigInt::from(a)));
        }

        #[test]
        fn evaluation_agrees_with_fixed_width_without_overflow(a in any::<u64>(), b in any::<u64>()) {
            let env = ints(&[("a", BigInt::from(a)), ("b", BigInt::from(b))]);
            let (va, vb) = (Term::var("a", Sort::Int), Term::var("b", Sort::Int));
            let cases = [
                (ArithOp::Add, a.checked_add(b)),
                (ArithOp::Sub, a.checked_sub(b)),
                (ArithOp::Mul, a.checked_mul(b)),
                (ArithOp::Div, a.checked_div(b)),
                (ArithOp::Mod, a.checked_rem(b)),
            ];
            for (op, fixed) in cases {
                if let Some(v) = fixed {
                    prop_assert_eq!(
                        Term::arith(op, va.clone(), vb.clone()).eval(&env),
                        Value::Int(BigInt::from(v))
                    );
                }
            }
        }
    }
}
