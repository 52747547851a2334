#![forbid(unsafe_code)]

//! In-process Z3. Each query gets its own context on a blocking thread.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use num::BigInt;
use z3::ast::{Ast, Bool, Int};
use z3::{Config, Context, Params, SatResult, Solver};

use super::{BackendError, Query, SolverBackend, SolverVerdict};
use crate::formula::{ArithOp, Assignment, CmpOp, Sort, Term, Value};

pub struct Z3Backend;

#[async_trait]
impl SolverBackend for Z3Backend {
    fn name(&self) -> &'static str {
        "z3"
    }

    async fn check(&self, query: &Query, timeout: Duration) -> Result<SolverVerdict, BackendError> {
        let query = query.clone();
        tokio::task::spawn_blocking(move || solve(&query, timeout))
            .await
            .map_err(|e| BackendError::Protocol(format!("z3 worker did not finish: {e}")))?
    }
}

enum Z3Term<'ctx> {
    Bool(Bool<'ctx>),
    Int(Int<'ctx>),
}

struct Translator<'ctx> {
    ctx: &'ctx Context,
    vars: HashMap<String, Z3Term<'ctx>>,
}

impl<'ctx> Translator<'ctx> {
    fn var(&mut self, name: &str, sort: Sort) -> Z3Term<'ctx> {
        let ctx = self.ctx;
        let entry = self.vars.entry(name.to_string()).or_insert_with(|| match sort {
            Sort::Bool => Z3Term::Bool(Bool::new_const(ctx, name)),
            Sort::Int => Z3Term::Int(Int::new_const(ctx, name)),
        });
        match entry {
            Z3Term::Bool(b) => Z3Term::Bool(b.clone()),
            Z3Term::Int(i) => Z3Term::Int(i.clone()),
        }
    }

    fn boolean(&mut self, t: &Term) -> Result<Bool<'ctx>, BackendError> {
        match self.term(t)? {
            Z3Term::Bool(b) => Ok(b),
            Z3Term::Int(_) => Err(BackendError::Protocol(format!("expected a boolean term: {t}"))),
        }
    }

    fn int(&mut self, t: &Term) -> Result<Int<'ctx>, BackendError> {
        match self.term(t)? {
            Z3Term::Int(i) => Ok(i),
            Z3Term::Bool(_) => Err(BackendError::Protocol(format!("expected an integer term: {t}"))),
        }
    }

    fn term(&mut self, t: &Term) -> Result<Z3Term<'ctx>, BackendError> {
        let ctx = self.ctx;
        Ok(match t {
            Term::Bool(b) => Z3Term::Bool(Bool::from_bool(ctx, *b)),
            Term::Int(i) => Z3Term::Int(
                Int::from_str(ctx, &i.to_string())
                    .ok_or_else(|| BackendError::Protocol(format!("integer literal {i}")))?,
            ),
            Term::Var(name, sort) => self.var(name, *sort),
            Term::Not(a) => Z3Term::Bool(self.boolean(a)?.not()),
            Term::And(ts) | Term::Or(ts) => {
                let parts = ts.iter().map(|t| self.boolean(t)).collect::<Result<Vec<_>, _>>()?;
                let refs = parts.iter().collect::<Vec<_>>();
                Z3Term::Bool(if matches!(t, Term::And(_)) {
                    Bool::and(ctx, &refs)
                } else {
                    Bool::or(ctx, &refs)
                })
            }
            Term::Implies(a, b) => Z3Term::Bool(self.boolean(a)?.implies(&self.boolean(b)?)),
            Term::Ite(c, a, b) => {
                let c = self.boolean(c)?;
                match (self.term(a)?, self.term(b)?) {
                    (Z3Term::Bool(a), Z3Term::Bool(b)) => Z3Term::Bool(c.ite(&a, &b)),
                    (Z3Term::Int(a), Z3Term::Int(b)) => Z3Term::Int(c.ite(&a, &b)),
                    _ => return Err(BackendError::Protocol(format!("ill-sorted ite: {t}"))),
                }
            }
            Term::Eq(a, b) => match (self.term(a)?, self.term(b)?) {
                (Z3Term::Bool(a), Z3Term::Bool(b)) => Z3Term::Bool(a._eq(&b)),
                (Z3Term::Int(a), Z3Term::Int(b)) => Z3Term::Bool(a._eq(&b)),
                _ => return Err(BackendError::Protocol(format!("ill-sorted equality: {t}"))),
            },
            Term::Cmp(op, a, b) => {
                let (a, b) = (self.int(a)?, self.int(b)?);
                Z3Term::Bool(match op {
                    CmpOp::Lt => a.lt(&b),
                    CmpOp::Le => a.le(&b),
                    CmpOp::Gt => a.gt(&b),
                    CmpOp::Ge => a.ge(&b),
                })
            }
            Term::Arith(op, a, b) => {
                let (a, b) = (self.int(a)?, self.int(b)?);
                Z3Term::Int(match op {
                    ArithOp::Add => Int::add(ctx, &[&a, &b]),
                    ArithOp::Sub => Int::sub(ctx, &[&a, &b]),
                    ArithOp::Mul => Int::mul(ctx, &[&a, &b]),
                    // Division by zero is zero, as in the SMT-LIB rendering.
                    ArithOp::Div | ArithOp::Mod => {
                        let zero = Int::from_i64(ctx, 0);
                        let q = if *op == ArithOp::Div { a.div(&b) } else { a.modulo(&b) };
                        b._eq(&zero).ite(&zero, &q)
                    }
                })
            }
            Term::Neg(a) => Z3Term::Int(self.int(a)?.unary_minus()),
        })
    }
}

/// Z3 prints negative numerals as `(- n)`.
fn read_int(text: &str) -> Option<BigInt> {
    let t = text.trim();
    match t.strip_prefix("(-").and_then(|r| r.strip_suffix(')')) {
        Some(inner) => inner.trim().parse::<BigInt>().ok().map(|v| -v),
        None => t.parse().ok(),
    }
}

fn solve(query: &Query, timeout: Duration) -> Result<SolverVerdict, BackendError> {
    let mut cfg = Config::new();
    cfg.set_model_generation(true);
    let ctx = Context::new(&cfg);

    let solver = Solver::new(&ctx);
    let mut params = Params::new(&ctx);
    params.set_u32("timeout", u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    params.set_u32("smt.random_seed", 0);
    params.set_u32("sat.random_seed", 0);
    solver.set_params(&params);

    let mut tr = Translator {
        ctx: &ctx,
        vars: HashMap::new(),
    };
    for a in &query.assertions {
        let b = tr.boolean(a)?;
        solver.assert(&b);
    }

    match solver.check() {
        SatResult::Unsat => Ok(SolverVerdict::Unsat),
        SatResult::Unknown => Ok(SolverVerdict::Unknown(
            solver.get_reason_unknown().unwrap_or_else(|| "unknown".to_string()),
        )),
        SatResult::Sat => {
            let model = solver
                .get_model()
                .ok_or_else(|| BackendError::Protocol("sat without a model".to_string()))?;
            let mut out = Assignment::new();
            for (name, v) in &tr.vars {
                let value = match v {
                    Z3Term::Bool(b) => model
                        .eval(b, true)
                        .and_then(|b| b.as_bool())
                        .map(Value::Bool),
                    Z3Term::Int(i) => model
                        .eval(i, true)
                        .and_then(|i| read_int(&i.to_string()))
                        .map(Value::Int),
                };
                if let Some(value) = value {
                    out.insert(name.clone(), value);
                }
            }
            Ok(SolverVerdict::Sat(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_negative_numerals() {
        assert_eq!(read_int("(- 12)"), Some(BigInt::from(-12)));
        assert_eq!(read_int("340282366920938463463374607431768211455"), Some(BigInt::from(u128::MAX)));
    }

    #[test]
    fn finds_a_model() {
        let x = Term::var("x", Sort::Int);
        let q = Query::new(vec![
            Term::cmp(CmpOp::Gt, x.clone(), Term::int(10)),
            Term::eq(Term::arith(ArithOp::Mod, x, Term::int(5)), Term::int(3)),
        ]);
        let SolverVerdict::Sat(m) = solve(&q, Duration::from_secs(5)).unwrap() else {
            panic!("expected sat");
        };
        let Value::Int(v) = &m["x"] else { panic!("int") };
        assert!(*v > BigInt::from(10));
        assert_eq!(v % 5, BigInt::from(3));
    }
}
