#![forbid(unsafe_code)]

//! Solver backends. Each answers one satisfiability query: a conjunction of assertions over
//! integer and boolean variables.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula::{Assignment, Sort, Term};

mod bounded;
mod smtlib;
#[cfg(feature = "z3")]
mod z3_backend;

pub use bounded::BoundedBackend;
pub use smtlib::SmtLibBackend;
#[cfg(feature = "z3")]
pub use z3_backend::Z3Backend;

/// A conjunction of assertions.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub assertions: Vec<Term>,
}

impl Query {
    pub fn new(assertions: Vec<Term>) -> Self {
        Self { assertions }
    }

    pub fn vars(&self) -> BTreeMap<String, Sort> {
        let mut out = BTreeMap::new();
        for a in &self.assertions {
            a.collect_vars(&mut out);
        }
        out
    }

    /// An SMT-LIB 2 script that checks the query and prints a model on `sat`.
    pub fn to_smtlib(&self) -> String {
        let vars = self.vars();
        let mut s = String::new();
        s.push_str("(set-option :produce-models true)\n(set-logic ALL)\n");
        for (name, sort) in &vars {
            let _ = writeln!(s, "(declare-const |{name}| {})", sort.smt_name());
        }
        for a in &self.assertions {
            let _ = writeln!(s, "(assert {a})");
        }
        s.push_str("(check-sat)\n");
        if !vars.is_empty() {
            s.push_str("(get-value (");
            for (i, name) in vars.keys().enumerate() {
                if i > 0 {
                    s.push(' ');
                }
                let _ = write!(s, "|{name}|");
            }
            s.push_str("))\n");
        }
        s
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SolverVerdict {
    Unsat,
    /// Satisfiable, with values for the query's variables.
    Sat(Assignment),
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to start solver `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("solver i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected solver output: {0}")]
    Protocol(String),
    #[error("backend `{0}` is not available in this build")]
    Unavailable(String),
}

#[async_trait]
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check the query within `timeout`. Running out of time is `Unknown`, not an error.
    async fn check(&self, query: &Query, timeout: Duration) -> Result<SolverVerdict, BackendError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Exhaustive search over small finite domains. Always available.
    #[default]
    Bounded,
    /// An external SMT-LIB solver process.
    Smtlib,
    /// The in-process Z3 bindings.
    Z3,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Bounded => "bounded",
            BackendKind::Smtlib => "smtlib",
            BackendKind::Z3 => "z3",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bounded" => Ok(BackendKind::Bounded),
            "smtlib" => Ok(BackendKind::Smtlib),
            "z3" => Ok(BackendKind::Z3),
            other => Err(format!("unknown backend `{other}` (expected bounded, smtlib or z3)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProverOptions {
    pub backend: BackendKind,
    /// Solver executable for the `smtlib` backend.
    pub solver: String,
    pub timeout: Duration,
    /// Maximum number of solver queries in flight.
    pub jobs: usize,
    /// Search budget of the `bounded` backend, in assignments per query.
    pub max_assignments: u64,
    /// Also check that the assumptions of each proved obligation are satisfiable.
    pub check_vacuity: bool,
}

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_ASSIGNMENTS: u64 = 1 << 20;

/// `$Z3_EXE` when set, else `z3` on `PATH`.
pub fn default_solver() -> String {
    std::env::var("Z3_EXE")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "z3".to_string())
}

impl Default for ProverOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            solver: default_solver(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            jobs: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
            check_vacuity: true,
        }
    }
}

pub fn make_backend(opts: &ProverOptions) -> Result<Box<dyn SolverBackend>, BackendError> {
    match opts.backend {
        BackendKind::Bounded => Ok(Box::new(BoundedBackend::new(opts.max_assignments))),
        BackendKind::Smtlib => Ok(Box::new(SmtLibBackend::new(opts.solver.clone()))),
        #[cfg(feature = "z3")]
        BackendKind::Z3 => Ok(Box::new(Z3Backend)),
        #[cfg(not(feature = "z3"))]
        BackendKind::Z3 => Err(BackendError::Unavailable(
            "z3 (rebuild with `--features prova-verify/z3` or use `--backend smtlib`)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::CmpOp;

    #[test]
    fn script_declares_every_variable_once() {
        let x = Term::var("pool.balance", Sort::Int);
        let q = Query::new(vec![
            Term::cmp(CmpOp::Ge, x.clone(), Term::int(0)),
            Term::not(Term::eq(x, Term::int(3))),
        ]);
        let script = q.to_smtlib();
        assert_eq!(script.matches("declare-const").count(), 1);
        assert!(script.contains("(declare-const |pool.balance| Int)"));
        assert!(script.contains("(assert (not (= |pool.balance| 3)))"));
        assert!(script.ends_with("(get-value (|pool.balance|))\n"));
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("smtlib".parse::<BackendKind>(), Ok(BackendKind::Smtlib));
        assert!("cvc5".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::default().name(), "bounded");
    }
}
