#![forbid(unsafe_code)]

//! External solver over SMT-LIB 2 on stdin (`z3 -in -smt2`).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use num::BigInt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{BackendError, Query, SolverBackend, SolverVerdict};
use crate::formula::{Assignment, Sort, Value};

#[derive(Clone, Debug)]
pub struct SmtLibBackend {
    program: String,
}

impl SmtLibBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl SolverBackend for SmtLibBackend {
    fn name(&self) -> &'static str {
        "smtlib"
    }

    async fn check(&self, query: &Query, timeout: Duration) -> Result<SolverVerdict, BackendError> {
        let script = query.to_smtlib();
        let mut child = Command::new(&self.program)
            .args(["-in", "-smt2"])
            .arg(format!("-t:{}", timeout.as_millis()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        // The solver's own `-t` limit usually fires first; this bounds a wedged process.
        let grace = timeout + Duration::from_secs(1);
        let output = match tokio::time::timeout(grace, child.wait_with_output()).await {
            Ok(out) => out?,
            Err(_) => {
                warn!(program = %self.program, ?timeout, "solver did not answer in time");
                return Ok(SolverVerdict::Unknown("timeout".to_string()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(program = %self.program, status = ?output.status, bytes = stdout.len(), "solver finished");
        parse_response(&stdout, &query.vars())
    }
}

/// Interpret `check-sat` followed by an optional `get-value` answer.
pub(crate) fn parse_response(
    text: &str,
    vars: &std::collections::BTreeMap<String, Sort>,
) -> Result<SolverVerdict, BackendError> {
    let text = text.trim_start();
    let (head, rest) = text.split_once('\n').unwrap_or((text, ""));
    match head.trim() {
        "unsat" => Ok(SolverVerdict::Unsat),
        "unknown" => Ok(SolverVerdict::Unknown("solver returned unknown".to_string())),
        "timeout" => Ok(SolverVerdict::Unknown("timeout".to_string())),
        "sat" => {
            if vars.is_empty() {
                return Ok(SolverVerdict::Sat(Assignment::new()));
            }
            let model = parse_values(rest, vars)?;
            Ok(SolverVerdict::Sat(model))
        }
        other => Err(BackendError::Protocol(other.to_string())),
    }
}

#[derive(Debug, PartialEq)]
enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' => out.push(c.to_string()),
            '|' => {
                let mut sym = String::new();
                for c in chars.by_ref() {
                    if c == '|' {
                        break;
                    }
                    sym.push(c);
                }
                out.push(sym);
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = c.to_string();
                while let Some(&n) = chars.peek() {
                    if n == '(' || n == ')' || n.is_whitespace() {
                        break;
                    }
                    atom.push(n);
                    chars.next();
                }
                out.push(atom);
            }
        }
    }
    out
}

fn parse_sexpr(tokens: &[String], pos: &mut usize) -> Result<SExpr, BackendError> {
    let tok = tokens
        .get(*pos)
        .ok_or_else(|| BackendError::Protocol("truncated model".to_string()))?;
    *pos += 1;
    match tok.as_str() {
        "(" => {
            let mut items = Vec::new();
            while tokens.get(*pos).map(String::as_str) != Some(")") {
                items.push(parse_sexpr(tokens, pos)?);
            }
            *pos += 1;
            Ok(SExpr::List(items))
        }
        ")" => Err(BackendError::Protocol("unbalanced `)` in model".to_string())),
        atom => Ok(SExpr::Atom(atom.to_string())),
    }
}

fn parse_value(e: &SExpr, sort: Sort) -> Result<Value, BackendError> {
    let bad = || BackendError::Protocol(format!("cannot read {e:?} as {}", sort.smt_name()));
    match (sort, e) {
        (Sort::Bool, SExpr::Atom(a)) => match a.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(bad()),
        },
        (Sort::Int, SExpr::Atom(a)) => a.parse::<BigInt>().map(Value::Int).map_err(|_| bad()),
        (Sort::Int, SExpr::List(items)) => match items.as_slice() {
            [SExpr::Atom(minus), inner] if minus == "-" => match parse_value(inner, Sort::Int)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Bool(_) => Err(bad()),
            },
            _ => Err(bad()),
        },
        _ => Err(bad()),
    }
}

fn parse_values(
    text: &str,
    vars: &std::collections::BTreeMap<String, Sort>,
) -> Result<Assignment, BackendError> {
    let tokens = tokenize(text);
    let mut pos = 0;
    let SExpr::List(pairs) = parse_sexpr(&tokens, &mut pos)? else {
        return Err(BackendError::Protocol(format!("expected a value list, got `{}`", text.trim())));
    };
    let mut model = Assignment::new();
    for pair in &pairs {
        let SExpr::List(kv) = pair else {
            return Err(BackendError::Protocol(format!("malformed model entry {pair:?}")));
        };
        let [SExpr::Atom(name), value] = kv.as_slice() else {
            return Err(BackendError::Protocol(format!("malformed model entry {pair:?}")));
        };
        let Some(sort) = vars.get(name) else {
            continue;
        };
        model.insert(name.clone(), parse_value(value, *sort)?);
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn vars() -> BTreeMap<String, Sort> {
        BTreeMap::from([
            ("pool.balance".to_string(), Sort::Int),
            ("d".to_string(), Sort::Int),
            ("flag".to_string(), Sort::Bool),
        ])
    }

    #[test]
    fn reads_models_with_quoted_and_negative_values() {
        let out = "sat\n((|pool.balance| 100)\n (|d| (- 7))\n (flag true))\n";
        let SolverVerdict::Sat(m) = parse_response(out, &vars()).unwrap() else {
            panic!("expected sat");
        };
        assert_eq!(m["pool.balance"], Value::Int(BigInt::from(100)));
        assert_eq!(m["d"], Value::Int(BigInt::from(-7)));
        assert_eq!(m["flag"], Value::Bool(true));
    }

    #[test]
    fn unsat_and_unknown() {
        assert_eq!(parse_response("unsat\n(error \"model is not available\")", &vars()).unwrap(), SolverVerdict::Unsat);
        assert!(matches!(parse_response("unknown\n", &vars()).unwrap(), SolverVerdict::Unknown(_)));
        assert!(parse_response("(error \"line 1\")", &vars()).is_err());
    }
}
