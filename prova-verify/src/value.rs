#![forbid(unsafe_code)]

use crate::formula::Term;
use crate::unbounded::NumTy;

/// A symbolic value during the walk. Structs are expanded field by field, so copying a
/// value copies every leaf term.
#[derive(Clone, Debug, PartialEq)]
pub enum SymValue {
    Unit,
    /// Result of an expression that always aborts.
    Never,
    Bool(Term),
    Int { term: Term, ty: NumTy },
    Struct { name: String, fields: Vec<(String, SymValue)> },
}

impl SymValue {
    pub fn int(term: Term, ty: NumTy) -> Self {
        SymValue::Int { term, ty }
    }

    pub fn type_name(&self) -> String {
        match self {
            SymValue::Unit => "()".to_string(),
            SymValue::Never => "!".to_string(),
            SymValue::Bool(_) => "bool".to_string(),
            SymValue::Int { ty, .. } => ty.display().to_string(),
            SymValue::Struct { name, .. } => name.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&SymValue> {
        match self {
            SymValue::Struct { fields, .. } => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut SymValue> {
        match self {
            SymValue::Struct { fields, .. } => fields.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follow a field path.
    pub fn at(&self, path: &[String]) -> Option<&SymValue> {
        path.iter().try_fold(self, |v, f| v.field(f))
    }

    pub fn at_mut(&mut self, path: &[String]) -> Option<&mut SymValue> {
        let mut cur = self;
        for f in path {
            cur = cur.field_mut(f)?;
        }
        Some(cur)
    }

    /// Leaf terms with their dotted source names, `prefix.field.sub`.
    pub fn leaves(&self, prefix: &str) -> Vec<(String, Term)> {
        let mut out = Vec::new();
        self.collect_leaves(prefix, &mut out);
        out
    }

    fn collect_leaves(&self, prefix: &str, out: &mut Vec<(String, Term)>) {
        match self {
            SymValue::Bool(t) | SymValue::Int { term: t, .. } => out.push((prefix.to_string(), t.clone())),
            SymValue::Struct { fields, .. } => {
                for (n, v) in fields {
                    v.collect_leaves(&format!("{prefix}.{n}"), out);
                }
            }
            SymValue::Unit | SymValue::Never => {}
        }
    }

    /// Structural equality as a formula.
    pub fn equals(&self, other: &SymValue) -> Result<Term, String> {
        match (self, other) {
            (SymValue::Unit, SymValue::Unit) => Ok(Term::Bool(true)),
            (SymValue::Bool(a), SymValue::Bool(b)) => Ok(Term::eq(a.clone(), b.clone())),
            (SymValue::Int { term: a, ty: ta }, SymValue::Int { term: b, ty: tb }) => {
                ta.unify(*tb)?;
                Ok(Term::eq(a.clone(), b.clone()))
            }
            (SymValue::Struct { name: na, fields: fa }, SymValue::Struct { name: nb, fields: fb }) if na == nb => {
                let parts = fa
                    .iter()
                    .zip(fb)
                    .map(|((_, a), (_, b))| a.equals(b))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Term::and(parts))
            }
            (a, b) => Err(format!(
                "cannot compare `{}` with `{}`",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    /// `if cond { then } else { otherwise }`, merged leaf by leaf.
    pub fn merge(cond: &Term, then: SymValue, otherwise: SymValue) -> Result<SymValue, String> {
        Ok(match (then, otherwise) {
            (SymValue::Never, v) | (v, SymValue::Never) => v,
            (SymValue::Unit, SymValue::Unit) => SymValue::Unit,
            (SymValue::Bool(a), SymValue::Bool(b)) => SymValue::Bool(Term::ite(cond.clone(), a, b)),
            (SymValue::Int { term: a, ty: ta }, SymValue::Int { term: b, ty: tb }) => SymValue::Int {
                ty: ta.unify(tb)?,
                term: Term::ite(cond.clone(), a, b),
            },
            (SymValue::Struct { name: na, fields: fa }, SymValue::Struct { name: nb, fields: fb }) if na == nb => {
                let fields = fa
                    .into_iter()
                    .zip(fb)
                    .map(|((n, a), (_, b))| Ok((n, SymValue::merge(cond, a, b)?)))
                    .collect::<Result<Vec<_>, String>>()?;
                SymValue::Struct { name: na, fields }
            }
            (a, b) => {
                return Err(format!(
                    "branches have different types: `{}` and `{}`",
                    a.type_name(),
                    b.type_name()
                ));
            }
        })
    }
}
