#![forbid(unsafe_code)]

//! Spec-only global cells keyed by a tag type.
//!
//! A store is created per spec function and threaded through the walk; branches get a
//! copy and are merged back at the join.

use std::collections::BTreeMap;

use num::BigInt;
use prova_core::Type;
use thiserror::Error;

use crate::formula::Term;
use crate::unbounded::NumTy;
use crate::value::SymValue;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GhostError {
    #[error("ghost cell `{tag}` is not declared; call `declare_global<{tag}, {ty}>()` first")]
    Undeclared { tag: String, ty: String },
    #[error("ghost cell `{tag}` was declared with type `{declared}` but is used as `{requested}`")]
    TypeConflict {
        tag: String,
        declared: String,
        requested: String,
    },
    #[error("ghost cells hold `bool` or integer values, not `{0}`")]
    UnsupportedType(String),
}

#[derive(Clone, Debug, PartialEq)]
struct GhostCell {
    ty: Type,
    value: SymValue,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GhostStore {
    cells: BTreeMap<String, GhostCell>,
}

fn zero_of(ty: &Type) -> Result<SymValue, GhostError> {
    match ty {
        Type::Bool => Ok(SymValue::Bool(Term::Bool(false))),
        Type::Int(t) => Ok(SymValue::int(Term::Int(BigInt::from(0)), NumTy::Fixed(*t))),
        Type::Integer => Ok(SymValue::int(Term::Int(BigInt::from(0)), NumTy::Unbounded)),
        other => Err(GhostError::UnsupportedType(other.display())),
    }
}

impl GhostStore {
    /// Register `tag` with the zero value of `ty`. Redeclaring with the same type keeps the
    /// current value.
    pub fn declare(&mut self, tag: &str, ty: &Type) -> Result<(), GhostError> {
        if let Some(cell) = self.cells.get(tag) {
            return self.check_type(tag, cell, ty);
        }
        let value = zero_of(ty)?;
        self.cells.insert(
            tag.to_string(),
            GhostCell {
                ty: ty.clone(),
                value,
            },
        );
        Ok(())
    }

    fn check_type(&self, tag: &str, cell: &GhostCell, ty: &Type) -> Result<(), GhostError> {
        if &cell.ty != ty {
            return Err(GhostError::TypeConflict {
                tag: tag.to_string(),
                declared: cell.ty.display(),
                requested: ty.display(),
            });
        }
        Ok(())
    }

    fn cell(&self, tag: &str, ty: &Type) -> Result<&GhostCell, GhostError> {
        let cell = self.cells.get(tag).ok_or_else(|| GhostError::Undeclared {
            tag: tag.to_string(),
            ty: ty.display(),
        })?;
        self.check_type(tag, cell, ty)?;
        Ok(cell)
    }

    pub fn read(&self, tag: &str, ty: &Type) -> Result<SymValue, GhostError> {
        Ok(self.cell(tag, ty)?.value.clone())
    }

    pub fn write(&mut self, tag: &str, ty: &Type, value: SymValue) -> Result<(), GhostError> {
        self.cell(tag, ty)?;
        if let Some(cell) = self.cells.get_mut(tag) {
            cell.value = value;
        }
        Ok(())
    }

    /// An emitted event sets its declared `bool` cell. Undeclared events have no ghost effect.
    pub fn emit(&mut self, tag: &str) {
        if let Some(cell) = self.cells.get_mut(tag) {
            if cell.ty == Type::Bool {
                cell.value = SymValue::Bool(Term::Bool(true));
            }
        }
    }

    pub fn is_declared(&self, tag: &str) -> bool {
        self.cells.contains_key(tag)
    }

    /// Join two branch stores under `cond`. A cell declared on one side only starts from its
    /// zero value on the other.
    pub fn merge(cond: &Term, then: GhostStore, otherwise: GhostStore) -> Result<GhostStore, String> {
        let mut cells = BTreeMap::new();
        let mut rest = otherwise.cells;
        for (tag, t) in then.cells {
            let e = match rest.remove(&tag) {
                Some(e) => e.value,
                None => zero_of(&t.ty).map_err(|e| e.to_string())?,
            };
            let value = SymValue::merge(cond, t.value, e)?;
            cells.insert(tag, GhostCell { ty: t.ty, value });
        }
        for (tag, e) in rest {
            let zero = zero_of(&e.ty).map_err(|e| e.to_string())?;
            let value = SymValue::merge(cond, zero, e.value)?;
            cells.insert(tag, GhostCell { ty: e.ty, value });
        }
        Ok(GhostStore { cells })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Sort;
    use prova_core::IntTy;

    #[test]
    fn declared_default_and_write() {
        let mut g = GhostStore::default();
        g.declare("Big", &Type::Bool).unwrap();
        assert_eq!(g.read("Big", &Type::Bool).unwrap(), SymValue::Bool(Term::Bool(false)));
        g.emit("Big");
        assert_eq!(g.read("Big", &Type::Bool).unwrap(), SymValue::Bool(Term::Bool(true)));
        // Redeclaration keeps the current value.
        g.declare("Big", &Type::Bool).unwrap();
        assert_eq!(g.read("Big", &Type::Bool).unwrap(), SymValue::Bool(Term::Bool(true)));
    }

    #[test]
    fn undeclared_and_conflicting_access() {
        let mut g = GhostStore::default();
        assert!(matches!(g.read("X", &Type::Bool), Err(GhostError::Undeclared { .. })));
        assert!(g.write("X", &Type::Bool, SymValue::Bool(Term::Bool(true))).is_err());
        g.declare("X", &Type::Int(IntTy::U64)).unwrap();
        assert!(matches!(g.declare("X", &Type::Bool), Err(GhostError::TypeConflict { .. })));
        assert!(g.declare("S", &Type::Struct("Pool".into())).is_err());
    }

    #[test]
    fn emit_without_cell_is_ignored() {
        let mut g = GhostStore::default();
        g.emit("Other");
        assert!(!g.is_declared("Other"));
    }

    #[test]
    fn merge_keeps_default_on_the_silent_branch() {
        let mut base = GhostStore::default();
        base.declare("Big", &Type::Bool).unwrap();
        let mut then = base.clone();
        then.emit("Big");
        let c = Term::var("c", Sort::Bool);
        let merged = GhostStore::merge(&c, then, base).unwrap();
        assert_eq!(
            merged.read("Big", &Type::Bool).unwrap(),
            SymValue::Bool(Term::ite(c, Term::Bool(true), Term::Bool(false)))
        );
    }
}
