#![forbid(unsafe_code)]

//! Function signatures and the shadow-signature check.
//!
//! A spec function is a shadow of the runtime function it verifies: same parameter
//! types in the same order, same return type. Names may differ.

use prova_ast::Span;

use crate::types::Type;

/// How a parameter is passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamMode {
    Owned,
    /// `&T`
    BorrowedImmut,
    /// `&mut T`
    BorrowedMut,
}

impl ParamMode {
    pub fn of(ty: &Type) -> Self {
        match ty {
            Type::Ref { mutable: true, .. } => ParamMode::BorrowedMut,
            Type::Ref { mutable: false, .. } => ParamMode::BorrowedImmut,
            _ => ParamMode::Owned,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            ParamMode::Owned => "owned",
            ParamMode::BorrowedImmut => "borrowed (immut)",
            ParamMode::BorrowedMut => "borrowed (mut)",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SignatureParam {
    pub name: String,
    pub span: Span,
    pub ty: Type,
    pub mode: ParamMode,
}

#[derive(Clone, Debug)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<SignatureParam>,
    pub ret: Type,
}

/// A single reason two signatures differ, anchored at the offending shadow parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureMismatch {
    pub message: String,
    pub param_index: Option<usize>,
}

impl FunctionSignature {
    pub fn new(name: String, params: Vec<SignatureParam>, ret: Type) -> Self {
        FunctionSignature { name, params, ret }
    }

    /// Parameters passed as `&mut`; these are the roots snapshots may be taken of.
    pub fn mut_params(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.mode == ParamMode::BorrowedMut)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn param(&self, name: &str) -> Option<&SignatureParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check that `self` (a spec function) shadows `target`.
    pub fn validate_shadow(&self, target: &FunctionSignature) -> Result<(), Vec<SignatureMismatch>> {
        let mut errors = Vec::new();

        if self.params.len() != target.params.len() {
            errors.push(SignatureMismatch {
                message: format!(
                    "`{}` takes {} parameter(s) but its target `{}` takes {}",
                    self.name,
                    self.params.len(),
                    target.name,
                    target.params.len()
                ),
                param_index: None,
            });
            return Err(errors);
        }

        for (i, (mine, theirs)) in self.params.iter().zip(&target.params).enumerate() {
            if mine.ty != theirs.ty {
                errors.push(SignatureMismatch {
                    message: format!(
                        "parameter {} (`{}`) of `{}` has type `{}` but `{}` expects `{}`",
                        i + 1,
                        mine.name,
                        self.name,
                        mine.ty.display(),
                        target.name,
                        theirs.ty.display()
                    ),
                    param_index: Some(i),
                });
            }
        }

        if self.ret != target.ret {
            errors.push(SignatureMismatch {
                message: format!(
                    "`{}` returns `{}` but its target `{}` returns `{}`",
                    self.name,
                    self.ret.display(),
                    target.name,
                    target.ret.display()
                ),
                param_index: None,
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Arity check at a call site. Argument types are checked during obligation generation,
    /// where the symbolic values carry them.
    pub fn validate_call_arity(&self, args: usize) -> Result<(), String> {
        if args != self.params.len() {
            return Err(format!(
                "function `{}` expects {} argument(s), got {}",
                self.name,
                self.params.len(),
                args
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntTy;

    fn param(name: &str, ty: Type) -> SignatureParam {
        SignatureParam {
            name: name.to_string(),
            span: prova_ast::span(0, 0),
            mode: ParamMode::of(&ty),
            ty,
        }
    }

    fn pool_ref() -> Type {
        Type::Ref {
            mutable: true,
            inner: Box::new(Type::Struct("Pool".into())),
        }
    }

    #[test]
    fn shadow_with_renamed_params_is_accepted() {
        let target = FunctionSignature::new(
            "withdraw".into(),
            vec![param("pool", pool_ref()), param("shares_in", Type::Int(IntTy::U64))],
            Type::Int(IntTy::U64),
        );
        let spec = FunctionSignature::new(
            "withdraw_spec".into(),
            vec![param("p", pool_ref()), param("n", Type::Int(IntTy::U64))],
            Type::Int(IntTy::U64),
        );
        assert!(spec.validate_shadow(&target).is_ok());
        assert_eq!(spec.mut_params(), vec!["p"]);
    }

    #[test]
    fn shadow_type_mismatch_names_the_parameter() {
        let target = FunctionSignature::new(
            "withdraw".into(),
            vec![param("pool", pool_ref()), param("shares_in", Type::Int(IntTy::U64))],
            Type::Int(IntTy::U64),
        );
        let spec = FunctionSignature::new(
            "withdraw_spec".into(),
            vec![param("pool", pool_ref()), param("shares_in", Type::Int(IntTy::U128))],
            Type::Int(IntTy::U64),
        );
        let errs = spec.validate_shadow(&target).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].param_index, Some(1));
        assert!(errs[0].message.contains("u128"));
    }

    #[test]
    fn shadow_arity_and_return_mismatch() {
        let target = FunctionSignature::new("f".into(), vec![param("x", Type::Bool)], Type::Unit);
        let spec = FunctionSignature::new("f_spec".into(), vec![], Type::Unit);
        assert!(spec.validate_shadow(&target).is_err());

        let spec = FunctionSignature::new("f_spec".into(), vec![param("x", Type::Bool)], Type::Bool);
        let errs = spec.validate_shadow(&target).unwrap_err();
        assert!(errs[0].message.contains("returns"));
    }

    #[test]
    fn call_arity() {
        let sig = FunctionSignature::new("f".into(), vec![param("x", Type::Bool)], Type::Unit);
        assert!(sig.validate_call_arity(1).is_ok());
        assert!(sig.validate_call_arity(2).is_err());
    }
}
