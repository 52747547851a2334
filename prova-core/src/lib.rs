#![forbid(unsafe_code)]

mod error;
mod erase;
mod model;
mod scope;
mod signature;
mod types;

pub use erase::erase_spec;
pub use error::SemanticError;
pub use model::{
    build_model, place_root, Callee, ConstInfo, ConstValue, FunctionInfo, FunctionKind, SpecAttrs,
    SpecFunction, SpecModel, StructInfo, INTEGER_METHODS,
};
pub use scope::{Intrinsic, Scope};
pub use signature::{FunctionSignature, ParamMode, SignatureMismatch, SignatureParam};
pub use types::{IntTy, Type};
