#![forbid(unsafe_code)]

use num::BigUint;

/// Fixed-width unsigned integer types of the host language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntTy {
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
}

impl IntTy {
    pub const ALL: [IntTy; 6] = [IntTy::U8, IntTy::U16, IntTy::U32, IntTy::U64, IntTy::U128, IntTy::U256];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            IntTy::U8 => "u8",
            IntTy::U16 => "u16",
            IntTy::U32 => "u32",
            IntTy::U64 => "u64",
            IntTy::U128 => "u128",
            IntTy::U256 => "u256",
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            IntTy::U8 => 8,
            IntTy::U16 => 16,
            IntTy::U32 => 32,
            IntTy::U64 => 64,
            IntTy::U128 => 128,
            IntTy::U256 => 256,
        }
    }

    /// Whether a literal value is representable.
    pub fn fits(self, value: &BigUint) -> bool {
        value.bits() <= u64::from(self.bits())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Bool,
    Int(IntTy),
    /// Spec-only arbitrary-precision integer.
    Integer,
    Struct(String),
    Ref { mutable: bool, inner: Box<Type> },
}

impl Type {
    pub fn display(&self) -> String {
        match self {
            Type::Unit => "()".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Int(t) => t.name().to_string(),
            Type::Integer => "Integer".to_string(),
            Type::Struct(name) => name.clone(),
            Type::Ref { mutable, inner } => {
                if *mutable {
                    format!("&mut {}", inner.display())
                } else {
                    format!("&{}", inner.display())
                }
            }
        }
    }

    /// The referenced type for `&T` / `&mut T`, the type itself otherwise.
    pub fn deref(&self) -> &Type {
        match self {
            Type::Ref { inner, .. } => inner.deref(),
            other => other,
        }
    }

    pub fn is_mut_ref(&self) -> bool {
        matches!(self, Type::Ref { mutable: true, .. })
    }

    pub fn mentions_integer(&self) -> bool {
        match self {
            Type::Integer => true,
            Type::Ref { inner, .. } => inner.mentions_integer(),
            _ => false,
        }
    }
}
