#![forbid(unsafe_code)]

//! The spec-only `Integer` domain.
//!
//! Concrete values are arbitrary-precision signed integers with ring semantics. The
//! symbolic side (`NumTy`) decides how fixed-width, unbounded and literal operands combine
//! during obligation generation.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num::{BigInt, Integer, One, Signed, Zero};
use prova_core::IntTy;

/// Euclidean quotient (SMT-LIB `div`): the remainder is always non-negative.
pub fn euclid_div(a: &BigInt, b: &BigInt) -> Option<BigInt> {
    if b.is_zero() {
        return None;
    }
    let r = a.mod_floor(&b.abs());
    Some((a - &r) / b)
}

/// Euclidean remainder (SMT-LIB `mod`), in `0..|b|`.
pub fn euclid_rem(a: &BigInt, b: &BigInt) -> Option<BigInt> {
    if b.is_zero() {
        return None;
    }
    Some(a.mod_floor(&b.abs()))
}

/// Largest value of a fixed-width type.
pub fn int_max(ty: IntTy) -> BigInt {
    (BigInt::one() << ty.bits()) - BigInt::one()
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnboundedValue(BigInt);

impl UnboundedValue {
    pub fn zero() -> Self {
        UnboundedValue(BigInt::zero())
    }

    pub fn into_bigint(self) -> BigInt {
        self.0
    }

    /// `None` for a zero divisor.
    pub fn checked_div(&self, rhs: &Self) -> Option<Self> {
        euclid_div(&self.0, &rhs.0).map(UnboundedValue)
    }

    pub fn checked_rem(&self, rhs: &Self) -> Option<Self> {
        euclid_rem(&self.0, &rhs.0).map(UnboundedValue)
    }

    /// Whether the value is representable in `ty`.
    pub fn fits(&self, ty: IntTy) -> bool {
        !self.0.is_negative() && self.0 <= int_max(ty)
    }
}

macro_rules! lift_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for UnboundedValue {
                fn from(v: $t) -> Self {
                    UnboundedValue(BigInt::from(v))
                }
            }
        )*
    };
}

lift_from!(u8, u16, u32, u64, u128);

impl From<BigInt> for UnboundedValue {
    fn from(v: BigInt) -> Self {
        UnboundedValue(v)
    }
}

impl Add for UnboundedValue {
    type Output = UnboundedValue;
    fn add(self, rhs: Self) -> Self {
        UnboundedValue(self.0 + rhs.0)
    }
}

impl Sub for UnboundedValue {
    type Output = UnboundedValue;
    fn sub(self, rhs: Self) -> Self {
        UnboundedValue(self.0 - rhs.0)
    }
}

impl Mul for UnboundedValue {
    type Output = UnboundedValue;
    fn mul(self, rhs: Self) -> Self {
        UnboundedValue(self.0 * rhs.0)
    }
}

impl Neg for UnboundedValue {
    type Output = UnboundedValue;
    fn neg(self) -> Self {
        UnboundedValue(-self.0)
    }
}

impl fmt::Display for UnboundedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric type of a symbolic integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumTy {
    Fixed(IntTy),
    /// Spec-only `Integer`.
    Unbounded,
    /// An untyped literal; takes the type of the other operand.
    Literal,
}

impl NumTy {
    pub fn display(self) -> &'static str {
        match self {
            NumTy::Fixed(t) => t.name(),
            NumTy::Unbounded => "Integer",
            NumTy::Literal => "integer literal",
        }
    }

    /// Type of a binary operation's operands. Fixed-width and unbounded values never mix.
    pub fn unify(self, other: NumTy) -> Result<NumTy, String> {
        match (self, other) {
            (NumTy::Literal, t) | (t, NumTy::Literal) => Ok(t),
            (NumTy::Unbounded, NumTy::Unbounded) => Ok(NumTy::Unbounded),
            (NumTy::Fixed(a), NumTy::Fixed(b)) if a == b => Ok(NumTy::Fixed(a)),
            (NumTy::Fixed(a), NumTy::Fixed(b)) => Err(format!(
                "mismatched integer types `{}` and `{}`; add an explicit cast",
                a.name(),
                b.name()
            )),
            (NumTy::Fixed(t), NumTy::Unbounded) | (NumTy::Unbounded, NumTy::Fixed(t)) => Err(format!(
                "cannot mix `Integer` with `{}`; lift the fixed-width operand with `.to_int()`",
                t.name()
            )),
        }
    }
}
