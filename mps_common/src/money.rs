use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const KRW_CURRENCY_CODE: &str = "KRW";

//--------------------------------------       Money        ----------------------------------------------------------
/// An amount of money in whole won. Stored as a signed integer so that reversals and balance adjustments can be
/// expressed as negative amounts.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "₩{}", self.0)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Multiplies by a quantity, returning `None` on i64 overflow. Totals computed from client-supplied
    /// quantities go through this rather than `Mul`.
    pub fn checked_mul(&self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn money_arithmetic() {
        let a = Money::from(1_000);
        let b = Money::from(250);
        assert_eq!(a + b, Money::from(1_250));
        assert_eq!(a - b, Money::from(750));
        assert_eq!(-b, Money::from(-250));
        assert_eq!(a * 3, Money::from(3_000));
    }

    #[test]
    fn checked_mul_catches_overflow() {
        assert_eq!(Money::from(1_000).checked_mul(5), Some(Money::from(5_000)));
        assert_eq!(Money::from(i64::MAX).checked_mul(2), None);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from(15_000).to_string(), "₩15000");
    }
}
