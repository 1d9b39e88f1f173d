//! Monetary amounts in the smallest currency unit.
//!
//! The ledger is single-currency; amounts are signed so refunds and return
//! records can carry negative totals.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Signed amount in minor units (e.g. cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `percent`% of this amount, rounded half away from zero.
    pub fn percent(&self, percent: u32) -> Money {
        let scaled = i128::from(self.0) * i128::from(percent);
        let rounded = if scaled >= 0 {
            (scaled + 50) / 100
        } else {
            (scaled - 50) / 100
        };
        Money(rounded as i64)
    }

    /// `self + rhs`, or a validation error when the sum leaves the `i64` range.
    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or_else(|| {
                DomainError::validation(format!("amount overflow adding {rhs} to {self}"))
            })
    }

    /// `self × factor`, or a validation error on overflow.
    pub fn checked_mul(self, factor: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(factor)
            .map(Money)
            .ok_or_else(|| {
                DomainError::validation(format!("amount overflow multiplying {self} by {factor}"))
            })
    }

    /// Σ `amounts`, failing on the first overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Clamp negative amounts to zero.
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}
