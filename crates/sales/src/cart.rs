//! Cart lines and discount pricing shared by sales, returns and layaways.

use serde::{Deserialize, Serialize};

use storeledger_core::{DomainError, DomainResult, Money, ProductId};

/// Per-unit discount on a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Whole percent off the unit price (0..=100).
    Percentage(u32),
    /// Fixed amount off each unit.
    FixedAmount(Money),
}

impl Discount {
    /// Amount taken off one unit priced at `unit_price`.
    pub fn per_unit(&self, unit_price: Money) -> Money {
        match self {
            Discount::Percentage(p) => unit_price.percent(*p),
            Discount::FixedAmount(amount) => *amount,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        match self {
            Discount::Percentage(p) if *p > 100 => Err(DomainError::validation(
                "percentage discount cannot exceed 100",
            )),
            Discount::FixedAmount(amount) if amount.is_negative() => Err(
                DomainError::validation("fixed discount cannot be negative"),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Option<Discount>,
    /// Service lines never touch stock.
    pub is_service: bool,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            discount: None,
            is_service: false,
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn as_service(mut self) -> Self {
        self.is_service = true;
        self
    }

    pub fn affects_stock(&self) -> bool {
        !self.is_service
    }

    /// Unit price after discount, floored at zero.
    pub fn net_unit_price(&self) -> Money {
        let discount = self
            .discount
            .map(|d| d.per_unit(self.unit_price))
            .unwrap_or(Money::ZERO);
        (self.unit_price - discount).non_negative()
    }

    pub fn line_total(&self) -> Money {
        self.net_unit_price() * self.quantity
    }

    /// Undiscounted total.
    pub fn gross_total(&self) -> Money {
        self.unit_price * self.quantity
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.unit_price.is_negative() {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        if let Some(discount) = &self.discount {
            discount.validate()?;
        }
        self.unit_price.checked_mul(self.quantity)?;
        Ok(())
    }
}

/// Reject empty carts and invalid lines.
///
/// A valid cart's totals and per-product quantities fit in `i64`, so the
/// unchecked sums below cannot overflow once this passed.
pub fn validate_cart(lines: &[CartLine]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("cart is empty"));
    }
    lines.iter().try_for_each(CartLine::validate)?;
    Money::checked_sum(lines.iter().map(CartLine::gross_total))?;
    lines
        .iter()
        .try_fold(0i64, |acc, line| acc.checked_add(line.quantity))
        .ok_or_else(|| DomainError::validation("cart quantity overflow"))?;
    Ok(())
}

/// Σ (unit price − discount) × quantity.
pub fn cart_total(lines: &[CartLine]) -> Money {
    lines.iter().map(CartLine::line_total).sum()
}

/// Σ unit price × quantity, discounts ignored.
pub fn gross_total(lines: &[CartLine]) -> Money {
    lines.iter().map(CartLine::gross_total).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(quantity: i64, cents: i64) -> CartLine {
        CartLine::new(ProductId::new(), quantity, Money::from_cents(cents))
    }

    #[test]
    fn total_applies_discounts_per_unit() {
        let lines = vec![
            line(2, 1_000).with_discount(Discount::Percentage(10)),
            line(3, 500).with_discount(Discount::FixedAmount(Money::from_cents(100))),
            line(1, 250),
        ];

        // 2 × 9.00 + 3 × 4.00 + 2.50
        assert_eq!(cart_total(&lines), Money::from_cents(3_250));
        assert_eq!(gross_total(&lines), Money::from_cents(3_750));
    }

    #[test]
    fn fixed_discount_larger_than_price_floors_at_zero() {
        let l = line(4, 300).with_discount(Discount::FixedAmount(Money::from_cents(500)));
        assert_eq!(l.net_unit_price(), Money::ZERO);
        assert_eq!(l.line_total(), Money::ZERO);
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(matches!(validate_cart(&[]), Err(DomainError::Validation(_))));
    }

    #[test]
    fn invalid_lines_are_rejected() {
        assert!(line(0, 100).validate().is_err());
        assert!(line(1, -1).validate().is_err());
        assert!(
            line(1, 100)
                .with_discount(Discount::Percentage(101))
                .validate()
                .is_err()
        );
        assert!(line(1, 0).validate().is_ok());
    }

    #[test]
    fn overflowing_lines_and_carts_are_rejected() {
        assert!(matches!(
            line(i64::MAX, 2).validate(),
            Err(DomainError::Validation(_))
        ));
        assert!(validate_cart(&[line(1, i64::MAX), line(1, 1)]).is_err());
        assert!(validate_cart(&[line(i64::MAX, 0), line(1, 0)]).is_err());
        assert!(validate_cart(&[line(i64::MAX, 0)]).is_ok());
    }

    proptest! {
        #[test]
        fn discounted_total_never_exceeds_gross(
            quantity in 1i64..1_000,
            cents in 0i64..1_000_000,
            percent in 0u32..=100,
        ) {
            let l = line(quantity, cents).with_discount(Discount::Percentage(percent));
            prop_assert!(l.line_total() <= l.gross_total());
            prop_assert!(!l.line_total().is_negative());
        }
    }
}
