//! Return planning: bounds checks, refund computation and full/partial detection.
//!
//! Planning is pure; the caller applies the plan (stock restore, return record,
//! original status) only after it validated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeledger_core::{
    BranchId, CajaId, DomainError, DomainResult, Money, ProductId, SaleId, UserId,
};

use crate::cart::CartLine;
use crate::sale::{PaymentMethod, PaymentStatus, Sale};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub return_to_stock: bool,
    /// Overrides the discounted unit price × quantity refund for this line.
    pub custom_refund_amount: Option<Money>,
}

impl ReturnLine {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            return_to_stock: true,
            custom_refund_amount: None,
        }
    }

    pub fn without_restock(mut self) -> Self {
        self.return_to_stock = false;
        self
    }

    pub fn with_refund(mut self, amount: Money) -> Self {
        self.custom_refund_amount = Some(amount);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnPlan {
    /// Lines of the return record, priced at the original net unit price.
    pub lines: Vec<CartLine>,
    pub refund: Money,
    /// (product, quantity) pairs that go back on the shelf.
    pub restock: Vec<(ProductId, i64)>,
    /// Status the original sale moves to.
    pub resulting_status: PaymentStatus,
}

impl ReturnPlan {
    pub fn is_full(&self) -> bool {
        self.resulting_status == PaymentStatus::FullyReturned
    }
}

/// Plan a return of `lines` against `original`, given the returns already
/// recorded against it.
///
/// Returned units are drawn from the original lines in order, earlier returns
/// first, and each unit is refunded at the net price of the line it came from.
/// The original becomes `FullyReturned` once every line is used up.
pub fn plan_return(
    original: &Sale,
    prior_returns: &[Sale],
    lines: &[ReturnLine],
) -> DomainResult<ReturnPlan> {
    if original.is_return {
        return Err(DomainError::validation("cannot return a return record"));
    }
    if !original.payment_status.accepts_returns() {
        return Err(DomainError::validation(format!(
            "sale in status {:?} does not accept returns",
            original.payment_status
        )));
    }
    if lines.is_empty() {
        return Err(DomainError::validation("return must contain at least one line"));
    }

    let mut returned: BTreeMap<ProductId, i64> = BTreeMap::new();
    for record in prior_returns
        .iter()
        .filter(|r| r.is_return && r.original_sale_id == Some(original.id))
    {
        for line in &record.lines {
            *returned.entry(line.product_id).or_insert(0) += line.quantity;
        }
    }

    // units still returnable on each original line
    let mut remaining: Vec<i64> = original.lines.iter().map(|l| l.quantity).collect();
    for (product_id, quantity) in returned {
        draw(original, &mut remaining, product_id, quantity);
    }

    let mut plan_lines = Vec::with_capacity(lines.len());
    let mut restock = Vec::new();
    let mut refund = Money::ZERO;

    for line in lines {
        if line.quantity <= 0 {
            return Err(DomainError::validation("return quantity must be positive"));
        }
        if line.custom_refund_amount.is_some_and(|a| a.is_negative()) {
            return Err(DomainError::validation("refund amount cannot be negative"));
        }
        if !original.lines.iter().any(|l| l.product_id == line.product_id) {
            return Err(DomainError::validation(format!(
                "product {} was not part of sale {}",
                line.product_id, original.id
            )));
        }

        let returnable: i64 = original
            .lines
            .iter()
            .zip(&remaining)
            .filter(|(l, _)| l.product_id == line.product_id)
            .map(|(_, left)| *left)
            .sum();
        if line.quantity > returnable {
            let sold = original.quantity_sold(line.product_id);
            return Err(DomainError::validation(format!(
                "cannot return {} of product {}: {} sold, {} already returned",
                line.quantity,
                line.product_id,
                sold,
                sold - returnable
            )));
        }

        let mut line_refund = Money::ZERO;
        let mut restocked = 0i64;
        for (index, quantity) in draw(original, &mut remaining, line.product_id, line.quantity) {
            let sold_line = &original.lines[index];
            let unit_refund = sold_line.net_unit_price();
            line_refund = line_refund.checked_add(unit_refund.checked_mul(quantity)?)?;
            if !sold_line.is_service {
                restocked += quantity;
            }
            plan_lines.push(CartLine {
                product_id: line.product_id,
                quantity,
                unit_price: unit_refund,
                discount: None,
                is_service: sold_line.is_service,
            });
        }

        refund = refund.checked_add(line.custom_refund_amount.unwrap_or(line_refund))?;
        if line.return_to_stock && restocked > 0 {
            restock.push((line.product_id, restocked));
        }
    }

    let fully_returned = remaining.iter().all(|left| *left == 0);

    Ok(ReturnPlan {
        lines: plan_lines,
        refund,
        restock,
        resulting_status: if fully_returned {
            PaymentStatus::FullyReturned
        } else {
            PaymentStatus::PartiallyReturned
        },
    })
}

/// Take up to `quantity` units of `product_id` from the original lines in order.
///
/// Returns the (line index, units) pairs drawn.
fn draw(
    original: &Sale,
    remaining: &mut [i64],
    product_id: ProductId,
    mut quantity: i64,
) -> Vec<(usize, i64)> {
    let mut drawn = Vec::new();
    for (index, line) in original.lines.iter().enumerate() {
        if quantity == 0 {
            break;
        }
        if line.product_id != product_id || remaining[index] == 0 {
            continue;
        }
        let take = quantity.min(remaining[index]);
        remaining[index] -= take;
        quantity -= take;
        drawn.push((index, take));
    }
    drawn
}

/// Where and by whom a return is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnContext {
    pub branch_id: BranchId,
    pub caja_id: CajaId,
    pub employee_id: UserId,
    pub reason: Option<String>,
}

impl Sale {
    /// The return record for `plan`: negative total, `Return` method, linked to the original.
    pub fn return_record(
        id: SaleId,
        date: DateTime<Utc>,
        original: &Sale,
        plan: &ReturnPlan,
        context: ReturnContext,
    ) -> Sale {
        Sale {
            id,
            date,
            branch_id: context.branch_id,
            caja_id: context.caja_id,
            employee_id: context.employee_id,
            client_id: original.client_id,
            lines: plan.lines.clone(),
            total_amount: -plan.refund,
            payment_method: PaymentMethod::Return,
            payment_status: PaymentStatus::Paid,
            is_return: true,
            original_sale_id: Some(original.id),
            notes: context.reason,
        }
    }
}
