use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeledger_core::{
    BranchId, CajaId, ClientId, DomainError, DomainResult, Entity, Money, ProductId, SaleId,
    UserId,
};

use crate::cart::{CartLine, cart_total, validate_cart};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    /// Charged to the client's account; the sale stays pending until paid.
    StoreCredit,
    /// Refund issued by a return record.
    Return,
    Other(String),
}

impl PaymentMethod {
    pub fn defers_payment(&self) -> bool {
        matches!(self, PaymentMethod::StoreCredit)
    }
}

/// Sale payment status lifecycle.
///
/// `Paid | PendingPayment → PartiallyReturned → FullyReturned`,
/// `Paid | PendingPayment → FullyReturned`, and `PendingPayment → Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    PendingPayment,
    Voided,
    PartiallyReturned,
    FullyReturned,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid)
                | (Paid | PendingPayment, PartiallyReturned | FullyReturned)
                | (PartiallyReturned, PartiallyReturned | FullyReturned)
        )
    }

    /// Whether further returns may be taken against a sale in this status.
    pub fn accepts_returns(self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::PendingPayment | PaymentStatus::PartiallyReturned
        )
    }
}

/// Input for a new point-of-sale transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDraft {
    pub lines: Vec<CartLine>,
    pub branch_id: BranchId,
    pub caja_id: CajaId,
    pub employee_id: UserId,
    pub client_id: Option<ClientId>,
    pub payment_method: PaymentMethod,
}

/// A completed sale, or a return record when `is_return` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub date: DateTime<Utc>,
    pub branch_id: BranchId,
    pub caja_id: CajaId,
    pub employee_id: UserId,
    pub client_id: Option<ClientId>,
    pub lines: Vec<CartLine>,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub is_return: bool,
    pub original_sale_id: Option<SaleId>,
    pub notes: Option<String>,
}

impl Entity for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Sale {
    /// Build a completed sale from a validated cart.
    pub fn complete(id: SaleId, date: DateTime<Utc>, draft: SaleDraft) -> DomainResult<Self> {
        validate_cart(&draft.lines)?;

        let payment_status = if draft.payment_method.defers_payment() {
            PaymentStatus::PendingPayment
        } else {
            PaymentStatus::Paid
        };

        Ok(Self {
            id,
            date,
            branch_id: draft.branch_id,
            caja_id: draft.caja_id,
            employee_id: draft.employee_id,
            client_id: draft.client_id,
            total_amount: cart_total(&draft.lines),
            lines: draft.lines,
            payment_method: draft.payment_method,
            payment_status,
            is_return: false,
            original_sale_id: None,
            notes: None,
        })
    }

    pub fn quantity_sold(&self, product_id: ProductId) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Move to `next`, enforcing the status lifecycle.
    pub fn transition(&mut self, next: PaymentStatus) -> DomainResult<()> {
        if !self.payment_status.can_transition_to(next) {
            return Err(DomainError::validation(format!(
                "sale cannot move from {:?} to {next:?}",
                self.payment_status
            )));
        }
        self.payment_status = next;
        Ok(())
    }

    /// `PendingPayment → Paid` once `total_paid` covers the total. Returns whether it changed.
    pub fn settle(&mut self, total_paid: Money) -> bool {
        if self.payment_status == PaymentStatus::PendingPayment && total_paid >= self.total_amount {
            self.payment_status = PaymentStatus::Paid;
            return true;
        }
        false
    }
}
