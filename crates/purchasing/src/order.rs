use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeledger_core::{
    BranchId, DomainError, DomainResult, Entity, Money, ProductId, SupplierId, SupplierOrderId,
};

/// Supplier order status lifecycle.
///
/// ```text
/// Draft → Ordered → Shipped → PartiallyReceived → FullyReceived
///   │        │  └──────┴──────────────────────────↗
///   └────────┴──────────┴→ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplierOrderStatus {
    Draft,
    Ordered,
    Shipped,
    PartiallyReceived,
    FullyReceived,
    Cancelled,
}

impl SupplierOrderStatus {
    pub fn can_transition_to(self, next: SupplierOrderStatus) -> bool {
        use SupplierOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Ordered | Cancelled)
                | (Ordered, Shipped | PartiallyReceived | FullyReceived | Cancelled)
                | (Shipped, PartiallyReceived | FullyReceived | Cancelled)
                | (PartiallyReceived, FullyReceived)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SupplierOrderStatus::FullyReceived | SupplierOrderStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplierPaymentStatus {
    Unpaid,
    PartiallyPaid,
    FullyPaid,
}

impl SupplierPaymentStatus {
    pub fn derive(total_cost: Money, amount_paid: Money) -> Self {
        if amount_paid >= total_cost {
            SupplierPaymentStatus::FullyPaid
        } else if amount_paid.is_positive() {
            SupplierPaymentStatus::PartiallyPaid
        } else {
            SupplierPaymentStatus::Unpaid
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOrderItem {
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub unit_cost: Money,
    /// Copied from the catalog when the order is created.
    pub is_service: bool,
}

impl SupplierOrderItem {
    pub fn line_cost(&self) -> Money {
        self.unit_cost * self.quantity_ordered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOrder {
    pub id: SupplierOrderId,
    pub supplier_id: SupplierId,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SupplierOrderItem>,
    pub status: SupplierOrderStatus,
    /// Fixed at creation.
    pub total_cost: Money,
    pub amount_paid: Money,
    pub payment_status: SupplierPaymentStatus,
    pub received_at: Option<DateTime<Utc>>,
    pub received_branch: Option<BranchId>,
}

impl Entity for SupplierOrder {
    type Id = SupplierOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SupplierOrder {
    /// New draft order; total cost is Σ quantity ordered × unit cost.
    pub fn create(
        id: SupplierOrderId,
        supplier_id: SupplierId,
        created_at: DateTime<Utc>,
        items: Vec<SupplierOrderItem>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "supplier order needs at least one item",
            ));
        }
        for item in &items {
            if item.quantity_ordered <= 0 {
                return Err(DomainError::validation("quantity_ordered must be positive"));
            }
            if item.unit_cost.is_negative() {
                return Err(DomainError::validation("unit_cost cannot be negative"));
            }
        }

        let line_costs = items
            .iter()
            .map(|item| item.unit_cost.checked_mul(item.quantity_ordered))
            .collect::<DomainResult<Vec<_>>>()?;
        let total_cost = Money::checked_sum(line_costs)?;

        Ok(Self {
            id,
            supplier_id,
            created_at,
            items,
            status: SupplierOrderStatus::Draft,
            total_cost,
            amount_paid: Money::ZERO,
            payment_status: SupplierPaymentStatus::derive(total_cost, Money::ZERO),
            received_at: None,
            received_branch: None,
        })
    }

    pub fn ensure_transition(&self, next: SupplierOrderStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::validation(format!(
                "supplier order {} cannot move from {:?} to {next:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn transition(&mut self, next: SupplierOrderStatus) -> DomainResult<()> {
        self.ensure_transition(next)?;
        self.status = next;
        Ok(())
    }

    /// Transition into `FullyReceived`, recording where and when.
    pub fn mark_received(&mut self, branch_id: BranchId, at: DateTime<Utc>) -> DomainResult<()> {
        self.transition(SupplierOrderStatus::FullyReceived)?;
        self.received_branch = Some(branch_id);
        self.received_at = Some(at);
        Ok(())
    }

    /// Items that move stock on reception.
    pub fn stocked_items(&self) -> impl Iterator<Item = &SupplierOrderItem> {
        self.items.iter().filter(|i| !i.is_service)
    }

    pub fn outstanding(&self) -> Money {
        (self.total_cost - self.amount_paid).non_negative()
    }

    pub fn ensure_payment(&self, amount: Money) -> DomainResult<()> {
        if !amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if self.status == SupplierOrderStatus::Cancelled {
            return Err(DomainError::validation("cannot pay a cancelled supplier order"));
        }
        if amount > self.outstanding() {
            return Err(DomainError::validation(format!(
                "payment of {amount} exceeds outstanding {}",
                self.outstanding()
            )));
        }
        Ok(())
    }

    pub fn record_payment(&mut self, amount: Money) -> DomainResult<SupplierPaymentStatus> {
        self.ensure_payment(amount)?;
        self.amount_paid += amount;
        self.payment_status = SupplierPaymentStatus::derive(self.total_cost, self.amount_paid);
        Ok(self.payment_status)
    }
}
