use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeledger_core::{
    BranchId, ClientId, DomainError, DomainResult, Entity, LayawayId, Money, UserId,
};

use crate::cart::{CartLine, gross_total, validate_cart};

/// `Active → Completed | Cancelled`; both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayawayStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayawayDraft {
    pub lines: Vec<CartLine>,
    pub client_id: ClientId,
    pub branch_id: BranchId,
    pub employee_id: UserId,
}

/// Goods reserved for a client and paid off over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layaway {
    pub id: LayawayId,
    pub date: DateTime<Utc>,
    pub client_id: ClientId,
    pub branch_id: BranchId,
    pub employee_id: UserId,
    pub lines: Vec<CartLine>,
    pub total_amount: Money,
    pub status: LayawayStatus,
}

impl Entity for Layaway {
    type Id = LayawayId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Layaway {
    /// Open an active layaway. The total is Σ unit price × quantity; line
    /// discounts are not applied to layaways.
    pub fn open(id: LayawayId, date: DateTime<Utc>, draft: LayawayDraft) -> DomainResult<Self> {
        validate_cart(&draft.lines)?;

        Ok(Self {
            id,
            date,
            client_id: draft.client_id,
            branch_id: draft.branch_id,
            employee_id: draft.employee_id,
            total_amount: gross_total(&draft.lines),
            lines: draft.lines,
            status: LayawayStatus::Active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == LayawayStatus::Active
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::validation(format!(
                "layaway {} is {:?}, not active",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Outstanding amount given what has been paid so far.
    pub fn balance(&self, total_paid: Money) -> Money {
        self.total_amount - total_paid
    }

    /// Mark completed. Whether the balance is settled is the caller's check.
    pub fn complete(&mut self) -> DomainResult<()> {
        self.ensure_active()?;
        self.status = LayawayStatus::Completed;
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.ensure_active()?;
        self.status = LayawayStatus::Cancelled;
        Ok(())
    }
}
