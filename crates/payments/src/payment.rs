use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeledger_core::{Entity, LayawayId, Money, PaymentId, ReferenceId, SaleId};
use storeledger_sales::PaymentMethod;

/// What a payment is applied to. Exactly one owner per payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PaymentTarget {
    Sale(SaleId),
    Layaway(LayawayId),
}

impl PaymentTarget {
    pub fn reference_id(&self) -> ReferenceId {
        match self {
            PaymentTarget::Sale(id) => (*id).into(),
            PaymentTarget::Layaway(id) => (*id).into(),
        }
    }
}

impl core::fmt::Display for PaymentTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PaymentTarget::Sale(id) => write!(f, "sale {id}"),
            PaymentTarget::Layaway(id) => write!(f, "layaway {id}"),
        }
    }
}

/// An applied payment. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePayment {
    pub id: PaymentId,
    pub target: PaymentTarget,
    pub payment_date: DateTime<Utc>,
    pub amount_paid: Money,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl Entity for SalePayment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
