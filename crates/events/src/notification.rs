//! Notifications emitted after each committed stock-affecting transaction.
//!
//! The ledger only builds title + message + correlation link; rendering and
//! delivery belong to the notification collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeledger_core::{LayawayId, Money, ReferenceId, SaleId, SupplierOrderId};

use crate::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SaleCompleted,
    ReturnProcessed,
    LayawayCreated,
    SupplierOrderReceived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// In-app route to the record the notification is about.
    pub link: String,
    pub correlation_id: ReferenceId,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerNotification {
    pub fn sale_completed(sale_id: SaleId, total: Money, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::SaleCompleted,
            title: "Sale completed".to_string(),
            message: format!("Sale {sale_id} recorded for {total}"),
            link: format!("/sales/{sale_id}"),
            correlation_id: sale_id.into(),
            occurred_at,
        }
    }

    pub fn return_processed(
        return_id: SaleId,
        original_sale_id: SaleId,
        refund: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: NotificationKind::ReturnProcessed,
            title: "Return processed".to_string(),
            message: format!("Refund of {refund} against sale {original_sale_id}"),
            link: format!("/sales/{return_id}"),
            correlation_id: return_id.into(),
            occurred_at,
        }
    }

    pub fn layaway_created(layaway_id: LayawayId, total: Money, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::LayawayCreated,
            title: "Layaway created".to_string(),
            message: format!("Layaway {layaway_id} opened for {total}"),
            link: format!("/layaways/{layaway_id}"),
            correlation_id: layaway_id.into(),
            occurred_at,
        }
    }

    pub fn supplier_order_received(
        order_id: SupplierOrderId,
        item_count: usize,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: NotificationKind::SupplierOrderReceived,
            title: "Supplier order received".to_string(),
            message: format!("Order {order_id} received ({item_count} items stocked)"),
            link: format!("/purchases/{order_id}"),
            correlation_id: order_id.into(),
            occurred_at,
        }
    }
}

impl Event for LedgerNotification {
    fn event_type(&self) -> &'static str {
        match self.kind {
            NotificationKind::SaleCompleted => "ledger.sale.completed",
            NotificationKind::ReturnProcessed => "ledger.return.processed",
            NotificationKind::LayawayCreated => "ledger.layaway.created",
            NotificationKind::SupplierOrderReceived => "ledger.supplier_order.received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
