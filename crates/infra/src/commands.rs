//! Requests accepted by the transaction processor.

use serde::{Deserialize, Serialize};

use storeledger_core::{
    BranchId, CajaId, ClientId, Money, ProductId, ReferenceId, SaleId, SupplierId, UserId,
};
use storeledger_inventory::InventoryLogEntry;
use storeledger_sales::{CartLine, PaymentMethod, ReturnLine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReturn {
    pub original_sale_id: SaleId,
    pub lines: Vec<ReturnLine>,
    pub employee_id: UserId,
    pub caja_id: CajaId,
    pub branch_id: BranchId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayaway {
    pub lines: Vec<CartLine>,
    pub client_id: ClientId,
    pub branch_id: BranchId,
    pub employee_id: UserId,
    /// Zero books no payment.
    pub initial_payment: Money,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub unit_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSupplierOrder {
    pub supplier_id: SupplierId,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub product_id: ProductId,
    pub from_branch: BranchId,
    pub to_branch: BranchId,
    pub quantity: i64,
    pub notes: Option<String>,
}

/// Both legs of a transfer, linked by one reference id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockTransfer {
    pub reference_id: ReferenceId,
    pub outbound: InventoryLogEntry,
    pub inbound: InventoryLogEntry,
}
