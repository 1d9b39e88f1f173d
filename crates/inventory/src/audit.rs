//! Inventory audit log: the immutable record of every stock change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeledger_core::{
    AppendLog, BranchId, Clock, DomainError, DomainResult, Entity, LogEntryId, ProductId,
    ReferenceId, UserId,
};

/// What kind of business event moved the stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    SaleAtPos,
    SaleOnline,
    SupplierReception,
    Return,
    ManualAdjustment,
    TransferOut,
    TransferIn,
    /// Layaway reservation, when the dedicated tag is enabled.
    Layaway,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::SaleAtPos => "sale_at_pos",
            MovementType::SaleOnline => "sale_online",
            MovementType::SupplierReception => "supplier_reception",
            MovementType::Return => "return",
            MovementType::ManualAdjustment => "manual_adjustment",
            MovementType::TransferOut => "transfer_out",
            MovementType::TransferIn => "transfer_in",
            MovementType::Layaway => "layaway",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record of one stock adjustment.
///
/// `quantity_change` is the effective change (`stock_after - stock_before`);
/// `requested_change` is what the caller asked for. They differ only when an
/// oversell was clamped at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: LogEntryId,
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub timestamp: DateTime<Utc>,
    pub movement_type: MovementType,
    pub quantity_change: i64,
    pub requested_change: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reference_id: ReferenceId,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

impl InventoryLogEntry {
    pub fn was_clamped(&self) -> bool {
        self.quantity_change != self.requested_change
    }
}

impl Entity for InventoryLogEntry {
    type Id = LogEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Entry as submitted to the log; id and timestamp are assigned when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub id: Option<LogEntryId>,
    pub timestamp: Option<DateTime<Utc>>,
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub movement_type: MovementType,
    pub requested_change: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reference_id: ReferenceId,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

/// Write-once, read-many audit log over an injected append-only store.
#[derive(Clone)]
pub struct InventoryAuditLog {
    entries: Arc<dyn AppendLog<InventoryLogEntry>>,
    clock: Arc<dyn Clock>,
}

impl InventoryAuditLog {
    pub fn new(entries: Arc<dyn AppendLog<InventoryLogEntry>>, clock: Arc<dyn Clock>) -> Self {
        Self { entries, clock }
    }

    /// Append an entry, assigning id and timestamp if absent.
    pub fn append(&self, entry: NewLogEntry) -> DomainResult<InventoryLogEntry> {
        if entry.stock_after < 0 || entry.stock_before < 0 {
            return Err(DomainError::invariant("stock levels in the log cannot be negative"));
        }

        let stored = InventoryLogEntry {
            id: entry.id.unwrap_or_else(LogEntryId::new),
            product_id: entry.product_id,
            branch_id: entry.branch_id,
            timestamp: entry.timestamp.unwrap_or_else(|| self.clock.now()),
            movement_type: entry.movement_type,
            quantity_change: entry.stock_after - entry.stock_before,
            requested_change: entry.requested_change,
            stock_before: entry.stock_before,
            stock_after: entry.stock_after,
            reference_id: entry.reference_id,
            actor_id: entry.actor_id,
            notes: entry.notes,
        };

        self.entries.append(stored.clone())?;
        Ok(stored)
    }

    pub fn query_by_product(&self, product_id: ProductId) -> DomainResult<Vec<InventoryLogEntry>> {
        self.entries.filter(&|e| e.product_id == product_id)
    }

    pub fn query_by_reference(
        &self,
        reference_id: ReferenceId,
    ) -> DomainResult<Vec<InventoryLogEntry>> {
        self.entries.filter(&|e| e.reference_id == reference_id)
    }

    /// The full trace of one (product, branch) stock entry, in adjustment order.
    pub fn query_by_stock(
        &self,
        product_id: ProductId,
        branch_id: BranchId,
    ) -> DomainResult<Vec<InventoryLogEntry>> {
        self.entries
            .filter(&|e| e.product_id == product_id && e.branch_id == branch_id)
    }

    pub fn all(&self) -> DomainResult<Vec<InventoryLogEntry>> {
        self.entries.all()
    }

    pub fn len(&self) -> DomainResult<usize> {
        self.entries.len()
    }

    pub fn is_empty(&self) -> DomainResult<bool> {
        self.entries.is_empty()
    }
}

impl core::fmt::Debug for InventoryAuditLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryAuditLog").finish_non_exhaustive()
    }
}
