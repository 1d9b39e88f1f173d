//! Inventory ledger: product catalog, per-branch stock quantities, and the
//! append-only audit log every stock change is written to.

pub mod audit;
pub mod catalog;
pub mod stock;

pub use audit::{InventoryAuditLog, InventoryLogEntry, MovementType, NewLogEntry};
pub use catalog::{Product, ProductCatalog};
pub use stock::{Adjustment, OversellPolicy, StockEntry, StockKey, StockLedger, StockMovement};
