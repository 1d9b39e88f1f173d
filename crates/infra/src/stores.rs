//! Store wiring for the ledger.
//!
//! Every collection the ledger persists, behind the `KeyValueStore` /
//! `AppendLog` traits so a durable backend can replace the in-memory one
//! without touching domain code.

use std::sync::Arc;

use storeledger_core::{
    AppendLog, InMemoryAppendLog, InMemoryStore, KeyValueStore, LayawayId, ProductId, SaleId,
    SupplierOrderId,
};
use storeledger_inventory::{InventoryLogEntry, Product, StockEntry, StockKey};
use storeledger_payments::SalePayment;
use storeledger_purchasing::SupplierOrder;
use storeledger_sales::{Layaway, Sale};

#[derive(Clone)]
pub struct LedgerStores {
    pub products: Arc<dyn KeyValueStore<ProductId, Product>>,
    pub stock: Arc<dyn KeyValueStore<StockKey, StockEntry>>,
    pub inventory_log: Arc<dyn AppendLog<InventoryLogEntry>>,
    pub sales: Arc<dyn KeyValueStore<SaleId, Sale>>,
    pub layaways: Arc<dyn KeyValueStore<LayawayId, Layaway>>,
    pub supplier_orders: Arc<dyn KeyValueStore<SupplierOrderId, SupplierOrder>>,
    pub payments: Arc<dyn AppendLog<SalePayment>>,
}

impl LedgerStores {
    pub fn in_memory() -> Self {
        Self {
            products: Arc::new(InMemoryStore::<ProductId, Product>::new()),
            stock: Arc::new(InMemoryStore::<StockKey, StockEntry>::new()),
            inventory_log: Arc::new(InMemoryAppendLog::<InventoryLogEntry>::new()),
            sales: Arc::new(InMemoryStore::<SaleId, Sale>::new()),
            layaways: Arc::new(InMemoryStore::<LayawayId, Layaway>::new()),
            supplier_orders: Arc::new(InMemoryStore::<SupplierOrderId, SupplierOrder>::new()),
            payments: Arc::new(InMemoryAppendLog::<SalePayment>::new()),
        }
    }
}

impl core::fmt::Debug for LedgerStores {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerStores").finish_non_exhaustive()
    }
}
