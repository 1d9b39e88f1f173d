//! Infrastructure layer: configuration, store wiring and the transaction
//! processor that ties the ledger components together.

pub mod commands;
pub mod config;
pub mod processor;
pub mod stores;

mod integration_tests;

pub use crate::commands::{
    CreateSupplierOrder, OrderItemRequest, ProcessReturn, RecordLayaway, StockTransfer,
    TransferStock,
};
pub use crate::config::{ConfigError, LayawayTag, LedgerConfig};
pub use crate::processor::{NotificationEnvelope, TransactionProcessor};
pub use crate::stores::LedgerStores;
