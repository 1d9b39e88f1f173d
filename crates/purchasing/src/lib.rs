//! Supplier purchasing: order lifecycle and supplier-side payments.
//!
//! Stock is only touched when an order enters `FullyReceived`; that movement is
//! driven by the transaction processor.

pub mod order;

pub use order::{
    SupplierOrder, SupplierOrderItem, SupplierOrderStatus, SupplierPaymentStatus,
};
