//! Payments applied to sales and layaways.
//!
//! The payment log is the only source of truth for "amount paid"; statuses and
//! balances are derived from it.

pub mod payment;
pub mod reconciler;

pub use payment::{PaymentTarget, SalePayment};
pub use reconciler::{PaymentReceipt, PaymentReconciler};
