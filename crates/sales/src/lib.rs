//! Point-of-sale records: carts, sales, returns and layaways.
//!
//! Pure domain logic (no IO, no storage); the transaction processor persists
//! these records and drives stock movements from them.

pub mod cart;
pub mod layaway;
pub mod returns;
pub mod sale;

pub use cart::{CartLine, Discount, cart_total, gross_total, validate_cart};
pub use layaway::{Layaway, LayawayDraft, LayawayStatus};
pub use returns::{ReturnContext, ReturnLine, ReturnPlan, plan_return};
pub use sale::{PaymentMethod, PaymentStatus, Sale, SaleDraft};
