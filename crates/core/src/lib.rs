//! `storeledger-core`: ledger foundation building blocks.
//!
//! Identifiers, money, the domain error model, and the collaborator traits the
//! ledger is wired against (clock, session, storage). No business rules live
//! here.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod session;
pub mod store;
pub mod value_object;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    BranchId, CajaId, ClientId, LayawayId, LogEntryId, PaymentId, ProductId, ReferenceId, SaleId,
    SupplierId, SupplierOrderId, UserId,
};
pub use money::Money;
pub use session::{SessionContext, StaticSession};
pub use store::{AppendLog, InMemoryAppendLog, InMemoryStore, KeyValueStore};
pub use value_object::ValueObject;
