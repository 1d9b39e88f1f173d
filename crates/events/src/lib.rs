//! Ledger events: the event contract, envelopes, and the pub/sub mechanics used
//! to hand notifications to the delivery collaborator.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::{LedgerNotification, NotificationKind};
