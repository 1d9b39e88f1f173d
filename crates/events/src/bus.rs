//! Event publishing/subscription abstraction (mechanics only).
//!
//! The ledger publishes one notification per committed transaction. The bus is
//! for distribution only: the committed records are the source of truth, and
//! delivery (toasts, emails, push) belongs to whoever subscribes.
//!
//! Delivery is at-least-once and best-effort; consumers must be idempotent.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). Intended for a single consuming thread.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(event) => deliver(event),
///         Err(RecvTimeoutError::Timeout) => continue,
///         Err(RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// TransactionProcessor (commit) → EventBus (publish) → Subscribers
///                                                       ├─ notification delivery
///                                                       └─ reporting caches
/// ```
///
/// `publish()` can fail (closed bus, poisoned lock). Since it runs after the
/// transaction committed, callers log the failure instead of undoing the commit.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
