use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storeledger_core::ReferenceId;

/// Envelope for a published event.
///
/// - `correlation_id` is the transaction (sale, layaway, order, ...) the event is about.
/// - `sequence_number` is monotonically increasing per publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    correlation_id: ReferenceId,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        correlation_id: ReferenceId,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            correlation_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn correlation_id(&self) -> ReferenceId {
        self.correlation_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
