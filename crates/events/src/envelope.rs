use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orderdesk_core::DocumentId;

/// Envelope for a pushed event, keyed by the document it concerns.
///
/// Notes:
/// - Consumers bound to one document drop envelopes for any other document.
/// - `sequence_number` is informational; ordering is not relied upon, which is
///   why every consumer must be idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    document_id: DocumentId,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        document_id: DocumentId,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            document_id,
            sequence_number,
            payload,
        }
    }

    /// Wrap a payload with a fresh event id.
    pub fn for_document(document_id: DocumentId, sequence_number: u64, payload: E) -> Self {
        Self::new(Uuid::now_v7(), document_id, sequence_number, payload)
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
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
