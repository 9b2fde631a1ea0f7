use orderdesk_core::DocumentId;

use crate::EventEnvelope;

/// Messages that belong to exactly one order document.
///
/// A document view subscribes to the shared event source and uses this to drop
/// anything addressed to a document it is no longer showing.
pub trait DocumentScoped {
    fn document_id(&self) -> &DocumentId;

    fn is_for(&self, document_id: &DocumentId) -> bool {
        self.document_id() == document_id
    }
}

impl<E> DocumentScoped for EventEnvelope<E> {
    fn document_id(&self) -> &DocumentId {
        EventEnvelope::document_id(self)
    }
}
