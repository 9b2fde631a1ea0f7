use crate::{Event, EventEnvelope};

/// Folds pushed events into local state.
///
/// Implementations must be **idempotent**: the same envelope can arrive twice
/// (redelivery) or after the local optimistic update already made the change.
/// Applying it again must leave the state unchanged.
///
/// `apply` does not return errors. An event that no longer matches local state
/// (line gone, item already removed) is a no-op, never a failure.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to local state.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
