//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus stands in for the realtime event source: the backend pushes
//! item-added / item-removed / document-updated notifications and every open
//! document view receives a copy.
//!
//! Delivery is **at-least-once** and unordered across publishers. The acting
//! client usually receives its own change back after it already applied it
//! optimistically, so consumers must be idempotent.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created. Dropping the subscription unsubscribes: the bus prunes the dead
/// sender on its next publish.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// for envelope in subscription.try_iter() {
///     view.apply(&envelope);
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

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every message that is already queued, without blocking.
    pub fn try_iter(&self) -> impl Iterator<Item = M> + '_ {
        self.receiver.try_iter()
    }
}

/// Transport-agnostic pub/sub.
///
/// `publish()` may fail (bus closed, lock poisoned); the error is surfaced to
/// the caller. The trait requires `Send + Sync` so one bus can be shared by
/// every open view.
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
