//! Event plumbing for server-pushed document notifications.
//!
//! Mechanics only: the concrete notification payloads live next to the order
//! model (`orderdesk-orders`), the transport lives outside the engine.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod scope;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use scope::DocumentScoped;
