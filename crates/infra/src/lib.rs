//! Infrastructure around the engine: the Document Store seam, engine
//! configuration and the per-view document session.

pub mod config;
pub mod document_store;
pub mod session;

pub use config::EngineConfig;
pub use document_store::{
    DocumentStore, InMemoryDocumentStore, ItemIdentity, OrderSnapshot, StoreError,
};
pub use session::{DocumentSession, SessionError};
