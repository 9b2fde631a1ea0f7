//! `orderdesk-core`: building blocks shared by every engine crate.
//!
//! Pure values only: identifiers, the domain error type and decimal helpers.
//! No IO, no async.

pub mod entity;
pub mod error;
pub mod id;
pub mod numeric;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DocumentId, ItemId, LineId};
pub use numeric::{parse_decimal, round2};
pub use value_object::ValueObject;
