//! Product references and catalog resolution.
//!
//! The engine never owns products; it holds lightweight references resolved
//! from the order itself, from an already fetched catalog page, or through the
//! asynchronous [`CatalogLookup`] collaborator.

pub mod catalog;
pub mod product;

pub use catalog::{CatalogError, CatalogLookup, CatalogPage, InMemoryCatalog};
pub use product::{ProductId, ProductRef, normalize_key};
