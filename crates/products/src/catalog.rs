//! Catalog resolution seam.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::product::{ProductRef, normalize_key};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("catalog returned malformed product: {0}")]
    Malformed(String),
}

/// Resolves a product by id, code, or exact name.
///
/// Timeouts and retries belong to the implementation; callers treat an error
/// as a miss.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn find_product(
        &self,
        identifier_or_name: &str,
    ) -> Result<Option<ProductRef>, CatalogError>;
}

#[async_trait]
impl<C> CatalogLookup for Arc<C>
where
    C: CatalogLookup + ?Sized,
{
    async fn find_product(
        &self,
        identifier_or_name: &str,
    ) -> Result<Option<ProductRef>, CatalogError> {
        (**self).find_product(identifier_or_name).await
    }
}

/// A page of products the UI already fetched (search results, pickers).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPage {
    products: Vec<ProductRef>,
}

impl CatalogPage {
    pub fn new(products: Vec<ProductRef>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> &[ProductRef] {
        &self.products
    }

    /// First product matching a normalized key.
    pub fn find(&self, key: &str) -> Option<&ProductRef> {
        self.products.iter().find(|p| p.matches_key(key))
    }
}

/// In-memory catalog for tests/dev. Counts lookups so callers can assert that
/// local matches short-circuited the remote path.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: Vec<ProductRef>,
    lookups: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<ProductRef>) -> Self {
        Self {
            products,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn find_product(
        &self,
        identifier_or_name: &str,
    ) -> Result<Option<ProductRef>, CatalogError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let key = normalize_key(identifier_or_name);
        Ok(self.products.iter().find(|p| p.matches_key(&key)).cloned())
    }
}
