use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderdesk_core::ValueObject;
use orderdesk_core::numeric::lenient;

/// Product identifier as assigned by the catalog backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Normalize an identifier/name for matching: trimmed and lower-cased.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// What an order line knows about its product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: ProductId,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    /// Default unit price offered when the product is added to a new line.
    #[serde(default, with = "lenient")]
    pub price: Option<Decimal>,
    /// Whether `price` already embeds IVA.
    #[serde(default)]
    pub iva_included: bool,
}

impl ValueObject for ProductRef {}

impl ProductRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(id),
            code: None,
            name: name.into(),
            price: None,
            iva_included: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_price(mut self, price: Decimal, iva_included: bool) -> Self {
        self.price = Some(price);
        self.iva_included = iva_included;
        self
    }

    /// Same product: equal ids, or equal codes when both carry one.
    pub fn same_product(&self, other: &ProductRef) -> bool {
        if self.id == other.id {
            return true;
        }
        match (&self.code, &other.code) {
            (Some(a), Some(b)) => normalize_key(a) == normalize_key(b),
            _ => false,
        }
    }

    /// Whether a normalized key designates this product by id or code.
    pub fn matches_identifier(&self, key: &str) -> bool {
        normalize_key(self.id.as_str()) == key
            || self.code.as_deref().is_some_and(|c| normalize_key(c) == key)
    }

    /// Whether a normalized key designates this product by id, code or exact name.
    pub fn matches_key(&self, key: &str) -> bool {
        self.matches_identifier(key) || normalize_key(&self.name) == key
    }
}
