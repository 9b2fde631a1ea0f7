//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity; two instances with equal fields are
/// interchangeable. Tax rules, product references and import rows are value
/// objects. Order lines and items are not (see [`crate::Entity`]).
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Rate(Decimal);
///
/// impl ValueObject for Rate {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
