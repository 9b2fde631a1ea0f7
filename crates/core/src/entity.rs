//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Order lines and items are entities: a reconciliation pass may rewrite every
/// field of an item, but as long as its id is unchanged it is the same row.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
