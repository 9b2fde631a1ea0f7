//! Serialized/lotted items and the per-line item ledger.
//!
//! Pure domain logic: no IO, no async. The ledger keeps the item rows of one
//! order line stable while the user types, including the single trailing
//! "ghost" row used for inline entry.

pub mod item;
pub mod ledger;

pub use item::{GhostItem, Item, ItemEntry, ItemField};
pub use ledger::ItemLedger;
