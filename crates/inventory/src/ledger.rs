//! Per-line item ledger with a single pending ghost row.

use orderdesk_core::ItemId;

use crate::item::{GhostItem, Item, ItemEntry, ItemField};

/// Ordered item rows of one order line.
///
/// Invariants, upheld by every method:
/// - real items never share an id and keep their insertion order;
/// - at most one [`ItemEntry::Ghost`] exists and it is always the last entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemLedger {
    entries: Vec<ItemEntry>,
    default_lot: String,
}

impl ItemLedger {
    pub fn new(default_lot: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            default_lot: default_lot.into(),
        }
    }

    /// Build a ledger from persisted items. Later duplicates of an id are dropped.
    pub fn from_items(items: impl IntoIterator<Item = Item>, default_lot: impl Into<String>) -> Self {
        let mut ledger = Self::new(default_lot);
        ledger.extend(items);
        ledger
    }

    pub fn default_lot(&self) -> &str {
        &self.default_lot
    }

    pub fn entries(&self) -> &[ItemEntry] {
        &self.entries
    }

    /// Real items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.entries.iter().filter_map(ItemEntry::as_real)
    }

    pub fn into_items(self) -> Vec<Item> {
        self.entries
            .into_iter()
            .filter_map(|e| match e {
                ItemEntry::Real(item) => Some(item),
                ItemEntry::Ghost(_) => None,
            })
            .collect()
    }

    pub fn real_len(&self) -> usize {
        self.items().count()
    }

    pub fn has_items(&self) -> bool {
        self.entries.iter().any(|e| !e.is_ghost())
    }

    pub fn ghost(&self) -> Option<&GhostItem> {
        match self.entries.last() {
            Some(ItemEntry::Ghost(ghost)) => Some(ghost),
            _ => None,
        }
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items().find(|item| item.id == id)
    }

    pub fn contains(&self, item: &Item) -> bool {
        self.items().any(|existing| existing.same_entity(item))
    }

    /// Make sure an entry row is available and return it.
    ///
    /// - no entries: a fresh ghost numbered `"1"` on the default lot;
    /// - last entry is a real item with a quantity: a new ghost numbered one
    ///   past it, on the same lot;
    /// - last entry is the ghost, or a real item still without quantity: that
    ///   entry is returned unchanged.
    pub fn append_ghost(&mut self) -> &ItemEntry {
        let next = match self.entries.last() {
            None => Some(GhostItem::new(self.default_lot.clone(), "1")),
            Some(ItemEntry::Real(last)) if last.has_user_value() => {
                let lot = if last.lot_number.is_empty() {
                    self.default_lot.clone()
                } else {
                    last.lot_number.clone()
                };
                Some(GhostItem::new(lot, next_item_number(&last.item_number)))
            }
            Some(_) => None,
        };
        if let Some(ghost) = next {
            self.entries.push(ItemEntry::Ghost(ghost));
        }
        // An entry was either present or just pushed.
        &self.entries[self.entries.len() - 1]
    }

    /// Edit a field of the ghost row, materializing it into a real item that
    /// keeps the ghost's id.
    ///
    /// If the id already denotes a real item (the ghost was consumed by an
    /// earlier keystroke) the edit lands on that item. If the id is unknown,
    /// typically because a removal raced the edit, nothing happens.
    pub fn commit_ghost(&mut self, ghost_id: ItemId, field: ItemField, value: &str) -> Option<&Item> {
        self.edit_item(ghost_id, field, value)
    }

    /// Edit a field of any entry; ghosts are materialized first.
    pub fn edit_item(&mut self, id: ItemId, field: ItemField, value: &str) -> Option<&Item> {
        let idx = self.entries.iter().position(|e| e.id() == id)?;
        if let ItemEntry::Ghost(ghost) = &self.entries[idx] {
            let item = ghost.clone().materialize();
            self.entries[idx] = ItemEntry::Real(item);
        }
        match &mut self.entries[idx] {
            ItemEntry::Real(item) => {
                item.apply_edit(field, value);
                Some(&*item)
            }
            ItemEntry::Ghost(_) => None,
        }
    }

    /// Remove an entry by id. Removing an absent id is a no-op.
    pub fn remove_item(&mut self, id: ItemId) -> Option<ItemEntry> {
        let idx = self.entries.iter().position(|e| e.id() == id)?;
        Some(self.entries.remove(idx))
    }

    /// Remove the real item denoting the same logical entity as `item`.
    pub fn remove_matching(&mut self, item: &Item) -> Option<Item> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.as_real().is_some_and(|existing| existing.same_entity(item)))?;
        match self.entries.remove(idx) {
            ItemEntry::Real(removed) => Some(removed),
            ItemEntry::Ghost(_) => None,
        }
    }

    /// Insert an item at the front unless the same logical item is present.
    ///
    /// When the item is already present without a server id, the incoming
    /// server id is adopted so later echoes keep matching.
    pub fn prepend(&mut self, item: Item) -> bool {
        if self.merge_identity(&item) {
            return false;
        }
        self.entries.insert(0, ItemEntry::Real(item));
        true
    }

    /// Append an item before the ghost unless the same logical item is present.
    pub fn push(&mut self, item: Item) -> bool {
        if self.merge_identity(&item) {
            return false;
        }
        let at = if self.ghost().is_some() {
            self.entries.len() - 1
        } else {
            self.entries.len()
        };
        self.entries.insert(at, ItemEntry::Real(item));
        true
    }

    /// Append several items; returns how many were actually inserted.
    pub fn extend(&mut self, items: impl IntoIterator<Item = Item>) -> usize {
        let mut inserted = 0;
        for item in items {
            if self.push(item) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Number for an item appended after the last real one.
    pub fn next_item_number(&self) -> String {
        match self.items().last() {
            Some(last) => next_item_number(&last.item_number),
            None => "1".to_string(),
        }
    }

    /// Record the server id the Document Store assigned to a client item.
    pub fn adopt_server_id(&mut self, id: ItemId, server_id: impl Into<String>) -> bool {
        let server_id = server_id.into();
        for entry in &mut self.entries {
            if let ItemEntry::Real(item) = entry {
                if item.id == id {
                    item.server_id = Some(server_id);
                    return true;
                }
            }
        }
        false
    }

    /// Drop the ghost row, e.g. before building a persistence patch.
    pub fn clear_ghost(&mut self) -> Option<GhostItem> {
        match self.entries.last() {
            Some(ItemEntry::Ghost(_)) => match self.entries.pop() {
                Some(ItemEntry::Ghost(ghost)) => Some(ghost),
                _ => None,
            },
            _ => None,
        }
    }

    fn merge_identity(&mut self, incoming: &Item) -> bool {
        for entry in &mut self.entries {
            if let ItemEntry::Real(existing) = entry {
                if existing.same_entity(incoming) {
                    if existing.server_id.is_none() {
                        existing.server_id = incoming.server_id.clone();
                    }
                    return true;
                }
            }
        }
        false
    }
}

/// `"7"` -> `"8"`; leading digits only. Anything else, including a number
/// too large to increment, restarts at `"1"`.
fn next_item_number(last: &str) -> String {
    let digits: String = last.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u64>() {
        Ok(n) => n.checked_add(1).map_or_else(|| "1".to_string(), |next| next.to_string()),
        Err(_) => "1".to_string(),
    }
}
