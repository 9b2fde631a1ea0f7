use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderdesk_core::numeric::{lenient, parse_decimal};
use orderdesk_core::{DomainError, Entity, ItemId};

/// One serialized/lotted physical unit (or quantity slice) of an order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Client id; never changes once assigned, doubles as the echo key the
    /// server sends back with its own id.
    pub id: ItemId,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default, rename = "currentQuantity", alias = "quantity", with = "lenient")]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub lot_number: String,
    #[serde(default)]
    pub item_number: String,
    #[serde(default)]
    pub barcode: Option<String>,
    /// Server id of the source item for returns/transformations.
    #[serde(default)]
    pub parent_item: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
}

impl Item {
    /// A fresh client-side item.
    pub fn new(quantity: Option<Decimal>, lot_number: impl Into<String>, item_number: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            server_id: None,
            quantity,
            lot_number: lot_number.into(),
            item_number: item_number.into(),
            barcode: None,
            parent_item: None,
            warehouse: None,
        }
    }

    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Whether the user already typed a quantity into this row.
    pub fn has_user_value(&self) -> bool {
        self.quantity.is_some()
    }

    /// Links back to a source item (return or transformation output).
    pub fn is_derived(&self) -> bool {
        self.parent_item.is_some()
    }

    /// Same logical item: equal client ids, or equal server ids when both
    /// sides carry one.
    pub fn same_entity(&self, other: &Item) -> bool {
        if self.id == other.id {
            return true;
        }
        matches!((&self.server_id, &other.server_id), (Some(a), Some(b)) if a == b)
    }

    /// Apply a single field edit coming from the entry grid.
    pub fn apply_edit(&mut self, field: ItemField, value: &str) {
        match field {
            ItemField::Quantity => self.quantity = parse_decimal(value),
            ItemField::LotNumber => self.lot_number = value.trim().to_string(),
            ItemField::ItemNumber => self.item_number = value.trim().to_string(),
            ItemField::Barcode => self.barcode = non_blank(value),
            ItemField::Warehouse => self.warehouse = non_blank(value),
        }
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Editable item fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemField {
    #[serde(alias = "currentQuantity")]
    Quantity,
    LotNumber,
    ItemNumber,
    Barcode,
    Warehouse,
}

impl FromStr for ItemField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quantity" | "currentQuantity" => Ok(Self::Quantity),
            "lotNumber" | "lot" => Ok(Self::LotNumber),
            "itemNumber" => Ok(Self::ItemNumber),
            "barcode" => Ok(Self::Barcode),
            "warehouse" => Ok(Self::Warehouse),
            other => Err(DomainError::validation(format!("unknown item field: {other}"))),
        }
    }
}

/// Transient entry row: empty quantity, defaults derived from the last real
/// item. Becomes a real [`Item`] with the same id on first edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostItem {
    pub id: ItemId,
    pub lot_number: String,
    pub item_number: String,
}

impl GhostItem {
    pub fn new(lot_number: impl Into<String>, item_number: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            lot_number: lot_number.into(),
            item_number: item_number.into(),
        }
    }

    /// Turn the placeholder into a real item, keeping id and defaults.
    pub fn materialize(self) -> Item {
        Item {
            id: self.id,
            server_id: None,
            quantity: None,
            lot_number: self.lot_number,
            item_number: self.item_number,
            barcode: None,
            parent_item: None,
            warehouse: None,
        }
    }
}

/// A row of the item grid: a real item or the pending ghost.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEntry {
    Real(Item),
    Ghost(GhostItem),
}

impl ItemEntry {
    pub fn id(&self) -> ItemId {
        match self {
            ItemEntry::Real(item) => item.id,
            ItemEntry::Ghost(ghost) => ghost.id,
        }
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self, ItemEntry::Ghost(_))
    }

    pub fn as_real(&self) -> Option<&Item> {
        match self {
            ItemEntry::Real(item) => Some(item),
            ItemEntry::Ghost(_) => None,
        }
    }

    pub fn lot_number(&self) -> &str {
        match self {
            ItemEntry::Real(item) => &item.lot_number,
            ItemEntry::Ghost(ghost) => &ghost.lot_number,
        }
    }

    pub fn item_number(&self) -> &str {
        match self {
            ItemEntry::Real(item) => &item.item_number,
            ItemEntry::Ghost(ghost) => &ghost.item_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_item_uses_current_quantity_and_tolerates_blanks() {
        let json = r#"{
            "id": "01890a5d-ac96-774b-bcce-b302099a8057",
            "serverId": "srv-1",
            "currentQuantity": "",
            "lotNumber": "L7",
            "itemNumber": "3",
            "parentItem": "srv-0"
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.quantity, None);
        assert_eq!(item.lot_number, "L7");
        assert!(item.is_derived());
        assert!(!item.has_user_value());
    }

    #[test]
    fn wire_item_also_reads_plain_quantity() {
        let json = r#"{"id": "01890a5d-ac96-774b-bcce-b302099a8057", "quantity": 4}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.quantity, Some(Decimal::from(4)));
        assert!(item.has_user_value());

        let out = serde_json::to_value(&item).unwrap();
        assert!(out.get("currentQuantity").is_some());
    }

    #[test]
    fn same_entity_matches_on_client_or_server_id() {
        let a = Item::new(None, "", "1").with_server_id("s-1");
        let mut b = Item::new(None, "", "1").with_server_id("s-1");
        assert!(a.same_entity(&b));
        b.server_id = None;
        assert!(!a.same_entity(&b));
        let echo = Item { server_id: Some("s-9".into()), ..a.clone() };
        assert!(a.same_entity(&echo));
    }

    #[test]
    fn quantity_edit_parses_leniently() {
        let mut item = Item::new(None, "", "1");
        item.apply_edit(ItemField::Quantity, "2.5");
        assert_eq!(item.quantity, Some(Decimal::new(25, 1)));
        item.apply_edit(ItemField::Quantity, "dos");
        assert_eq!(item.quantity, None);
        item.apply_edit(ItemField::Barcode, "  ");
        assert_eq!(item.barcode, None);
    }

    #[test]
    fn materialized_ghost_keeps_id_and_defaults() {
        let ghost = GhostItem::new("L1", "4");
        let id = ghost.id;
        let item = ghost.materialize();
        assert_eq!(item.id, id);
        assert_eq!(item.lot_number, "L1");
        assert_eq!(item.item_number, "4");
        assert_eq!(item.quantity, None);
    }

    #[test]
    fn item_field_parses_wire_names() {
        assert_eq!("currentQuantity".parse::<ItemField>().unwrap(), ItemField::Quantity);
        assert_eq!("lot".parse::<ItemField>().unwrap(), ItemField::LotNumber);
        assert!("color".parse::<ItemField>().is_err());
    }
}
