use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderdesk_core::numeric::lenient;
use orderdesk_core::{DocumentId, DomainError, DomainResult, ItemId, LineId};
use orderdesk_inventory::{Item, ItemLedger};
use orderdesk_products::{ProductId, ProductRef};

use crate::line::{LineList, OrderLine};

/// Document lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    #[default]
    Draft,
    Confirmed,
    Completed,
}

impl DocumentState {
    fn rank(self) -> u8 {
        match self {
            DocumentState::Draft => 0,
            DocumentState::Confirmed => 1,
            DocumentState::Completed => 2,
        }
    }

    /// `next` is the same state or a later one.
    pub fn allows(self, next: DocumentState) -> bool {
        next.rank() >= self.rank()
    }

    /// Move to `next`, refusing to go backwards.
    pub fn advance(self, next: DocumentState) -> DomainResult<DocumentState> {
        if self.allows(next) {
            Ok(next)
        } else {
            Err(DomainError::invariant(format!(
                "document state cannot go back from {self:?} to {next:?}"
            )))
        }
    }

    pub fn is_draft(self) -> bool {
        matches!(self, DocumentState::Draft)
    }
}

/// The in-memory document a view edits.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDocument {
    pub id: DocumentId,
    pub state: DocumentState,
    pub lines: LineList,
}

impl OrderDocument {
    pub fn new(id: DocumentId, default_lot: impl Into<String>) -> Self {
        Self {
            id,
            state: DocumentState::Draft,
            lines: LineList::new(default_lot),
        }
    }

    /// Rebuild from stored lines.
    pub fn from_records(
        id: DocumentId,
        state: DocumentState,
        records: Vec<LineRecord>,
        default_lot: impl Into<String>,
    ) -> Self {
        let default_lot = default_lot.into();
        let lines = records
            .into_iter()
            .map(|record| record.into_line(&default_lot))
            .collect();
        Self {
            id,
            state,
            lines: LineList::from_lines(lines, default_lot),
        }
    }

    /// Patch carrying the current lines; ghost lines and ghost items are left out.
    pub fn to_patch(&self) -> OrderPatch {
        OrderPatch {
            state: None,
            lines: Some(
                self.lines
                    .product_lines()
                    .filter_map(WireLine::from_line)
                    .collect(),
            ),
        }
    }
}

/// A line as persisted by the Document Store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRecord {
    /// Missing for lines created by other clients before ids were assigned.
    #[serde(default)]
    pub id: Option<LineId>,
    #[serde(default)]
    pub product: Option<ProductRef>,
    #[serde(default, with = "lenient")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub iva_included: bool,
    #[serde(default, with = "lenient")]
    pub invoice_percentage: Option<Decimal>,
    #[serde(default, with = "lenient")]
    pub requested_quantity: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl LineRecord {
    pub fn into_line(self, default_lot: &str) -> OrderLine {
        OrderLine {
            id: self.id.unwrap_or_default(),
            product: self.product,
            price: self.price,
            iva_included: self.iva_included,
            invoice_percentage: self.invoice_percentage,
            requested_quantity: self.requested_quantity,
            items: ItemLedger::from_items(self.items, default_lot),
        }
    }

    pub fn from_line(line: &OrderLine) -> Self {
        Self {
            id: Some(line.id),
            product: line.product.clone(),
            price: line.price,
            iva_included: line.iva_included,
            invoice_percentage: line.invoice_percentage,
            requested_quantity: line.requested_quantity,
            items: line.items.items().cloned().collect(),
        }
    }
}

/// Item shape sent to the Document Store in an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    /// Server id when known, otherwise the client id.
    pub id: String,
    /// Client id, echoed back by the store so the item can be matched.
    pub echo_key: ItemId,
    #[serde(default, with = "lenient")]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub lot: String,
    #[serde(default)]
    pub item_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
}

impl From<&Item> for WireItem {
    fn from(item: &Item) -> Self {
        Self {
            id: item
                .server_id
                .clone()
                .unwrap_or_else(|| item.id.to_string()),
            echo_key: item.id,
            quantity: item.quantity,
            lot: item.lot_number.clone(),
            item_number: item.item_number.clone(),
            parent_item: item.parent_item.clone(),
            warehouse: item.warehouse.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLine {
    pub id: LineId,
    pub product: ProductId,
    #[serde(default, with = "lenient")]
    pub price: Option<Decimal>,
    pub iva_included: bool,
    #[serde(default, with = "lenient")]
    pub invoice_percentage: Option<Decimal>,
    #[serde(default, with = "lenient")]
    pub requested_quantity: Option<Decimal>,
    pub items: Vec<WireItem>,
}

impl WireLine {
    /// `None` for lines without a product.
    pub fn from_line(line: &OrderLine) -> Option<Self> {
        let product = line.product_id()?.clone();
        Some(Self {
            id: line.id,
            product,
            price: line.price,
            iva_included: line.iva_included,
            invoice_percentage: line.invoice_percentage,
            requested_quantity: line.requested_quantity,
            items: line.items.items().map(WireItem::from).collect(),
        })
    }
}

/// Partial update of a stored order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DocumentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<WireLine>>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.lines.is_none()
    }

    pub fn with_state(mut self, state: DocumentState) -> Self {
        self.state = Some(state);
        self
    }
}
