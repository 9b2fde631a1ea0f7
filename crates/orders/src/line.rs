use rust_decimal::Decimal;

use orderdesk_core::{Entity, ItemId, LineId, round2};
use orderdesk_inventory::{Item, ItemField, ItemLedger};
use orderdesk_products::{ProductId, ProductRef};

/// One product row of an order document.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub id: LineId,
    pub product: Option<ProductRef>,
    /// Unit price; `None` when the user cleared it or typed junk.
    pub price: Option<Decimal>,
    pub iva_included: bool,
    /// Share of the quantity that is invoiced, 0–100. `None` means 100.
    pub invoice_percentage: Option<Decimal>,
    pub requested_quantity: Option<Decimal>,
    pub items: ItemLedger,
}

impl OrderLine {
    /// A fresh entry row with no product and no items.
    pub fn ghost(default_lot: impl Into<String>) -> Self {
        Self {
            id: LineId::new(),
            product: None,
            price: None,
            iva_included: false,
            invoice_percentage: None,
            requested_quantity: None,
            items: ItemLedger::new(default_lot),
        }
    }

    /// A new line for `product`, priced with the product's defaults.
    pub fn for_product(product: ProductRef, default_lot: impl Into<String>) -> Self {
        let mut line = Self::ghost(default_lot);
        line.set_product(product);
        line
    }

    /// No product and no real items.
    pub fn is_ghost(&self) -> bool {
        self.product.is_none() && !self.items.has_items()
    }

    pub fn product_id(&self) -> Option<&ProductId> {
        self.product.as_ref().map(|p| &p.id)
    }

    /// Attach a product. Price and IVA flag are only defaulted when the line
    /// has no price of its own yet.
    pub fn set_product(&mut self, product: ProductRef) {
        if self.price.is_none() {
            self.price = product.price;
            self.iva_included = product.iva_included;
        }
        self.product = Some(product);
    }

    pub fn same_product(&self, other: &ProductRef) -> bool {
        self.product.as_ref().is_some_and(|p| p.same_product(other))
    }

    /// `round2` of the summed item quantities; empty quantities count as zero.
    /// A sum beyond the decimal range saturates.
    pub fn confirmed_quantity(&self) -> Decimal {
        let sum = self
            .items
            .items()
            .filter_map(|item| item.quantity)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        round2(sum)
    }

    /// Fold `other` (same product) into this line.
    ///
    /// Items are concatenated, skipping ids already present. Price and
    /// requested quantity keep this line's value unless it is empty.
    fn absorb(&mut self, other: OrderLine) {
        if self.price.is_none() && other.price.is_some() {
            self.price = other.price;
            self.iva_included = other.iva_included;
        }
        if self.requested_quantity.is_none() {
            self.requested_quantity = other.requested_quantity;
        }
        if self.invoice_percentage.is_none() {
            self.invoice_percentage = other.invoice_percentage;
        }
        self.items.extend(other.items.into_items());
    }
}

impl Entity for OrderLine {
    type Id = LineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Ordered lines of a document.
///
/// After every public mutation:
/// - no two lines carry the same product;
/// - at most one ghost line exists, and only at the tail.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineList {
    lines: Vec<OrderLine>,
    default_lot: String,
}

impl LineList {
    pub fn new(default_lot: impl Into<String>) -> Self {
        Self {
            lines: Vec::new(),
            default_lot: default_lot.into(),
        }
    }

    /// Build from persisted lines, restoring both invariants.
    pub fn from_lines(lines: Vec<OrderLine>, default_lot: impl Into<String>) -> Self {
        let mut list = Self {
            lines,
            default_lot: default_lot.into(),
        };
        list.dedupe();
        list.normalize_ghosts();
        list
    }

    pub fn default_lot(&self) -> &str {
        &self.default_lot
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines that carry a product.
    pub fn product_lines(&self) -> impl Iterator<Item = &OrderLine> + '_ {
        self.lines.iter().filter(|line| line.product.is_some())
    }

    pub fn get(&self, id: LineId) -> Option<&OrderLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    pub fn get_mut(&mut self, id: LineId) -> Option<&mut OrderLine> {
        self.lines.iter_mut().find(|line| line.id == id)
    }

    pub fn find_by_product(&self, product_id: &ProductId) -> Option<&OrderLine> {
        self.lines.iter().find(|line| line.product_id() == Some(product_id))
    }

    pub fn find_by_product_mut(&mut self, product_id: &ProductId) -> Option<&mut OrderLine> {
        self.lines.iter_mut().find(|line| line.product_id() == Some(product_id))
    }

    /// Line holding the same product as `product` (by id, or by code).
    pub fn find_same_product_mut(&mut self, product: &ProductRef) -> Option<&mut OrderLine> {
        self.lines.iter_mut().find(|line| line.same_product(product))
    }

    pub fn trailing_ghost(&self) -> Option<&OrderLine> {
        self.lines.last().filter(|line| line.is_ghost())
    }

    /// Make sure exactly one ghost line sits at the tail and return its id.
    pub fn ensure_empty_row(&mut self) -> LineId {
        self.normalize_ghosts();
        if let Some(ghost) = self.trailing_ghost() {
            return ghost.id;
        }
        let ghost = OrderLine::ghost(self.default_lot.clone());
        let id = ghost.id;
        self.lines.push(ghost);
        id
    }

    /// Insert a line in front of the trailing ghost (or at the end).
    pub fn insert_before_ghost(&mut self, line: OrderLine) {
        let at = if self.trailing_ghost().is_some() {
            self.lines.len() - 1
        } else {
            self.lines.len()
        };
        self.lines.insert(at, line);
    }

    /// Pick a product for a line. A ghost line is promoted in place (same id).
    ///
    /// If another line already holds that product, the two are merged and the
    /// id of the surviving (earlier) line is returned.
    pub fn select_product(&mut self, line_id: LineId, product: ProductRef) -> Option<LineId> {
        self.get_mut(line_id)?.set_product(product.clone());
        self.dedupe();
        self.normalize_ghosts();
        self.lines.iter().find(|line| line.same_product(&product)).map(|line| line.id)
    }

    /// Edit an item field of a line; ghost items and ghost lines are promoted.
    pub fn edit_item(&mut self, line_id: LineId, item_id: ItemId, field: ItemField, value: &str) -> Option<&Item> {
        let idx = self.lines.iter().position(|line| line.id == line_id)?;
        self.lines[idx].items.edit_item(item_id, field, value)
    }

    /// Offer a ghost item row on a line, for the entry grid.
    pub fn append_ghost_item(&mut self, line_id: LineId) -> Option<ItemId> {
        Some(self.get_mut(line_id)?.items.append_ghost().id())
    }

    pub fn remove_line(&mut self, line_id: LineId) -> Option<OrderLine> {
        let idx = self.lines.iter().position(|line| line.id == line_id)?;
        let removed = self.lines.remove(idx);
        self.normalize_ghosts();
        Some(removed)
    }

    /// Merge lines sharing a product into the first occurrence.
    ///
    /// Returns the number of lines folded away.
    pub fn dedupe(&mut self) -> usize {
        let mut merged: Vec<OrderLine> = Vec::with_capacity(self.lines.len());
        let mut folded = 0;
        for line in self.lines.drain(..) {
            let target = line
                .product
                .as_ref()
                .and_then(|product| merged.iter_mut().find(|kept| kept.same_product(product)));
            match target {
                Some(kept) => {
                    kept.absorb(line);
                    folded += 1;
                }
                None => merged.push(line),
            }
        }
        self.lines = merged;
        folded
    }

    /// Record server ids echoed back for client items.
    pub fn adopt_server_ids<'a>(&mut self, echoes: impl IntoIterator<Item = (ItemId, &'a str)>) -> usize {
        let mut adopted = 0;
        for (item_id, server_id) in echoes {
            if self.lines.iter_mut().any(|line| line.items.adopt_server_id(item_id, server_id)) {
                adopted += 1;
            }
        }
        adopted
    }

    /// Drop ghost lines that are not the single trailing one.
    fn normalize_ghosts(&mut self) {
        let last_ghost = self.lines.last().is_some_and(OrderLine::is_ghost);
        let len = self.lines.len();
        let mut idx = 0;
        self.lines.retain(|line| {
            let keep = !line.is_ghost() || (last_ghost && idx + 1 == len);
            idx += 1;
            keep
        });
    }
}
