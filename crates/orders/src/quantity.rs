//! Confirmed quantities and the draft -> confirmed transition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderdesk_core::{LineId, round2};
use orderdesk_products::ProductRef;

use crate::document::DocumentState;
use crate::line::{LineList, OrderLine};

/// Which quantity a line is invoiced on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityBasis {
    /// What the customer asked for (drafts).
    Requested,
    /// What was actually entered as items.
    Confirmed,
}

impl QuantityBasis {
    pub fn for_state(state: DocumentState) -> Self {
        if state.is_draft() {
            QuantityBasis::Requested
        } else {
            QuantityBasis::Confirmed
        }
    }

    pub fn quantity_of(self, line: &OrderLine) -> Option<Decimal> {
        match self {
            QuantityBasis::Requested => line.requested_quantity,
            QuantityBasis::Confirmed => Some(QuantityReconciler::confirmed_quantity(line)),
        }
    }
}

/// Read-only per-line quantities for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineQuantities {
    pub line_id: LineId,
    pub product: ProductRef,
    pub requested: Option<Decimal>,
    pub confirmed: Decimal,
}

pub struct QuantityReconciler;

impl QuantityReconciler {
    pub fn confirmed_quantity(line: &OrderLine) -> Decimal {
        line.confirmed_quantity()
    }

    /// Every product line has at least one counted item and every counted
    /// item has a quantity.
    ///
    /// Items at exactly zero are not counted. A blank quantity keeps the
    /// document open. A document without product lines is never complete.
    pub fn is_order_fully_confirmed(lines: &LineList) -> bool {
        let mut product_lines = lines.product_lines().peekable();
        if product_lines.peek().is_none() {
            return false;
        }
        product_lines.all(|line| {
            let mut counted = line
                .items
                .items()
                .filter(|item| item.quantity != Some(Decimal::ZERO))
                .peekable();
            counted.peek().is_some() && counted.all(|item| item.quantity.is_some())
        })
    }

    /// Draft moves to confirmed once every line is fully entered; every other
    /// state stays where it is.
    pub fn next_state(current: DocumentState, lines: &LineList) -> DocumentState {
        match current {
            DocumentState::Draft if Self::is_order_fully_confirmed(lines) => DocumentState::Confirmed,
            other => other,
        }
    }

    pub fn line_quantities(lines: &LineList) -> Vec<LineQuantities> {
        lines
            .product_lines()
            .filter_map(|line| {
                Some(LineQuantities {
                    line_id: line.id,
                    product: line.product.clone()?,
                    requested: line.requested_quantity.map(round2),
                    confirmed: line.confirmed_quantity(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderdesk_inventory::Item;

    fn line(quantities: &[Option<i64>]) -> OrderLine {
        let mut line = OrderLine::for_product(ProductRef::new(format!("P{}", quantities.len()), "x"), "");
        line.items
            .extend(quantities.iter().map(|q| Item::new(q.map(Decimal::from), "", "1")));
        line
    }

    fn list(lines: Vec<OrderLine>) -> LineList {
        LineList::from_lines(lines, "")
    }

    #[test]
    fn fully_entered_draft_is_confirmed() {
        let lines = list(vec![line(&[Some(2)]), line(&[Some(1), Some(3)])]);
        assert!(QuantityReconciler::is_order_fully_confirmed(&lines));
        assert_eq!(
            QuantityReconciler::next_state(DocumentState::Draft, &lines),
            DocumentState::Confirmed
        );
    }

    #[test]
    fn blank_quantity_keeps_the_draft() {
        let lines = list(vec![line(&[Some(2), None])]);
        assert!(!QuantityReconciler::is_order_fully_confirmed(&lines));
        assert_eq!(
            QuantityReconciler::next_state(DocumentState::Draft, &lines),
            DocumentState::Draft
        );
    }

    #[test]
    fn zero_items_are_not_counted() {
        let only_zero = list(vec![line(&[Some(0)])]);
        assert!(!QuantityReconciler::is_order_fully_confirmed(&only_zero));

        let zero_and_real = list(vec![line(&[Some(0), Some(5)])]);
        assert!(QuantityReconciler::is_order_fully_confirmed(&zero_and_real));
    }

    #[test]
    fn ghost_rows_do_not_block_confirmation() {
        let mut l = line(&[Some(1)]);
        l.items.append_ghost();
        let mut lines = list(vec![l]);
        lines.ensure_empty_row();
        assert!(QuantityReconciler::is_order_fully_confirmed(&lines));
    }

    #[test]
    fn empty_document_is_not_confirmed() {
        let mut lines = LineList::new("");
        lines.ensure_empty_row();
        assert!(!QuantityReconciler::is_order_fully_confirmed(&lines));
    }

    #[test]
    fn confirmed_and_completed_never_revert() {
        let lines = list(vec![line(&[None])]);
        assert_eq!(
            QuantityReconciler::next_state(DocumentState::Completed, &lines),
            DocumentState::Completed
        );
        assert_eq!(
            QuantityReconciler::next_state(DocumentState::Confirmed, &lines),
            DocumentState::Confirmed
        );
    }

    #[test]
    fn basis_follows_state() {
        let mut l = line(&[Some(3)]);
        l.requested_quantity = Some(Decimal::from(10));
        assert_eq!(QuantityBasis::for_state(DocumentState::Draft).quantity_of(&l), Some(Decimal::from(10)));
        assert_eq!(QuantityBasis::for_state(DocumentState::Confirmed).quantity_of(&l), Some(Decimal::from(3)));
    }

    #[test]
    fn line_quantities_skip_the_ghost_line() {
        let mut lines = list(vec![line(&[Some(1), Some(2)])]);
        lines.ensure_empty_row();
        let view = QuantityReconciler::line_quantities(&lines);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].confirmed.to_string(), "3.00");
        assert_eq!(view[0].requested, None);
    }
}
