//! Server-pushed document notifications and their idempotent merge.
//!
//! The acting client applies its own edits optimistically and then receives
//! the same change back from the server, possibly more than once. Every
//! handler here is therefore written so that applying an event a second time
//! changes nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use orderdesk_core::DocumentId;
use orderdesk_events::{DocumentScoped, Event, EventBus, EventEnvelope, Projection, Subscription};
use orderdesk_inventory::Item;
use orderdesk_products::ProductId;

use crate::document::{DocumentState, OrderDocument};
use crate::line::LineList;

/// Event: an item was added to a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAdded {
    pub product_id: ProductId,
    pub item: Item,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an item was removed from a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRemoved {
    pub product_id: ProductId,
    pub item: Item,
    pub occurred_at: DateTime<Utc>,
}

/// Event: document metadata changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdated {
    #[serde(default)]
    pub state: Option<DocumentState>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocumentEvent {
    ItemAdded(ItemAdded),
    ItemRemoved(ItemRemoved),
    DocumentUpdated(DocumentUpdated),
}

impl DocumentEvent {
    pub fn item_added(product_id: ProductId, item: Item) -> Self {
        DocumentEvent::ItemAdded(ItemAdded {
            product_id,
            item,
            occurred_at: Utc::now(),
        })
    }

    pub fn item_removed(product_id: ProductId, item: Item) -> Self {
        DocumentEvent::ItemRemoved(ItemRemoved {
            product_id,
            item,
            occurred_at: Utc::now(),
        })
    }

    pub fn document_updated(state: Option<DocumentState>) -> Self {
        DocumentEvent::DocumentUpdated(DocumentUpdated {
            state,
            occurred_at: Utc::now(),
        })
    }
}

impl Event for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::ItemAdded(_) => "orders.item.added",
            DocumentEvent::ItemRemoved(_) => "orders.item.removed",
            DocumentEvent::DocumentUpdated(_) => "orders.document.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::ItemAdded(e) => e.occurred_at,
            DocumentEvent::ItemRemoved(e) => e.occurred_at,
            DocumentEvent::DocumentUpdated(e) => e.occurred_at,
        }
    }
}

/// Why an event was not applied. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherDocument,
    UnknownProduct,
    AlreadyPresent,
    AlreadyAbsent,
    StaleState,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied,
    Ignored(IgnoreReason),
}

impl SyncOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, SyncOutcome::Applied)
    }
}

/// Put a pushed item at the top of its product's line unless it is already
/// there. An already present item without server id adopts the pushed one.
pub fn apply_item_added(lines: &mut LineList, product_id: &ProductId, item: &Item) -> SyncOutcome {
    let Some(line) = lines.find_by_product_mut(product_id) else {
        return SyncOutcome::Ignored(IgnoreReason::UnknownProduct);
    };
    if line.items.prepend(item.clone()) {
        SyncOutcome::Applied
    } else {
        SyncOutcome::Ignored(IgnoreReason::AlreadyPresent)
    }
}

/// Drop the pushed item from its product's line; absent items are a no-op.
pub fn apply_item_removed(lines: &mut LineList, product_id: &ProductId, item: &Item) -> SyncOutcome {
    let Some(line) = lines.find_by_product_mut(product_id) else {
        return SyncOutcome::Ignored(IgnoreReason::UnknownProduct);
    };
    match line.items.remove_matching(item) {
        Some(_) => SyncOutcome::Applied,
        None => SyncOutcome::Ignored(IgnoreReason::AlreadyAbsent),
    }
}

/// Keeps one open document in step with the shared event source.
///
/// Only the item lists and the lifecycle state are touched; price, requested
/// quantity and other line metadata stay as the user left them.
#[derive(Debug, Default)]
pub struct RealtimeSyncAdapter {
    binding: Option<Binding>,
}

#[derive(Debug)]
struct Binding {
    document_id: DocumentId,
    subscription: Subscription<EventEnvelope<DocumentEvent>>,
}

impl RealtimeSyncAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe for `document_id`, replacing any previous binding.
    pub fn bind<B>(&mut self, bus: &B, document_id: DocumentId)
    where
        B: EventBus<EventEnvelope<DocumentEvent>> + ?Sized,
    {
        debug!(document = %document_id, "realtime bound");
        self.binding = Some(Binding {
            subscription: bus.subscribe(),
            document_id,
        });
    }

    /// Drop the subscription. Pending events are discarded.
    pub fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!(document = %binding.document_id, "realtime unbound");
        }
    }

    pub fn bound_document(&self) -> Option<&DocumentId> {
        self.binding.as_ref().map(|b| &b.document_id)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Apply one envelope to `doc`, ignoring anything not addressed to the
    /// bound document.
    pub fn apply(&self, doc: &mut OrderDocument, envelope: &EventEnvelope<DocumentEvent>) -> SyncOutcome {
        match self.bound_document() {
            Some(bound) if !envelope.is_for(bound) => ignored(envelope, IgnoreReason::OtherDocument),
            _ => apply_envelope(doc, envelope),
        }
    }

    /// Drain every queued envelope into `doc`. Returns how many changed it.
    pub fn pump(&self, doc: &mut OrderDocument) -> usize {
        let Some(binding) = &self.binding else {
            return 0;
        };
        binding
            .subscription
            .try_iter()
            .filter(|envelope| self.apply(doc, envelope).is_applied())
            .count()
    }
}

/// Apply one envelope to the document it is addressed to.
pub fn apply_envelope(doc: &mut OrderDocument, envelope: &EventEnvelope<DocumentEvent>) -> SyncOutcome {
    if !envelope.is_for(&doc.id) {
        return ignored(envelope, IgnoreReason::OtherDocument);
    }
    let outcome = match envelope.payload() {
        DocumentEvent::ItemAdded(e) => apply_item_added(&mut doc.lines, &e.product_id, &e.item),
        DocumentEvent::ItemRemoved(e) => apply_item_removed(&mut doc.lines, &e.product_id, &e.item),
        DocumentEvent::DocumentUpdated(e) => apply_state(doc, e.state),
    };
    match outcome {
        SyncOutcome::Ignored(reason) => ignored(envelope, reason),
        applied => applied,
    }
}

impl Projection for OrderDocument {
    type Ev = DocumentEvent;

    fn apply(&mut self, envelope: &EventEnvelope<DocumentEvent>) {
        apply_envelope(self, envelope);
    }
}

fn apply_state(doc: &mut OrderDocument, state: Option<DocumentState>) -> SyncOutcome {
    match state {
        None => SyncOutcome::Ignored(IgnoreReason::NoChange),
        Some(next) if next == doc.state => SyncOutcome::Ignored(IgnoreReason::NoChange),
        Some(next) => match doc.state.advance(next) {
            Ok(advanced) => {
                doc.state = advanced;
                SyncOutcome::Applied
            }
            Err(_) => SyncOutcome::Ignored(IgnoreReason::StaleState),
        },
    }
}

fn ignored(envelope: &EventEnvelope<DocumentEvent>, reason: IgnoreReason) -> SyncOutcome {
    debug!(
        document = %envelope.document_id(),
        event = envelope.payload().event_type(),
        ?reason,
        "realtime event ignored"
    );
    SyncOutcome::Ignored(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderdesk_events::InMemoryEventBus;
    use orderdesk_products::ProductRef;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use crate::line::OrderLine;

    fn doc_with_product(id: &str) -> OrderDocument {
        let mut doc = OrderDocument::new(DocumentId::from(id), "");
        let mut line = OrderLine::for_product(ProductRef::new("P1", "Arroz"), "");
        line.price = Some(Decimal::from(7));
        line.items.push(Item::new(Some(Decimal::ONE), "", "1"));
        doc.lines.insert_before_ghost(line);
        doc
    }

    fn envelope(doc: &str, event: DocumentEvent) -> EventEnvelope<DocumentEvent> {
        EventEnvelope::for_document(DocumentId::from(doc), 0, event)
    }

    fn p1() -> ProductId {
        ProductId::from("P1")
    }

    #[test]
    fn item_added_twice_is_applied_once() {
        let mut doc = doc_with_product("D1");
        let adapter = RealtimeSyncAdapter::new();
        let item = Item::new(Some(Decimal::from(2)), "L1", "2").with_server_id("srv-2");
        let e = envelope("D1", DocumentEvent::item_added(p1(), item.clone()));

        assert_eq!(adapter.apply(&mut doc, &e), SyncOutcome::Applied);
        assert_eq!(
            adapter.apply(&mut doc, &e),
            SyncOutcome::Ignored(IgnoreReason::AlreadyPresent)
        );

        let line = doc.lines.find_by_product(&p1()).unwrap();
        assert_eq!(line.items.real_len(), 2);
        assert_eq!(line.items.items().next().unwrap().id, item.id);
        assert_eq!(line.price, Some(Decimal::from(7)));
    }

    #[test]
    fn echo_of_a_local_item_adopts_the_server_id() {
        let mut doc = doc_with_product("D1");
        let local = doc.lines.find_by_product(&p1()).unwrap().items.items().next().unwrap().clone();
        let echo = local.clone().with_server_id("srv-1");
        let adapter = RealtimeSyncAdapter::new();

        adapter.apply(&mut doc, &envelope("D1", DocumentEvent::item_added(p1(), echo)));

        let line = doc.lines.find_by_product(&p1()).unwrap();
        assert_eq!(line.items.real_len(), 1);
        assert_eq!(line.items.get(local.id).unwrap().server_id.as_deref(), Some("srv-1"));
    }

    #[test]
    fn removing_an_absent_item_is_a_no_op() {
        let mut doc = doc_with_product("D1");
        let before = doc.clone();
        let adapter = RealtimeSyncAdapter::new();
        let stranger = Item::new(None, "", "1").with_server_id("srv-x");

        let outcome = adapter.apply(&mut doc, &envelope("D1", DocumentEvent::item_removed(p1(), stranger)));

        assert_eq!(outcome, SyncOutcome::Ignored(IgnoreReason::AlreadyAbsent));
        assert_eq!(doc, before);
    }

    #[test]
    fn removal_matches_by_server_id() {
        let mut doc = doc_with_product("D1");
        let adapter = RealtimeSyncAdapter::new();
        let pushed = Item::new(None, "", "3").with_server_id("srv-3");
        adapter.apply(&mut doc, &envelope("D1", DocumentEvent::item_added(p1(), pushed.clone())));

        let mut as_seen_by_server = Item::new(None, "", "3").with_server_id("srv-3");
        as_seen_by_server.quantity = Some(Decimal::TEN);
        let outcome = adapter.apply(&mut doc, &envelope("D1", DocumentEvent::item_removed(p1(), as_seen_by_server)));

        assert!(outcome.is_applied());
        assert_eq!(doc.lines.find_by_product(&p1()).unwrap().items.real_len(), 1);
    }

    #[test]
    fn state_only_moves_forward() {
        let mut doc = doc_with_product("D1");
        let adapter = RealtimeSyncAdapter::new();
        let confirm = envelope("D1", DocumentEvent::document_updated(Some(DocumentState::Confirmed)));
        let back = envelope("D1", DocumentEvent::document_updated(Some(DocumentState::Draft)));

        assert!(adapter.apply(&mut doc, &confirm).is_applied());
        assert_eq!(adapter.apply(&mut doc, &back), SyncOutcome::Ignored(IgnoreReason::StaleState));
        assert_eq!(doc.state, DocumentState::Confirmed);
    }

    #[test]
    fn unknown_product_is_ignored() {
        let mut doc = doc_with_product("D1");
        let adapter = RealtimeSyncAdapter::new();
        let e = envelope("D1", DocumentEvent::item_added(ProductId::from("P404"), Item::new(None, "", "1")));
        assert_eq!(adapter.apply(&mut doc, &e), SyncOutcome::Ignored(IgnoreReason::UnknownProduct));
    }

    #[test]
    fn pump_drops_events_for_other_documents() {
        let bus = InMemoryEventBus::new();
        let mut adapter = RealtimeSyncAdapter::new();
        adapter.bind(&bus, DocumentId::from("D1"));
        let mut doc = doc_with_product("D1");

        let item = Item::new(None, "", "2");
        bus.publish(envelope("D2", DocumentEvent::item_added(p1(), item.clone()))).unwrap();
        bus.publish(envelope("D1", DocumentEvent::item_added(p1(), item.clone()))).unwrap();
        bus.publish(envelope("D1", DocumentEvent::item_added(p1(), item))).unwrap();

        assert_eq!(adapter.pump(&mut doc), 1);
        assert_eq!(doc.lines.find_by_product(&p1()).unwrap().items.real_len(), 2);
    }

    #[test]
    fn rebinding_switches_documents_and_unbind_stops_delivery() {
        let bus = InMemoryEventBus::new();
        let mut adapter = RealtimeSyncAdapter::new();
        adapter.bind(&bus, DocumentId::from("D1"));
        adapter.bind(&bus, DocumentId::from("D2"));
        assert_eq!(adapter.bound_document(), Some(&DocumentId::from("D2")));

        let mut d1 = doc_with_product("D1");
        bus.publish(envelope("D1", DocumentEvent::item_added(p1(), Item::new(None, "", "2")))).unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(adapter.pump(&mut d1), 0);

        adapter.unbind();
        assert!(!adapter.is_bound());
        bus.publish(envelope("D2", DocumentEvent::document_updated(None))).unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn document_projection_applies_without_a_binding() {
        let mut doc = doc_with_product("D1");
        let item = Item::new(None, "", "2");
        Projection::apply(&mut doc, &envelope("D1", DocumentEvent::item_added(p1(), item.clone())));
        Projection::apply(&mut doc, &envelope("D9", DocumentEvent::item_removed(p1(), item.clone())));
        assert!(doc.lines.find_by_product(&p1()).unwrap().items.contains(&item));
    }

    #[test]
    fn events_round_trip_with_a_type_tag() {
        let e = DocumentEvent::document_updated(Some(DocumentState::Completed));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "documentUpdated");
        assert_eq!(json["state"], "completed");
        assert_eq!(e.event_type(), "orders.document.updated");
    }

    proptest! {
        #[test]
        fn replaying_events_is_idempotent(ops in prop::collection::vec((any::<bool>(), 0usize..4), 0..30)) {
            let pool: Vec<Item> = (0..4)
                .map(|n| Item::new(Some(Decimal::from(n)), "", n.to_string()).with_server_id(format!("srv-{n}")))
                .collect();
            let events: Vec<_> = ops
                .iter()
                .map(|(add, i)| {
                    let item = pool[*i].clone();
                    let event = if *add {
                        DocumentEvent::item_added(p1(), item)
                    } else {
                        DocumentEvent::item_removed(p1(), item)
                    };
                    envelope("D1", event)
                })
                .collect();
            let adapter = RealtimeSyncAdapter::new();

            let mut once = doc_with_product("D1");
            for e in &events {
                adapter.apply(&mut once, e);
            }
            let mut twice = doc_with_product("D1");
            twice.lines = once.lines.clone();
            for e in events.iter().rev().take(1) {
                adapter.apply(&mut twice, e);
            }
            prop_assert_eq!(&twice.lines, &once.lines);
        }
    }
}
