//! Document Store seam: where order documents are read from and written to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orderdesk_core::{DocumentId, ItemId};
use orderdesk_events::{EventBus, EventEnvelope, InMemoryEventBus};
use orderdesk_inventory::Item;
use orderdesk_invoicing::TaxRule;
use orderdesk_orders::{DocumentEvent, DocumentState, LineRecord, OrderPatch, WireItem, WireLine};
use orderdesk_products::{ProductId, ProductRef};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("order not found: {0}")]
    NotFound(DocumentId),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store rejected the request: {0}")]
    Rejected(String),
}

/// What the store returns for an order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    #[serde(default)]
    pub lines: Vec<LineRecord>,
    /// The party's tax configuration.
    #[serde(default, alias = "partyTaxConfig")]
    pub tax_rules: Vec<TaxRule>,
    #[serde(default)]
    pub state: DocumentState,
}

/// Server id assigned to a client item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemIdentity {
    pub echo_key: ItemId,
    pub server_id: String,
}

/// CRUD for orders and their items.
///
/// Timeouts and retries are the implementation's concern.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_order(&self, id: &DocumentId) -> Result<OrderSnapshot, StoreError>;

    /// Apply a partial update. Returns the identities of items that received
    /// a server id with this update.
    async fn update_order(&self, id: &DocumentId, patch: OrderPatch) -> Result<Vec<ItemIdentity>, StoreError>;

    async fn add_item(
        &self,
        order_id: &DocumentId,
        product_id: &ProductId,
        item: &Item,
    ) -> Result<ItemIdentity, StoreError>;

    /// `item_id` is the server id when known, otherwise the client id.
    async fn remove_item(&self, order_id: &DocumentId, item_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn get_order(&self, id: &DocumentId) -> Result<OrderSnapshot, StoreError> {
        (**self).get_order(id).await
    }

    async fn update_order(&self, id: &DocumentId, patch: OrderPatch) -> Result<Vec<ItemIdentity>, StoreError> {
        (**self).update_order(id, patch).await
    }

    async fn add_item(
        &self,
        order_id: &DocumentId,
        product_id: &ProductId,
        item: &Item,
    ) -> Result<ItemIdentity, StoreError> {
        (**self).add_item(order_id, product_id, item).await
    }

    async fn remove_item(&self, order_id: &DocumentId, item_id: &str) -> Result<(), StoreError> {
        (**self).remove_item(order_id, item_id).await
    }
}

type DocumentBus = InMemoryEventBus<EventEnvelope<DocumentEvent>>;

/// In-memory store for tests/dev.
///
/// Assigns `srv-N` server ids and, when given a bus, pushes the same
/// notifications a real backend would (including echoes to the acting
/// client).
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    orders: RwLock<HashMap<DocumentId, OrderSnapshot>>,
    next_server_id: AtomicU64,
    next_sequence: AtomicU64,
    events: Option<Arc<DocumentBus>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(mut self, bus: Arc<DocumentBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn insert(&self, id: DocumentId, snapshot: OrderSnapshot) {
        if let Ok(mut orders) = self.orders.write() {
            orders.insert(id, snapshot);
        }
    }

    pub fn snapshot(&self, id: &DocumentId) -> Option<OrderSnapshot> {
        self.orders.read().ok()?.get(id).cloned()
    }

    fn assign_server_id(&self) -> String {
        format!("srv-{}", self.next_server_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn publish(&self, id: &DocumentId, event: DocumentEvent) {
        if let Some(bus) = &self.events {
            let seq = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
            if let Err(err) = bus.publish(EventEnvelope::for_document(id.clone(), seq, event)) {
                tracing::warn!(document = %id, error = ?err, "failed to publish store event");
            }
        }
    }

    fn write<T>(
        &self,
        id: &DocumentId,
        f: impl FnOnce(&mut OrderSnapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;
        let snapshot = orders.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        f(snapshot)
    }

    /// Turn a wire item into a stored item, assigning a server id if needed.
    fn store_item(&self, wire: &WireItem, assigned: &mut Vec<ItemIdentity>) -> Item {
        let server_id = if wire.id == wire.echo_key.to_string() {
            let server_id = self.assign_server_id();
            assigned.push(ItemIdentity {
                echo_key: wire.echo_key,
                server_id: server_id.clone(),
            });
            server_id
        } else {
            wire.id.clone()
        };
        let mut item = Item::new(wire.quantity, wire.lot.clone(), wire.item_number.clone())
            .with_server_id(server_id);
        item.id = wire.echo_key;
        item.parent_item = wire.parent_item.clone();
        item.warehouse = wire.warehouse.clone();
        item
    }

    fn store_line(&self, wire: &WireLine, previous: &[LineRecord], assigned: &mut Vec<ItemIdentity>) -> LineRecord {
        let product = previous
            .iter()
            .filter_map(|line| line.product.as_ref())
            .find(|product| product.id == wire.product)
            .cloned()
            .unwrap_or_else(|| ProductRef::new(wire.product.as_str(), wire.product.as_str()));
        LineRecord {
            id: Some(wire.id),
            product: Some(product),
            price: wire.price,
            iva_included: wire.iva_included,
            invoice_percentage: wire.invoice_percentage,
            requested_quantity: wire.requested_quantity,
            items: wire.items.iter().map(|item| self.store_item(item, assigned)).collect(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_order(&self, id: &DocumentId) -> Result<OrderSnapshot, StoreError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;
        orders.get(id).cloned().ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update_order(&self, id: &DocumentId, patch: OrderPatch) -> Result<Vec<ItemIdentity>, StoreError> {
        let mut assigned = Vec::new();
        let state_change = self.write(id, |snapshot| {
            if let Some(lines) = &patch.lines {
                let stored: Vec<LineRecord> = lines
                    .iter()
                    .map(|line| self.store_line(line, &snapshot.lines, &mut assigned))
                    .collect();
                snapshot.lines = stored;
            }
            match patch.state {
                Some(next) if next != snapshot.state => {
                    snapshot.state = snapshot
                        .state
                        .advance(next)
                        .map_err(|err| StoreError::Rejected(err.to_string()))?;
                    Ok(Some(next))
                }
                _ => Ok(None),
            }
        })?;
        if state_change.is_some() {
            self.publish(id, DocumentEvent::document_updated(state_change));
        }
        Ok(assigned)
    }

    async fn add_item(
        &self,
        order_id: &DocumentId,
        product_id: &ProductId,
        item: &Item,
    ) -> Result<ItemIdentity, StoreError> {
        let server_id = item.server_id.clone().unwrap_or_else(|| self.assign_server_id());
        let stored = item.clone().with_server_id(server_id.clone());
        self.write(order_id, |snapshot| {
            let line = snapshot
                .lines
                .iter_mut()
                .find(|line| line.product.as_ref().is_some_and(|p| &p.id == product_id))
                .ok_or_else(|| StoreError::Rejected(format!("order has no line for product {product_id}")))?;
            if !line.items.iter().any(|existing| existing.same_entity(&stored)) {
                line.items.insert(0, stored.clone());
            }
            Ok(())
        })?;
        self.publish(order_id, DocumentEvent::item_added(product_id.clone(), stored));
        Ok(ItemIdentity {
            echo_key: item.id,
            server_id,
        })
    }

    async fn remove_item(&self, order_id: &DocumentId, item_id: &str) -> Result<(), StoreError> {
        let removed = self.write(order_id, |snapshot| {
            for line in &mut snapshot.lines {
                let position = line.items.iter().position(|item| {
                    item.server_id.as_deref() == Some(item_id) || item.id.to_string() == item_id
                });
                if let Some(at) = position {
                    let item = line.items.remove(at);
                    let product_id = line.product.as_ref().map(|p| p.id.clone());
                    return Ok(product_id.map(|product_id| (product_id, item)));
                }
            }
            Ok(None)
        })?;
        if let Some((product_id, item)) = removed {
            self.publish(order_id, DocumentEvent::item_removed(product_id, item));
        }
        Ok(())
    }
}
