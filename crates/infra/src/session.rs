//! One document view: the open order, its tax configuration, the realtime
//! binding and any import in flight.
//!
//! The session owns the document exclusively (`&mut self` everywhere), so
//! local edits, pushed events and import merges are applied one after the
//! other. Closing or switching documents cancels running imports and drops
//! the realtime subscription.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use orderdesk_core::{DocumentId, DomainError, ItemId, LineId};
use orderdesk_events::{EventBus, EventEnvelope};
use orderdesk_invoicing::{ExportSummary, TaxResult, TaxRule, TaxCascadeCalculator};
use orderdesk_orders::{
    BulkReconciler, DocumentEvent, DocumentState, ImportError, ImportOptions, ImportReport,
    ImportRow, OrderDocument, QuantityReconciler, RealtimeSyncAdapter,
};
use orderdesk_products::{CatalogError, CatalogLookup, CatalogPage, ProductRef, normalize_key};

use crate::config::EngineConfig;
use crate::document_store::{DocumentStore, ItemIdentity, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no document is open")]
    NoOpenDocument,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

struct OpenDocument {
    doc: OrderDocument,
    tax_rules: Vec<TaxRule>,
    imports: CancellationToken,
}

pub struct DocumentSession<S, C, B> {
    store: S,
    catalog: C,
    bus: B,
    config: EngineConfig,
    realtime: RealtimeSyncAdapter,
    current: Option<OpenDocument>,
}

impl<S, C, B> DocumentSession<S, C, B>
where
    S: DocumentStore,
    C: CatalogLookup,
    B: EventBus<EventEnvelope<DocumentEvent>>,
{
    pub fn new(store: S, catalog: C, bus: B, config: EngineConfig) -> Self {
        Self {
            store,
            catalog,
            bus,
            config,
            realtime: RealtimeSyncAdapter::new(),
            current: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load `id` and bind realtime updates to it. Whatever was open before is
    /// closed first.
    pub async fn open(&mut self, id: DocumentId) -> Result<&OrderDocument, SessionError> {
        self.close();
        let snapshot = self.store.get_order(&id).await?;
        let mut doc = OrderDocument::from_records(
            id.clone(),
            snapshot.state,
            snapshot.lines,
            self.config.default_lot.clone(),
        );
        if self.config.ensure_empty_row {
            doc.lines.ensure_empty_row();
        }
        self.realtime.bind(&self.bus, id.clone());
        info!(document = %id, lines = doc.lines.len(), state = ?doc.state, "document opened");

        let open = self.current.insert(OpenDocument {
            doc,
            tax_rules: snapshot.tax_rules,
            imports: CancellationToken::new(),
        });
        Ok(&open.doc)
    }

    /// Close the current document, cancelling imports in flight.
    pub fn close(&mut self) {
        if let Some(open) = self.current.take() {
            open.imports.cancel();
            self.realtime.unbind();
            info!(document = %open.doc.id, "document closed");
        }
    }

    pub fn document(&self) -> Option<&OrderDocument> {
        self.current.as_ref().map(|open| &open.doc)
    }

    pub fn document_mut(&mut self) -> Result<&mut OrderDocument, SessionError> {
        self.open_mut().map(|open| &mut open.doc)
    }

    pub fn tax_rules(&self) -> &[TaxRule] {
        self.current.as_ref().map(|open| open.tax_rules.as_slice()).unwrap_or_default()
    }

    /// Token watched by imports into the current document, including one
    /// already running. Cancelling it aborts that import; the next import gets
    /// a fresh token. Close and switch cancel it too.
    pub fn import_cancellation(&self) -> Option<CancellationToken> {
        self.current.as_ref().map(|open| open.imports.clone())
    }

    /// Apply queued realtime events; returns how many changed the document.
    pub fn pump_events(&mut self) -> usize {
        let Some(open) = self.current.as_mut() else {
            return 0;
        };
        let applied = self.realtime.pump(&mut open.doc);
        if self.config.ensure_empty_row && applied > 0 {
            open.doc.lines.ensure_empty_row();
        }
        applied
    }

    /// Resolve a product for the line picker: current lines, then the catalog.
    pub async fn find_product(&self, identifier_or_name: &str) -> Result<Option<ProductRef>, SessionError> {
        let key = normalize_key(identifier_or_name);
        if let Some(doc) = self.document() {
            let local = doc
                .lines
                .product_lines()
                .filter_map(|line| line.product.as_ref())
                .find(|product| product.matches_key(&key));
            if let Some(product) = local {
                return Ok(Some(product.clone()));
            }
        }
        Ok(self.catalog.find_product(identifier_or_name).await?)
    }

    /// Bulk-import rows into the open document.
    pub async fn import(
        &mut self,
        rows: Vec<ImportRow>,
        page: Option<&CatalogPage>,
    ) -> Result<ImportReport, SessionError> {
        let options = ImportOptions {
            ensure_empty_row: self.config.ensure_empty_row,
        };
        let open = self.current.as_mut().ok_or(SessionError::NoOpenDocument)?;
        let token = open.imports.clone();

        let mut reconciler = BulkReconciler::new(&self.catalog);
        if let Some(page) = page {
            reconciler = reconciler.with_page(page);
        }
        let resolved = reconciler.resolve(&open.doc.lines, rows, &token).await;
        if token.is_cancelled() {
            open.imports = CancellationToken::new();
            info!(document = %open.doc.id, "import cancelled");
            return Err(ImportError::Cancelled.into());
        }
        let report = resolved?.apply(&mut open.doc.lines, options);
        if !report.not_found.is_empty() {
            warn!(document = %open.doc.id, missing = ?report.not_found, "import rows without product");
        }
        Ok(report)
    }

    /// Send one item to the store and record the server id it got.
    pub async fn commit_item(&mut self, line_id: LineId, item_id: ItemId) -> Result<ItemIdentity, SessionError> {
        let open = self.current.as_mut().ok_or(SessionError::NoOpenDocument)?;
        let line = open
            .doc
            .lines
            .get(line_id)
            .ok_or_else(|| DomainError::not_found(format!("line {line_id}")))?;
        let product_id = line
            .product_id()
            .cloned()
            .ok_or_else(|| DomainError::validation("line has no product"))?;
        let item = line
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("item {item_id}")))?;

        let identity = self.store.add_item(&open.doc.id, &product_id, &item).await?;
        open.doc
            .lines
            .adopt_server_ids([(identity.echo_key, identity.server_id.as_str())]);
        Ok(identity)
    }

    /// Remove an item locally, then in the store. Removing an item the store
    /// never saw only touches the local document.
    pub async fn remove_item(&mut self, line_id: LineId, item_id: ItemId) -> Result<(), SessionError> {
        let open = self.current.as_mut().ok_or(SessionError::NoOpenDocument)?;
        let Some(line) = open.doc.lines.get_mut(line_id) else {
            return Ok(());
        };
        let removed = line.items.remove_item(item_id);
        let server_id = removed
            .as_ref()
            .and_then(|entry| entry.as_real())
            .and_then(|item| item.server_id.clone());
        if let Some(server_id) = server_id {
            self.store.remove_item(&open.doc.id, &server_id).await?;
        }
        Ok(())
    }

    /// Persist the lines, auto-confirming a fully entered draft.
    pub async fn save(&mut self) -> Result<DocumentState, SessionError> {
        let open = self.current.as_mut().ok_or(SessionError::NoOpenDocument)?;
        let doc = &mut open.doc;
        let next = QuantityReconciler::next_state(doc.state, &doc.lines);
        let mut patch = doc.to_patch();
        if next != doc.state {
            patch = patch.with_state(doc.state.advance(next)?);
        }

        let assigned = self.store.update_order(&doc.id, patch).await?;
        doc.lines
            .adopt_server_ids(assigned.iter().map(|a| (a.echo_key, a.server_id.as_str())));
        if next != doc.state {
            info!(document = %doc.id, from = ?doc.state, to = ?next, "document state advanced");
            doc.state = next;
        }
        Ok(doc.state)
    }

    pub fn taxes(&self) -> Result<TaxResult, SessionError> {
        let open = self.current.as_ref().ok_or(SessionError::NoOpenDocument)?;
        Ok(TaxCascadeCalculator::new(&open.tax_rules).compute_document(&open.doc))
    }

    pub fn summary(&self) -> Result<ExportSummary, SessionError> {
        let open = self.current.as_ref().ok_or(SessionError::NoOpenDocument)?;
        Ok(ExportSummary::build(&open.doc, &open.tax_rules))
    }

    fn open_mut(&mut self) -> Result<&mut OpenDocument, SessionError> {
        self.current.as_mut().ok_or(SessionError::NoOpenDocument)
    }
}

impl<S, C, B> Drop for DocumentSession<S, C, B> {
    fn drop(&mut self) {
        if let Some(open) = &self.current {
            open.imports.cancel();
        }
    }
}
