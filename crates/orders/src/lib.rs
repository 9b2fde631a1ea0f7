//! Order documents and their reconciliation (lines, quantities, bulk import,
//! realtime merge).
//!
//! Everything here mutates an in-memory document owned by a single view. The
//! only `async` code is product resolution during bulk import; the merge that
//! follows is one synchronous step.

pub mod document;
pub mod import;
pub mod line;
pub mod quantity;
pub mod realtime;

pub use document::{DocumentState, LineRecord, OrderDocument, OrderPatch, WireItem, WireLine};
pub use import::{
    BulkReconciler, ImportError, ImportOptions, ImportReport, ImportRow, ResolvedImport,
};
pub use line::{LineList, OrderLine};
pub use quantity::{LineQuantities, QuantityBasis, QuantityReconciler};
pub use realtime::{
    DocumentEvent, DocumentUpdated, IgnoreReason, ItemAdded, ItemRemoved, RealtimeSyncAdapter,
    SyncOutcome, apply_envelope,
};
