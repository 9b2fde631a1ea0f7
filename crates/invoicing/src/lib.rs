//! Invoice totals for an order document: a three-pass tax cascade with
//! IVA back-out, subtotal-conditional taxes and retentions.

pub mod calculator;
pub mod summary;
pub mod tax;

pub use calculator::{IVA_RATE, TaxCascadeCalculator};
pub use summary::{ExportSummary, LineDetail, TaxLine, TaxResult, TaxWarning};
pub use tax::{ApplicationType, TaxRule, TaxUse, ThresholdCondition, check_threshold};
