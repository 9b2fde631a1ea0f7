//! Read-only results handed to export renderers.

use rust_decimal::Decimal;
use serde::Serialize;

use orderdesk_core::LineId;
use orderdesk_orders::{LineQuantities, OrderDocument, QuantityReconciler};

use crate::calculator::TaxCascadeCalculator;
use crate::tax::{TaxRule, TaxUse};

/// A tax, retention or informational amount, rounded to 2 dp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxLine {
    pub id: String,
    pub name: String,
    pub amount: Decimal,
    #[serde(rename = "use")]
    pub tax_use: TaxUse,
}

/// Per-line figures for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDetail {
    pub line_id: LineId,
    pub name: String,
    pub unit_price_excl: Decimal,
    pub quantity: Decimal,
    pub line_base: Decimal,
    pub tax: Decimal,
}

/// Data-quality findings. The computation still completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaxWarning {
    MissingPrice { line_id: LineId },
    MissingQuantity { line_id: LineId },
    NonNumericRate { tax_id: String },
    UnrecognizedApplicationType { tax_id: String },
    /// The rule is subtracted, as every non-increment rule is.
    UnrecognizedUse { tax_id: String },
    /// The line's amounts do not fit in a decimal; it contributes nothing.
    LineOutOfRange { line_id: LineId },
    TaxOutOfRange { tax_id: String },
}

impl core::fmt::Display for TaxWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TaxWarning::MissingPrice { line_id } => write!(f, "line {line_id} has no numeric price"),
            TaxWarning::MissingQuantity { line_id } => write!(f, "line {line_id} has no numeric quantity"),
            TaxWarning::NonNumericRate { tax_id } => write!(f, "tax {tax_id} has no numeric rate"),
            TaxWarning::UnrecognizedApplicationType { tax_id } => {
                write!(f, "tax {tax_id} has an unrecognized application type")
            }
            TaxWarning::UnrecognizedUse { tax_id } => {
                write!(f, "tax {tax_id} has an unrecognized use and is subtracted")
            }
            TaxWarning::LineOutOfRange { line_id } => write!(f, "line {line_id} amount is out of range"),
            TaxWarning::TaxOutOfRange { tax_id } => write!(f, "tax {tax_id} amount is out of range"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxResult {
    pub subtotal: Decimal,
    /// Per-line taxes (product and active conditional rules), in rule order.
    pub taxes: Vec<TaxLine>,
    pub retentions: Vec<TaxLine>,
    /// Self-retentions: reported, never part of `total`.
    pub informational: Vec<TaxLine>,
    pub total: Decimal,
    pub per_line: Vec<LineDetail>,
    pub warnings: Vec<TaxWarning>,
}

impl TaxResult {
    pub fn tax(&self, id: &str) -> Option<&TaxLine> {
        self.taxes.iter().find(|t| t.id == id)
    }

    pub fn retention(&self, id: &str) -> Option<&TaxLine> {
        self.retentions.iter().find(|t| t.id == id)
    }
}

/// Everything a renderer needs for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub taxes: TaxResult,
    pub quantities: Vec<LineQuantities>,
}

impl ExportSummary {
    pub fn build(doc: &OrderDocument, rules: &[TaxRule]) -> Self {
        Self {
            taxes: TaxCascadeCalculator::new(rules).compute_document(doc),
            quantities: QuantityReconciler::line_quantities(&doc.lines),
        }
    }
}
