use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderdesk_core::ValueObject;
use orderdesk_core::numeric::lenient;

/// Where in the cascade a rule is applied. Missing, `null` or unknown values
/// read as [`ApplicationType::Unrecognized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "Option<String>")]
pub enum ApplicationType {
    /// Per line, always.
    Product,
    /// Per line, only while the preliminary subtotal passes the threshold.
    ProductDependingSubtotal,
    /// On the final subtotal (retentions).
    Subtotal,
    /// Reported only; never changes the payable total.
    SelfRetention,
    /// Anything else the party configuration carries.
    #[default]
    Unrecognized,
}

impl From<Option<String>> for ApplicationType {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("product") => Self::Product,
            Some("product-depending-subtotal") => Self::ProductDependingSubtotal,
            Some("subtotal") => Self::Subtotal,
            Some("self-retention") => Self::SelfRetention,
            _ => Self::Unrecognized,
        }
    }
}

/// Only `increment` adds to the total; every other rule subtracts. A missing
/// `use` reads as [`TaxUse::Decrement`], any other value as
/// [`TaxUse::Unrecognized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum TaxUse {
    Increment,
    #[default]
    Decrement,
    Unrecognized,
}

impl From<Option<String>> for TaxUse {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("increment") => Self::Increment,
            None | Some("") | Some("decrement") => Self::Decrement,
            Some(_) => Self::Unrecognized,
        }
    }
}

impl TaxUse {
    /// `amount` with the sign it contributes to the total.
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            TaxUse::Increment => amount,
            TaxUse::Decrement | TaxUse::Unrecognized => -amount,
        }
    }
}

/// Comparison between a subtotal and a rule threshold. Unknown or missing
/// conditions read as `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ThresholdCondition {
    #[serde(rename = ">")]
    Greater,
    #[default]
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl From<Option<String>> for ThresholdCondition {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref().map(str::trim) {
            Some(">") => Self::Greater,
            Some("<") => Self::Less,
            Some("<=") => Self::LessOrEqual,
            Some("==") | Some("=") => Self::Equal,
            _ => Self::GreaterOrEqual,
        }
    }
}

/// `value <condition> threshold`. `==` is exact decimal equality.
pub fn check_threshold(value: Decimal, threshold: Decimal, condition: ThresholdCondition) -> bool {
    match condition {
        ThresholdCondition::Greater => value > threshold,
        ThresholdCondition::GreaterOrEqual => value >= threshold,
        ThresholdCondition::Less => value < threshold,
        ThresholdCondition::LessOrEqual => value <= threshold,
        ThresholdCondition::Equal => value == threshold,
    }
}

/// One entry of a party's tax configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Rate between 0 and 1; `None` when the configured value is not numeric.
    #[serde(default, with = "lenient")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub application_type: ApplicationType,
    #[serde(default, rename = "use")]
    pub tax_use: TaxUse,
    /// Missing thresholds compare as zero.
    #[serde(default, with = "lenient")]
    pub threshold: Option<Decimal>,
    #[serde(default)]
    pub threshold_condition: ThresholdCondition,
}

impl ValueObject for TaxRule {}

impl TaxRule {
    pub fn new(id: impl Into<String>, amount: Decimal, application_type: ApplicationType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            amount: Some(amount),
            application_type,
            tax_use: TaxUse::Increment,
            threshold: None,
            threshold_condition: ThresholdCondition::GreaterOrEqual,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn decrement(mut self) -> Self {
        self.tax_use = TaxUse::Decrement;
        self
    }

    pub fn with_threshold(mut self, threshold: Decimal, condition: ThresholdCondition) -> Self {
        self.threshold = Some(threshold);
        self.threshold_condition = condition;
        self
    }

    /// Whether `subtotal` satisfies this rule's threshold.
    pub fn passes(&self, subtotal: Decimal) -> bool {
        check_threshold(
            subtotal,
            self.threshold.unwrap_or(Decimal::ZERO),
            self.threshold_condition,
        )
    }
}
