//! Decimal helpers for money and quantities.
//!
//! Every amount in the engine is a [`Decimal`]. Values coming from the wire are
//! parsed leniently: an empty cell, `null` or junk becomes `None` rather than an
//! error, because half-typed draft orders are a normal state.

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places for every boundary-visible money/quantity value.
pub const DISPLAY_DP: u32 = 2;

/// Round to 2 decimal places, half away from zero, and pin the scale at 2 so
/// `100` renders as `"100.00"`.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(DISPLAY_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DISPLAY_DP);
    rounded
}

/// Parse a user/wire string into a decimal.
///
/// Accepts plain and scientific notation. Blank or non-numeric input yields
/// `None`.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Interpret a JSON value as a decimal (number or numeric string).
pub fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => parse_decimal(&n.to_string()),
        serde_json::Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Serde adapter for `Option<Decimal>` wire fields.
///
/// Serializes through `rust_decimal`'s own serde support, so every digit
/// survives (a decimal string, or `null`). Deserializes numbers, numeric
/// strings, `""`, `null` and anything else, mapping non-numeric input to
/// `None`. Use with `#[serde(default, with = "orderdesk_core::numeric::lenient")]`.
pub mod lenient {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::decimal_from_json;

    pub fn serialize<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(decimal_from_json))
    }
}
