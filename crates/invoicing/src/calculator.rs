//! Three-pass tax cascade.
//!
//! 1. Preliminary subtotal over every valid line (IVA-inclusive prices are
//!    backed out by dividing by 1.19).
//! 2. `product-depending-subtotal` rules are switched on or off against that
//!    preliminary subtotal.
//! 3. Per-line pass: line bases are recomputed and every applicable rule adds
//!    `round2(base * rate)`. When an IVA-inclusive line carries a single rate
//!    within 0.01 of 0.19, its base becomes `gross - tax` so that base and tax
//!    add back up to the gross amount.
//!
//! Retentions (`subtotal` rules) are then gated and computed on the final
//! subtotal from pass 3, and `self-retention` rules are only reported.
//!
//! Lines carrying several rates on an IVA-inclusive price keep the division
//! based base; only the single-rate case is corrected.
//!
//! All arithmetic is checked. A line or tax whose amount does not fit in a
//! `Decimal` contributes nothing and is reported as a warning.

use rust_decimal::Decimal;
use tracing::warn;

use orderdesk_core::round2;
use orderdesk_orders::{LineList, OrderDocument, OrderLine, QuantityBasis};

use crate::summary::{LineDetail, TaxLine, TaxResult, TaxWarning};
use crate::tax::{ApplicationType, TaxRule, TaxUse};

/// IVA multiplier embedded in inclusive prices.
pub const IVA_RATE: Decimal = Decimal::from_parts(119, 0, 0, false, 2);

const IVA_PURE_RATE: Decimal = Decimal::from_parts(19, 0, 0, false, 2);
const IVA_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Quantity and amounts a line is invoiced on.
struct Billable<'a> {
    line: &'a OrderLine,
    price: Decimal,
    quantity: Decimal,
    gross: Decimal,
    /// Gross amount without IVA.
    base: Decimal,
}

impl<'a> Billable<'a> {
    fn new(line: &'a OrderLine, price: Decimal, quantity: Decimal) -> Option<Self> {
        let percentage = line.invoice_percentage.unwrap_or(HUNDRED);
        let quantity = quantity.checked_mul(percentage)?.checked_div(HUNDRED)?;
        let gross = price.checked_mul(quantity)?;
        let base = if line.iva_included {
            gross.checked_div(IVA_RATE)?
        } else {
            gross
        };
        Some(Self {
            line,
            price,
            quantity,
            gross,
            base,
        })
    }

    /// Rule amounts for this line, in `rules` order, plus their sum.
    fn taxes(&self, rules: &[&TaxRule]) -> Option<(Vec<Decimal>, Decimal)> {
        let mut values = Vec::with_capacity(rules.len());
        let mut sum = Decimal::ZERO;
        for rule in rules {
            let value = round2(self.base.checked_mul(rule.amount.unwrap_or(Decimal::ZERO))?);
            sum = sum.checked_add(value)?;
            values.push(value);
        }
        Some((values, sum))
    }

    fn detail(&self, base: Decimal, tax: Decimal) -> LineDetail {
        LineDetail {
            line_id: self.line.id,
            name: self
                .line
                .product
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            unit_price_excl: round2(if self.line.iva_included {
                self.price / IVA_RATE
            } else {
                self.price
            }),
            quantity: round2(self.quantity),
            line_base: round2(base),
            tax: round2(tax),
        }
    }
}

pub struct TaxCascadeCalculator<'a> {
    rules: &'a [TaxRule],
}

impl<'a> TaxCascadeCalculator<'a> {
    pub fn new(rules: &'a [TaxRule]) -> Self {
        Self { rules }
    }

    /// Compute with the quantity basis implied by the document state.
    pub fn compute_document(&self, doc: &OrderDocument) -> TaxResult {
        self.compute(&doc.lines, QuantityBasis::for_state(doc.state))
    }

    pub fn compute(&self, lines: &LineList, basis: QuantityBasis) -> TaxResult {
        let mut warnings = Vec::new();
        let (billable, preliminary) = collect_billable(lines, basis, &mut warnings);

        for rule in self.rules {
            if rule.application_type == ApplicationType::Unrecognized {
                warnings.push(TaxWarning::UnrecognizedApplicationType { tax_id: rule.id.clone() });
            } else if rule.amount.is_none() {
                warnings.push(TaxWarning::NonNumericRate { tax_id: rule.id.clone() });
            }
            if rule.tax_use == TaxUse::Unrecognized {
                warnings.push(TaxWarning::UnrecognizedUse { tax_id: rule.id.clone() });
            }
        }

        // Pass 2.
        let line_rules: Vec<&TaxRule> = self
            .rules
            .iter()
            .filter(|rule| match rule.application_type {
                ApplicationType::Product => true,
                ApplicationType::ProductDependingSubtotal => rule.passes(preliminary),
                _ => false,
            })
            .collect();

        // Pass 3.
        let mut accumulated = vec![Decimal::ZERO; line_rules.len()];
        let mut subtotal = Decimal::ZERO;
        let mut per_line = Vec::with_capacity(billable.len());
        for entry in &billable {
            let committed = entry.taxes(&line_rules).and_then(|(values, line_tax)| {
                let base = if entry.line.iva_included && is_single_pure_iva(&line_rules) {
                    entry.gross.checked_sub(line_tax)?
                } else {
                    entry.base
                };
                let next_subtotal = subtotal.checked_add(base)?;
                let next_accumulated = accumulated
                    .iter()
                    .zip(&values)
                    .map(|(total, value)| total.checked_add(*value))
                    .collect::<Option<Vec<_>>>()?;
                Some((base, line_tax, next_subtotal, next_accumulated))
            });
            match committed {
                Some((base, line_tax, next_subtotal, next_accumulated)) => {
                    subtotal = next_subtotal;
                    accumulated = next_accumulated;
                    per_line.push(entry.detail(base, line_tax));
                }
                None => warnings.push(TaxWarning::LineOutOfRange { line_id: entry.line.id }),
            }
        }
        let subtotal = round2(subtotal);

        let taxes: Vec<TaxLine> = line_rules
            .iter()
            .zip(accumulated)
            .map(|(rule, amount)| tax_line(rule, amount))
            .collect();

        // Retentions and informational amounts use the final subtotal.
        let mut on_subtotal = |kind: ApplicationType| -> Vec<TaxLine> {
            let mut found = Vec::new();
            for rule in self.rules {
                if rule.application_type != kind || !rule.passes(subtotal) {
                    continue;
                }
                match subtotal.checked_mul(rule.amount.unwrap_or(Decimal::ZERO)) {
                    Some(amount) => found.push(tax_line(rule, amount)),
                    None => warnings.push(TaxWarning::TaxOutOfRange { tax_id: rule.id.clone() }),
                }
            }
            found
        };
        let retentions = on_subtotal(ApplicationType::Subtotal);
        let informational = on_subtotal(ApplicationType::SelfRetention);

        let mut total = subtotal;
        for tax in taxes.iter().chain(&retentions) {
            match total.checked_add(tax.tax_use.signed(tax.amount)) {
                Some(next) => total = next,
                None => warnings.push(TaxWarning::TaxOutOfRange { tax_id: tax.id.clone() }),
            }
        }
        let total = round2(total);

        for warning in &warnings {
            warn!(%warning, "tax computation degraded");
        }

        TaxResult {
            subtotal,
            taxes,
            retentions,
            informational,
            total,
            per_line,
            warnings,
        }
    }
}

/// Lines that can be invoiced, and the preliminary subtotal over them.
fn collect_billable<'l>(
    lines: &'l LineList,
    basis: QuantityBasis,
    warnings: &mut Vec<TaxWarning>,
) -> (Vec<Billable<'l>>, Decimal) {
    let mut billable = Vec::new();
    let mut preliminary = Decimal::ZERO;
    for line in lines.product_lines() {
        let Some(price) = line.price else {
            warnings.push(TaxWarning::MissingPrice { line_id: line.id });
            continue;
        };
        let Some(quantity) = basis.quantity_of(line) else {
            warnings.push(TaxWarning::MissingQuantity { line_id: line.id });
            continue;
        };
        let entry = Billable::new(line, price, quantity)
            .and_then(|entry| Some((preliminary.checked_add(entry.base)?, entry)));
        match entry {
            Some((next, entry)) => {
                preliminary = next;
                billable.push(entry);
            }
            None => warnings.push(TaxWarning::LineOutOfRange { line_id: line.id }),
        }
    }
    (billable, preliminary)
}

fn is_single_pure_iva(rules: &[&TaxRule]) -> bool {
    match rules {
        [only] => only
            .amount
            .and_then(|rate| rate.checked_sub(IVA_PURE_RATE))
            .is_some_and(|gap| gap.abs() < IVA_TOLERANCE),
        _ => false,
    }
}

fn tax_line(rule: &TaxRule, amount: Decimal) -> TaxLine {
    TaxLine {
        id: rule.id.clone(),
        name: rule.name.clone(),
        amount: round2(amount),
        tax_use: rule.tax_use,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderdesk_core::DocumentId;
    use orderdesk_inventory::Item;
    use orderdesk_orders::DocumentState;
    use orderdesk_products::ProductRef;
    use proptest::prelude::*;

    use crate::tax::ThresholdCondition;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(id: &str, price: &str, requested: &str, iva_included: bool) -> OrderLine {
        let mut line = OrderLine::for_product(ProductRef::new(id, format!("Product {id}")), "");
        line.price = Some(dec(price));
        line.iva_included = iva_included;
        line.requested_quantity = Some(dec(requested));
        line
    }

    fn lines(lines: Vec<OrderLine>) -> LineList {
        LineList::from_lines(lines, "")
    }

    fn iva() -> TaxRule {
        TaxRule::new("iva", dec("0.19"), ApplicationType::Product).named("IVA")
    }

    #[test]
    fn iva_inclusive_price_backs_out_exactly() {
        let rules = [iva()];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "119", "1", true)]), QuantityBasis::Requested);

        assert_eq!(result.per_line[0].line_base, dec("100.00"));
        assert_eq!(result.tax("iva").unwrap().amount, dec("19.00"));
        assert_eq!(result.subtotal, dec("100.00"));
        assert_eq!(result.total, dec("119.00"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn exported_amounts_carry_two_decimal_places() {
        let rules = [iva()];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "100", "1", false)]), QuantityBasis::Requested);

        assert_eq!(result.subtotal.to_string(), "100.00");
        assert_eq!(result.total.to_string(), "119.00");
        assert_eq!(result.per_line[0].line_base.to_string(), "100.00");
        assert_eq!(result.per_line[0].quantity.to_string(), "1.00");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["subtotal"], "100.00");
        assert_eq!(json["taxes"][0]["amount"], "19.00");
    }

    #[test]
    fn rule_without_use_is_subtracted() {
        let rules: Vec<TaxRule> =
            serde_json::from_str(r#"[{"id": "rete", "amount": 0.1, "applicationType": "subtotal"}]"#).unwrap();
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "100", "1", false)]), QuantityBasis::Requested);

        assert_eq!(result.retention("rete").unwrap().amount, dec("10.00"));
        assert_eq!(result.total.to_string(), "90.00");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn unrecognized_use_is_subtracted_with_a_warning() {
        let rules: Vec<TaxRule> = serde_json::from_str(
            r#"[{"id": "x", "amount": 0.1, "applicationType": "product", "use": "maybe"}]"#,
        )
        .unwrap();
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "100", "1", false)]), QuantityBasis::Requested);

        assert_eq!(result.total, dec("90.00"));
        assert_eq!(result.warnings, vec![TaxWarning::UnrecognizedUse { tax_id: "x".into() }]);
    }

    #[test]
    fn amounts_too_large_for_a_decimal_are_skipped() {
        let mut huge = line("A", "0", "0", false);
        huge.price = Some(Decimal::from_i128_with_scale(10i128.pow(20), 0));
        huge.requested_quantity = Some(Decimal::from(10_000_000_000i64));
        let huge_id = huge.id;
        let result = TaxCascadeCalculator::new(&[])
            .compute(&lines(vec![huge, line("B", "10", "1", false)]), QuantityBasis::Requested);
        assert_eq!(result.subtotal, dec("10.00"));
        assert_eq!(result.warnings, vec![TaxWarning::LineOutOfRange { line_id: huge_id }]);

        let rules = [TaxRule::new("rete", Decimal::from_i128_with_scale(10i128.pow(28), 0), ApplicationType::Subtotal).decrement()];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("B", "10", "1", false)]), QuantityBasis::Requested);
        assert!(result.retention("rete").is_none());
        assert_eq!(result.total, dec("10.00"));
        assert_eq!(result.warnings, vec![TaxWarning::TaxOutOfRange { tax_id: "rete".into() }]);
    }

    #[test]
    fn single_iva_correction_keeps_base_plus_tax_equal_to_gross() {
        let rules = [iva()];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "100", "1", true)]), QuantityBasis::Requested);

        assert_eq!(result.tax("iva").unwrap().amount, dec("15.97"));
        assert_eq!(result.subtotal, dec("84.03"));
        assert_eq!(result.total, dec("100.00"));
    }

    #[test]
    fn several_rates_on_an_inclusive_line_keep_the_division_base() {
        let rules = [
            iva(),
            TaxRule::new("ico", dec("0.08"), ApplicationType::Product),
        ];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "100", "1", true)]), QuantityBasis::Requested);

        // 100 / 1.19 = 84.0336..., no gross-minus-tax correction.
        assert_eq!(result.subtotal, dec("84.03"));
        assert_eq!(result.tax("iva").unwrap().amount, dec("15.97"));
        assert_eq!(result.tax("ico").unwrap().amount, dec("6.72"));
        assert_eq!(result.total, dec("106.72"));
    }

    #[test]
    fn conditional_rule_is_gated_on_the_preliminary_subtotal() {
        let rules = [TaxRule::new("cond", dec("0.01"), ApplicationType::ProductDependingSubtotal)
            .with_threshold(dec("500000"), ThresholdCondition::GreaterOrEqual)];
        let calc = TaxCascadeCalculator::new(&rules);

        let below = calc.compute(&lines(vec![line("A", "499999.99", "1", false)]), QuantityBasis::Requested);
        assert!(below.tax("cond").is_none());
        assert_eq!(below.total, dec("499999.99"));

        let at = calc.compute(&lines(vec![line("A", "500000.00", "1", false)]), QuantityBasis::Requested);
        assert_eq!(at.tax("cond").unwrap().amount, dec("5000.00"));
        assert_eq!(at.total, dec("505000.00"));
    }

    #[test]
    fn retention_threshold_uses_the_final_subtotal() {
        // Preliminary subtotal is 84.0336..., final subtotal is 84.03.
        let rules = [
            iva(),
            TaxRule::new("rete", dec("0.10"), ApplicationType::Subtotal)
                .decrement()
                .with_threshold(dec("84.03"), ThresholdCondition::LessOrEqual),
        ];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "100", "1", true)]), QuantityBasis::Requested);

        assert_eq!(result.retention("rete").unwrap().amount, dec("8.40"));
        assert_eq!(result.total, dec("91.60"));
    }

    #[test]
    fn self_retention_is_reported_but_not_applied() {
        let rules = [
            TaxRule::new("auto", dec("0.04"), ApplicationType::SelfRetention).decrement(),
        ];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![line("A", "1000", "1", false)]), QuantityBasis::Requested);

        assert_eq!(result.informational[0].amount, dec("40.00"));
        assert_eq!(result.total, dec("1000.00"));
        assert!(result.retentions.is_empty());
    }

    #[test]
    fn invoice_percentage_scales_the_quantity() {
        let mut half = line("A", "10", "3", false);
        half.invoice_percentage = Some(dec("50"));
        let result = TaxCascadeCalculator::new(&[])
            .compute(&lines(vec![half]), QuantityBasis::Requested);
        assert_eq!(result.subtotal, dec("15.00"));
        assert_eq!(result.per_line[0].quantity, dec("1.50"));
    }

    #[test]
    fn broken_inputs_degrade_to_warnings() {
        let mut no_price = line("A", "1", "1", false);
        no_price.price = None;
        let mut no_qty = line("B", "1", "1", false);
        no_qty.requested_quantity = None;
        let ok = line("C", "10", "1", false);
        let mut junk_rate = iva();
        junk_rate.amount = None;
        let mut odd = TaxRule::new("odd", dec("0.5"), ApplicationType::Product);
        odd.application_type = ApplicationType::Unrecognized;

        let rules = [junk_rate, odd];
        let result = TaxCascadeCalculator::new(&rules)
            .compute(&lines(vec![no_price, no_qty, ok]), QuantityBasis::Requested);

        assert_eq!(result.subtotal, dec("10.00"));
        assert_eq!(result.total, dec("10.00"));
        assert_eq!(result.tax("iva").unwrap().amount, Decimal::ZERO);
        assert!(result.tax("odd").is_none());
        assert_eq!(result.warnings.len(), 4);
    }

    #[test]
    fn confirmed_documents_invoice_entered_items() {
        let mut l = line("A", "10", "100", false);
        l.items.push(Item::new(Some(dec("2")), "", "1"));
        l.items.push(Item::new(Some(dec("3")), "", "2"));
        let mut doc = OrderDocument::new(DocumentId::from("D1"), "");
        doc.lines = lines(vec![l]);

        let calc = TaxCascadeCalculator::new(&[]);
        assert_eq!(calc.compute_document(&doc).subtotal, dec("1000.00"));
        doc.state = DocumentState::Confirmed;
        assert_eq!(calc.compute_document(&doc).subtotal, dec("50.00"));
    }

    proptest! {
        #[test]
        fn plain_lines_total_is_subtotal_plus_rounded_taxes(
            cents in prop::collection::vec((1i64..10_000_000, 1i64..500), 1..8),
        ) {
            let list = lines(
                cents
                    .iter()
                    .enumerate()
                    .map(|(i, (price, qty))| {
                        let mut l = line(&i.to_string(), "0", "0", false);
                        l.price = Some(Decimal::new(*price, 2));
                        l.requested_quantity = Some(Decimal::from(*qty));
                        l
                    })
                    .collect(),
            );
            let rules = [iva()];
            let result = TaxCascadeCalculator::new(&rules).compute(&list, QuantityBasis::Requested);

            let tax = result.tax("iva").unwrap().amount;
            prop_assert_eq!(result.total, result.subtotal + tax);
            prop_assert_eq!(result.subtotal, result.subtotal.round_dp(2));
        }
    }
}
