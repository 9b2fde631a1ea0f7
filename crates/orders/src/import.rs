//! Bulk import of spreadsheet rows into the line list.
//!
//! Import runs in two phases:
//!
//! 1. [`BulkReconciler::resolve`] validates and groups the rows, then resolves
//!    every group to a product: lines already in the document first, then the
//!    catalog page the view already holds, and only then the remote
//!    [`CatalogLookup`]. This is the only async part and it can be cancelled.
//! 2. [`ResolvedImport::apply`] merges the resolved groups into a
//!    [`LineList`] in one synchronous step.
//!
//! Nothing touches the document until phase 2, so a failed or cancelled
//! resolution leaves it exactly as it was.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use orderdesk_core::numeric::lenient;
use orderdesk_core::{ValueObject, round2};
use orderdesk_inventory::Item;
use orderdesk_products::{CatalogLookup, CatalogPage, ProductRef, normalize_key};

use crate::line::{LineList, OrderLine};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("invalid file format: no row has a quantity and an identifier or name")]
    InvalidFileFormat,
    #[error("import cancelled")]
    Cancelled,
}

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    #[serde(default, alias = "id")]
    pub identifier: Option<String>,
    /// Product code column; used when the row has no identifier.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, with = "lenient")]
    pub quantity: Option<Decimal>,
    #[serde(default, alias = "lot")]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub item_number: Option<String>,
}

impl ValueObject for ImportRow {}

impl ImportRow {
    pub fn new(identifier: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            identifier: Some(identifier.into()),
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            name: Some(name.into()),
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn with_lot(mut self, lot: impl Into<String>) -> Self {
        self.lot_number = Some(lot.into());
        self
    }

    pub fn with_item_number(mut self, number: impl Into<String>) -> Self {
        self.item_number = Some(number.into());
        self
    }

    /// Raw identifier, else code, else name; blanks are skipped.
    fn label(&self) -> Option<&str> {
        non_blank(self.identifier.as_deref())
            .or_else(|| non_blank(self.code.as_deref()))
            .or_else(|| non_blank(self.name.as_deref()))
    }

    pub fn is_valid(&self) -> bool {
        self.quantity.is_some() && self.label().is_some()
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOptions {
    /// Leave exactly one ghost line at the tail once the merge is done.
    pub ensure_empty_row: bool,
}

/// Outcome of an applied import.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub lines_created: usize,
    pub lines_updated: usize,
    pub items_added: usize,
    /// Identifiers/names that resolved to no product, in file order.
    pub not_found: Vec<String>,
    /// Rows without a quantity or without an identifier and name.
    pub skipped_rows: usize,
    pub merged_duplicates: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct RowGroup {
    /// Normalized match key.
    key: String,
    /// First raw spelling seen, used for remote lookup and reporting.
    label: String,
    rows: Vec<ImportRow>,
}

/// Groups resolved to products, ready to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImport {
    resolved: Vec<(ProductRef, Vec<ImportRow>)>,
    not_found: Vec<String>,
    skipped_rows: usize,
}

impl ResolvedImport {
    pub fn not_found(&self) -> &[String] {
        &self.not_found
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    /// Merge into `lines`.
    ///
    /// A product that already has a line gets the new items appended; its
    /// requested quantity is only filled in when it was empty. Otherwise a
    /// new line is inserted before the trailing ghost line.
    pub fn apply(self, lines: &mut LineList, options: ImportOptions) -> ImportReport {
        let mut report = ImportReport {
            not_found: self.not_found,
            skipped_rows: self.skipped_rows,
            ..ImportReport::default()
        };

        for (product, rows) in self.resolved {
            let requested = round2(
                rows.iter()
                    .filter_map(|row| row.quantity)
                    .fold(Decimal::ZERO, Decimal::saturating_add),
            );
            match lines.find_same_product_mut(&product) {
                Some(line) => {
                    report.items_added += append_rows(line, rows);
                    if line.requested_quantity.is_none() {
                        line.requested_quantity = Some(requested);
                    }
                    report.lines_updated += 1;
                }
                None => {
                    let mut line = OrderLine::for_product(product, lines.default_lot());
                    report.items_added += append_rows(&mut line, rows);
                    line.requested_quantity = Some(requested);
                    lines.insert_before_ghost(line);
                    report.lines_created += 1;
                }
            }
        }

        report.merged_duplicates = lines.dedupe();
        if options.ensure_empty_row {
            lines.ensure_empty_row();
        }

        info!(
            created = report.lines_created,
            updated = report.lines_updated,
            items = report.items_added,
            not_found = report.not_found.len(),
            skipped = report.skipped_rows,
            "import applied"
        );
        report
    }
}

/// Items get fresh client ids; missing item numbers continue the line's
/// numbering and missing lots fall back to the default lot.
fn append_rows(line: &mut OrderLine, rows: Vec<ImportRow>) -> usize {
    let mut added = 0;
    for row in rows {
        let lot = row
            .lot_number
            .filter(|lot| !lot.trim().is_empty())
            .unwrap_or_else(|| line.items.default_lot().to_string());
        let number = row
            .item_number
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| line.items.next_item_number());
        if line.items.push(Item::new(row.quantity, lot, number)) {
            added += 1;
        }
    }
    added
}

/// Resolves import rows against local state and the catalog.
pub struct BulkReconciler<'a, C: ?Sized> {
    catalog: &'a C,
    page: Option<&'a CatalogPage>,
}

impl<'a, C> BulkReconciler<'a, C>
where
    C: CatalogLookup + ?Sized,
{
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog, page: None }
    }

    /// Use products the view already fetched before going remote.
    pub fn with_page(mut self, page: &'a CatalogPage) -> Self {
        self.page = Some(page);
        self
    }

    pub async fn resolve(
        &self,
        lines: &LineList,
        rows: Vec<ImportRow>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedImport, ImportError> {
        let total = rows.len();
        let groups = group_rows(rows);
        let valid: usize = groups.iter().map(|g| g.rows.len()).sum();
        if valid == 0 {
            warn!(rows = total, "import rejected: no valid rows");
            return Err(ImportError::InvalidFileFormat);
        }

        let mut resolved = Vec::with_capacity(groups.len());
        let mut not_found = Vec::new();
        for group in groups {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            match self.resolve_group(lines, &group, cancel).await? {
                Some(product) => resolved.push((product, group.rows)),
                None => not_found.push(group.label),
            }
        }

        Ok(ResolvedImport {
            resolved,
            not_found,
            skipped_rows: total - valid,
        })
    }

    async fn resolve_group(
        &self,
        lines: &LineList,
        group: &RowGroup,
        cancel: &CancellationToken,
    ) -> Result<Option<ProductRef>, ImportError> {
        let local = lines
            .product_lines()
            .filter_map(|line| line.product.as_ref())
            .find(|product| product.matches_key(&group.key));
        if let Some(product) = local {
            return Ok(Some(product.clone()));
        }
        if let Some(product) = self.page.and_then(|page| page.find(&group.key)) {
            return Ok(Some(product.clone()));
        }

        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImportError::Cancelled),
            result = self.catalog.find_product(&group.label) => result,
        };
        match lookup {
            Ok(found) => Ok(found),
            Err(err) => {
                warn!(identifier = %group.label, error = %err, "catalog lookup failed; treating as not found");
                Ok(None)
            }
        }
    }
}

/// Valid rows grouped by normalized key, in order of first appearance.
fn group_rows(rows: Vec<ImportRow>) -> Vec<RowGroup> {
    let mut groups: Vec<RowGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in rows.into_iter().filter(ImportRow::is_valid) {
        let Some(label) = row.label().map(str::to_string) else {
            continue;
        };
        let key = normalize_key(&label);
        match index.get(&key) {
            Some(&at) => groups[at].rows.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(RowGroup {
                    key,
                    label,
                    rows: vec![row],
                });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orderdesk_products::{CatalogError, InMemoryCatalog};

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            ProductRef::new("P1", "Arroz").with_code("ARZ").with_price(dec(3000), false),
            ProductRef::new("P2", "Frijol").with_price(dec(119), true),
        ])
    }

    async fn import(
        lines: &mut LineList,
        catalog: &InMemoryCatalog,
        rows: Vec<ImportRow>,
    ) -> Result<ImportReport, ImportError> {
        let token = CancellationToken::new();
        let resolved = BulkReconciler::new(catalog).resolve(lines, rows, &token).await?;
        Ok(resolved.apply(lines, ImportOptions { ensure_empty_row: true }))
    }

    #[tokio::test]
    async fn rows_are_grouped_and_become_one_line_per_product() {
        let catalog = catalog();
        let mut lines = LineList::new("GEN");
        let rows = vec![
            ImportRow::new("ARZ", dec(2)).with_lot("L1"),
            ImportRow::new(" arz ", dec(3)),
            ImportRow::named("Frijol", dec(1)).with_item_number("9"),
        ];

        let report = import(&mut lines, &catalog, rows).await.unwrap();

        assert_eq!(report.lines_created, 2);
        assert_eq!(report.items_added, 3);
        assert_eq!(lines.len(), 3);
        assert!(lines.trailing_ghost().is_some());

        let arroz = &lines.lines()[0];
        assert_eq!(arroz.requested_quantity, Some(dec(5)));
        assert_eq!(arroz.price, Some(dec(3000)));
        let items: Vec<_> = arroz.items.items().collect();
        assert_eq!(items[0].lot_number, "L1");
        assert_eq!(items[1].lot_number, "GEN");
        assert_eq!(items[1].item_number, "2");

        let frijol = &lines.lines()[1];
        assert!(frijol.iva_included);
        assert_eq!(frijol.items.items().next().unwrap().item_number, "9");
    }

    #[tokio::test]
    async fn no_valid_row_is_an_invalid_file_and_changes_nothing() {
        let catalog = catalog();
        let mut lines = LineList::new("");
        lines.ensure_empty_row();
        let before = lines.clone();

        let empty = import(&mut lines, &catalog, vec![]).await;
        assert_eq!(empty, Err(ImportError::InvalidFileFormat));

        let junk = vec![ImportRow::default(), ImportRow { quantity: None, ..ImportRow::new("P1", dec(1)) }];
        assert_eq!(import(&mut lines, &catalog, junk).await, Err(ImportError::InvalidFileFormat));
        assert_eq!(lines, before);
    }

    #[tokio::test]
    async fn invalid_rows_are_skipped_and_misses_are_aggregated() {
        let catalog = catalog();
        let mut lines = LineList::new("");
        let rows = vec![
            ImportRow::new("P1", dec(1)),
            ImportRow::named("  ", dec(1)),
            ImportRow::new("NOPE", dec(1)),
            ImportRow::new("nope", dec(2)),
            ImportRow::new("GONE", dec(1)),
        ];

        let report = import(&mut lines, &catalog, rows).await.unwrap();

        assert_eq!(report.skipped_rows, 1);
        assert_eq!(report.not_found, vec!["NOPE".to_string(), "GONE".to_string()]);
        assert_eq!(report.lines_created, 1);
    }

    #[tokio::test]
    async fn existing_line_gets_items_and_keeps_its_requested_quantity() {
        let catalog = catalog();
        let mut line = OrderLine::for_product(ProductRef::new("P1", "Arroz").with_code("ARZ"), "");
        line.requested_quantity = Some(dec(50));
        let mut lines = LineList::from_lines(vec![line], "");

        let report = import(&mut lines, &catalog, vec![ImportRow::new("arz", dec(4))]).await.unwrap();

        assert_eq!(report.lines_updated, 1);
        assert_eq!(report.lines_created, 0);
        assert_eq!(lines.product_lines().count(), 1);
        let merged = &lines.lines()[0];
        assert_eq!(merged.requested_quantity, Some(dec(50)));
        assert_eq!(merged.confirmed_quantity(), dec(4));
        assert_eq!(catalog.lookups(), 0);
    }

    #[tokio::test]
    async fn catalog_page_short_circuits_remote_lookup() {
        let catalog = catalog();
        let page = CatalogPage::new(vec![ProductRef::new("P9", "Sal")]);
        let lines = LineList::new("");
        let token = CancellationToken::new();

        let resolved = BulkReconciler::new(&catalog)
            .with_page(&page)
            .resolve(&lines, vec![ImportRow::named("sal", dec(1))], &token)
            .await
            .unwrap();

        assert_eq!(resolved.resolved_len(), 1);
        assert_eq!(catalog.lookups(), 0);
    }

    #[tokio::test]
    async fn repeated_imports_never_duplicate_lines() {
        let catalog = catalog();
        let mut lines = LineList::new("");
        for _ in 0..3 {
            import(&mut lines, &catalog, vec![ImportRow::new("P1", dec(1)), ImportRow::new("P2", dec(1))])
                .await
                .unwrap();
        }
        assert_eq!(lines.product_lines().count(), 2);
        assert_eq!(lines.lines()[0].confirmed_quantity(), dec(3));
        assert_eq!(lines.lines()[0].requested_quantity, Some(dec(1)));
    }

    #[tokio::test]
    async fn cancelled_resolution_applies_nothing() {
        let catalog = catalog();
        let lines = LineList::new("");
        let token = CancellationToken::new();
        token.cancel();

        let result = BulkReconciler::new(&catalog)
            .resolve(&lines, vec![ImportRow::new("P1", dec(1))], &token)
            .await;

        assert_eq!(result, Err(ImportError::Cancelled));
        assert_eq!(catalog.lookups(), 0);
    }

    struct FailingCatalog;

    #[async_trait]
    impl CatalogLookup for FailingCatalog {
        async fn find_product(&self, _: &str) -> Result<Option<ProductRef>, CatalogError> {
            Err(CatalogError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn lookup_failures_count_as_misses() {
        let lines = LineList::new("");
        let token = CancellationToken::new();
        let resolved = BulkReconciler::new(&FailingCatalog)
            .resolve(&lines, vec![ImportRow::new("P1", dec(1))], &token)
            .await
            .unwrap();
        assert_eq!(resolved.not_found(), ["P1".to_string()]);
    }

    #[test]
    fn rows_deserialize_from_loose_json() {
        let json = r#"[{"code": "ARZ", "quantity": "2"}, {"name": "Sal", "quantity": ""}]"#;
        let rows: Vec<ImportRow> = serde_json::from_str(json).unwrap();
        assert!(rows[0].is_valid());
        assert!(!rows[1].is_valid());
    }

    #[test]
    fn rows_with_both_id_and_code_prefer_the_id() {
        let json = r#"[{"id": "P1", "code": "ARZ", "quantity": 1}, {"id": " ", "code": "ARZ", "quantity": 1}]"#;
        let rows: Vec<ImportRow> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].label(), Some("P1"));
        assert_eq!(rows[1].label(), Some("ARZ"));
    }
}
