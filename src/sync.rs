//! Catalog synchronization: push transformed rows to matching products.
//!
//! Rows are processed sequentially and independently. A row that cannot be
//! turned into a payload, whose SKU is unknown, or whose update is rejected is
//! counted as failed with a message; the loop always continues.
//!
//! In dry-run mode only lookups are issued. For each product the report keeps
//! a [`ProductDiff`] of the fields the update would change.

use log::{debug, info};
use serde_json::Value;
use similar::TextDiff;

use crate::{
    catalog::{Catalog, Product},
    engine::OutputRow,
    payload::{DEFAULT_SKU_FIELD, build_update},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub sku_field: String,
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            sku_field: DEFAULT_SKU_FIELD.to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDiff {
    pub sku: String,
    pub product_id: u64,
    pub changes: Vec<FieldChange>,
}

impl ProductDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Unified diff of the changed fields, catalog side first.
    pub fn render(&self) -> String {
        let before = self
            .changes
            .iter()
            .map(|change| format!("{}: {}\n", change.field, change.before))
            .collect::<String>();
        let after = self
            .changes
            .iter()
            .map(|change| format!("{}: {}\n", change.field, change.after))
            .collect::<String>();
        TextDiff::from_lines(&before, &after)
            .unified_diff()
            .header(
                &format!("catalog {} (#{})", self.sku, self.product_id),
                &format!("import {}", self.sku),
            )
            .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    /// Dry-run products whose fields already match the import.
    pub unchanged: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub diffs: Vec<ProductDiff>,
}

impl SyncReport {
    /// True when rows failed and none was updated or compared.
    pub fn nothing_succeeded(&self) -> bool {
        self.failed > 0 && self.updated == 0 && self.unchanged == 0 && self.diffs.is_empty()
    }

    fn fail(&mut self, message: String) {
        debug!("{message}");
        self.failed += 1;
        self.errors.push(message);
    }
}

pub fn update_catalog<C>(catalog: &C, rows: &[OutputRow], options: &SyncOptions) -> SyncReport
where
    C: Catalog + ?Sized,
{
    let mut report = SyncReport::default();
    for row in rows {
        let update = match build_update(row, &options.sku_field) {
            Ok(update) => update,
            Err(err) => {
                report.fail(err.to_string());
                continue;
            }
        };
        let sku = update.sku.as_str();

        let product = match catalog.find_by_sku(sku) {
            Ok(Some(product)) => product,
            Ok(None) => {
                report.fail(format!("Product not found with SKU: {sku}"));
                continue;
            }
            Err(err) => {
                report.fail(format!("SKU {sku}: {err}"));
                continue;
            }
        };

        if options.dry_run {
            let diff = diff_product(sku, &product, &update.payload);
            if diff.is_empty() {
                report.unchanged += 1;
            } else {
                report.diffs.push(diff);
            }
            continue;
        }

        match catalog.update_product(product.id, &update.payload) {
            Ok(()) => {
                info!("Updated product #{} (SKU {sku})", product.id);
                report.updated += 1;
            }
            Err(err) => report.fail(format!("SKU {sku}: Update failed - {err}")),
        }
    }
    report
}

/// Fields of `payload` whose catalog value differs, in payload order.
pub fn diff_product(sku: &str, product: &Product, payload: &Value) -> ProductDiff {
    let changes = payload
        .as_object()
        .into_iter()
        .flatten()
        .filter_map(|(field, after)| {
            let before = product
                .data
                .get(field)
                .map(|value| display_value(field, value))
                .unwrap_or_default();
            let after = display_value(field, after);
            (before != after).then(|| FieldChange {
                field: field.clone(),
                before,
                after,
            })
        })
        .collect();
    ProductDiff {
        sku: sku.to_string(),
        product_id: product.id,
        changes,
    }
}

/// Comparable one-line rendering of a catalog field.
fn display_value(field: &str, value: &Value) -> String {
    match (field, value) {
        ("categories" | "tags", Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("name").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(", "),
        ("attributes", Value::Array(items)) => items
            .iter()
            .map(|item| {
                let name = item.get("name").and_then(Value::as_str).unwrap_or("");
                let options = item
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|options| {
                        options
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("|")
                    })
                    .unwrap_or_default();
                format!("{name}={options}")
            })
            .collect::<Vec<_>>()
            .join("; "),
        (_, Value::String(text)) => text.clone(),
        (_, Value::Null) => String::new(),
        (_, other) => other.to_string(),
    }
}
