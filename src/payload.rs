//! Restructures flat output rows into catalog update payloads.
//!
//! The mapping engine only emits strings. The catalog expects categories and
//! tags as `[{name}]` lists and attributes as `[{name, options, visible}]`,
//! so this module splits and groups the relevant fields:
//!
//! - `Categories` / `Tags` (any case) are split on commas.
//! - `Attribute N name` and `Attribute N value(s)` pair up by `N`.
//! - Every other non-empty field is sent under its snake_case name.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use heck::ToSnakeCase;
use regex::Regex;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::engine::OutputRow;

pub const DEFAULT_SKU_FIELD: &str = "SKU";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Row missing SKU")]
    MissingSku,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductUpdate {
    pub sku: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct AttributeParts {
    name: Option<String>,
    options: Option<Vec<String>>,
}

pub fn build_update(row: &OutputRow, sku_field: &str) -> Result<ProductUpdate, PayloadError> {
    let sku = row
        .get(sku_field)
        .map(str::trim)
        .filter(|sku| !sku.is_empty())
        .ok_or(PayloadError::MissingSku)?
        .to_string();

    let mut payload = Map::new();
    let mut attributes: BTreeMap<u32, AttributeParts> = BTreeMap::new();

    for (field, value) in row.iter() {
        if field == sku_field || value.is_empty() {
            continue;
        }
        let lowered = field.to_lowercase();
        if lowered == "categories" || lowered == "tags" {
            let names = split_list(value)
                .into_iter()
                .map(|name| json!({ "name": name }))
                .collect::<Vec<_>>();
            payload.insert(lowered, Value::Array(names));
        } else if is_attribute_field(&lowered) {
            let Some(number) = attribute_number(&lowered) else {
                continue;
            };
            let parts = attributes.entry(number).or_default();
            if lowered.contains("name") {
                parts.name = Some(value.to_string());
            } else {
                parts.options = Some(split_list(value));
            }
        } else {
            payload.insert(field.to_snake_case(), Value::String(value.to_string()));
        }
    }

    let attributes = attributes
        .into_values()
        .filter_map(|parts| match (parts.name, parts.options) {
            (Some(name), Some(options)) => Some(json!({
                "name": name,
                "options": options,
                "visible": true,
            })),
            _ => None,
        })
        .collect::<Vec<_>>();
    if !attributes.is_empty() {
        payload.insert("attributes".to_string(), Value::Array(attributes));
    }

    Ok(ProductUpdate {
        sku,
        payload: Value::Object(payload),
    })
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"attribute\s*(\d+)").expect("valid attribute pattern"))
}

fn is_attribute_field(lowered: &str) -> bool {
    lowered.contains("attribute") && (lowered.contains("name") || lowered.contains("value"))
}

/// Attribute slot of an already lowercased field name.
fn attribute_number(lowered: &str) -> Option<u32> {
    attribute_pattern()
        .captures(lowered)
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, &str)]) -> OutputRow {
        fields.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn categories_and_tags_become_name_lists() {
        let update = build_update(
            &row(&[
                ("SKU", "A1"),
                ("Categories", "Lamps, Office ,"),
                ("tags", "new"),
            ]),
            DEFAULT_SKU_FIELD,
        )
        .unwrap();
        assert_eq!(update.sku, "A1");
        assert_eq!(
            update.payload,
            json!({
                "categories": [{"name": "Lamps"}, {"name": "Office"}],
                "tags": [{"name": "new"}],
            })
        );
    }

    #[test]
    fn attributes_pair_by_number_in_numeric_order() {
        let update = build_update(
            &row(&[
                ("SKU", "A1"),
                ("Attribute 10 name", "Size"),
                ("Attribute 10 value(s)", "S, M"),
                ("Attribute 2 name", "Color"),
                ("Attribute 2 value(s)", "Red"),
                ("Attribute 3 name", "Orphan"),
            ]),
            DEFAULT_SKU_FIELD,
        )
        .unwrap();
        assert_eq!(
            update.payload["attributes"],
            json!([
                {"name": "Color", "options": ["Red"], "visible": true},
                {"name": "Size", "options": ["S", "M"], "visible": true},
            ])
        );
    }

    #[test]
    fn other_fields_use_snake_case_keys_and_skip_empty_values() {
        let update = build_update(
            &row(&[
                ("SKU", "A1"),
                ("Regular price", "9.99"),
                ("Short description", ""),
            ]),
            DEFAULT_SKU_FIELD,
        )
        .unwrap();
        assert_eq!(update.payload, json!({"regular_price": "9.99"}));
    }

    #[test]
    fn blank_sku_is_rejected() {
        let err = build_update(&row(&[("SKU", "  "), ("Name", "Lamp")]), DEFAULT_SKU_FIELD)
            .unwrap_err();
        assert_eq!(err, PayloadError::MissingSku);
        assert_eq!(err.to_string(), "Row missing SKU");
    }
}
