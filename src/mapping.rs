//! Mapping documents and rule parsing.
//!
//! A mapping document is a YAML or JSON object whose keys are output field
//! names and whose values describe how each field is derived from an input
//! row. Four value shapes are accepted:
//!
//! - `"Column"` copies a single input column.
//! - `"key(Some Value)"` emits a constant.
//! - `["Brand", "Description"]` joins several columns with a space.
//! - `{concat: [...], sep: " - "}` joins with a custom separator, and
//!   `{key: "Some Value"}` (any single key/value pair) emits a constant.
//!
//! Parsing happens once, up front, into a [`MappingConfig`]. Rule shapes that
//! match none of the above are always rejected with
//! [`MappingError::ConfigParse`], independent of strict mode.

use std::{
    collections::BTreeSet,
    fmt,
    fs,
    path::Path,
    str::FromStr,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Separator used by list rules and by `concat` rules without `sep`.
pub const DEFAULT_SEPARATOR: &str = " ";

const CONCAT_KEY: &str = "concat";
const SEP_KEY: &str = "sep";
const MISSING_KEY: &str = "missing";

/// Errors raised while loading a mapping or applying it to rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The document itself is unreadable or its root is not an object.
    #[error("invalid mapping document: {0}")]
    Document(String),

    /// A rule has a shape that is not recognised.
    #[error("invalid rule for output field '{field}': {reason}")]
    ConfigParse { field: String, reason: String },

    /// A referenced column is absent while running in strict mode.
    #[error("missing column '{column}' for output field '{field}' (row index {row})")]
    MissingColumn {
        field: String,
        column: String,
        row: usize,
    },
}

impl MappingError {
    fn rule(field: &str, reason: impl Into<String>) -> Self {
        MappingError::ConfigParse {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// How a `Concat` rule treats columns that are absent from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatPolicy {
    /// The missing column contributes an empty string; its separator stays.
    #[default]
    Pad,
    /// The missing column is dropped before joining.
    Skip,
}

impl ConcatPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConcatPolicy::Pad => "pad",
            ConcatPolicy::Skip => "skip",
        }
    }
}

impl fmt::Display for ConcatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConcatPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pad" => Ok(ConcatPolicy::Pad),
            "skip" => Ok(ConcatPolicy::Skip),
            other => Err(format!(
                "Unknown missing-column policy '{other}' (expected 'pad' or 'skip')"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingRule {
    DirectColumn(String),
    ConstantField {
        key: String,
        value: String,
    },
    Concat {
        columns: Vec<String>,
        separator: String,
        /// Per-rule override of the run's [`ConcatPolicy`].
        missing: Option<ConcatPolicy>,
    },
}

impl MappingRule {
    /// Parses a bare string rule: `key(value)` is a constant, anything else a
    /// column name.
    pub fn parse_str(field: &str, raw: &str) -> std::result::Result<Self, MappingError> {
        if let Some(captures) = constant_pattern().captures(raw.trim()) {
            let key = captures.get(1).map_or("key", |m| m.as_str());
            let value = captures.get(2).map_or("", |m| m.as_str());
            return Ok(MappingRule::ConstantField {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        let column = raw.trim();
        if column.is_empty() {
            return Err(MappingError::rule(field, "column name cannot be empty"));
        }
        Ok(MappingRule::DirectColumn(column.to_string()))
    }

    /// Parses any rule shape found in a mapping document.
    pub fn from_value(field: &str, value: &Value) -> std::result::Result<Self, MappingError> {
        match value {
            Value::String(raw) => MappingRule::parse_str(field, raw),
            Value::Number(_) | Value::Bool(_) => {
                let raw = scalar_to_string(value).unwrap_or_default();
                MappingRule::parse_str(field, &raw)
            }
            Value::Sequence(items) => Ok(MappingRule::Concat {
                columns: parse_column_list(field, items)?,
                separator: DEFAULT_SEPARATOR.to_string(),
                missing: None,
            }),
            Value::Mapping(mapping) => parse_structured_rule(field, mapping),
            Value::Null => Err(MappingError::rule(field, "rule cannot be empty")),
            Value::Tagged(tagged) => Err(MappingError::rule(
                field,
                format!("tagged values ({}) are not supported", tagged.tag),
            )),
        }
    }

    /// Input columns this rule reads, in rule order.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            MappingRule::DirectColumn(column) => vec![column.as_str()],
            MappingRule::ConstantField { .. } => Vec::new(),
            MappingRule::Concat { columns, .. } => columns.iter().map(String::as_str).collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MappingRule::DirectColumn(_) => "column",
            MappingRule::ConstantField { .. } => "constant",
            MappingRule::Concat { .. } => "concat",
        }
    }

    /// One-line human description used by `check`.
    pub fn describe(&self) -> String {
        match self {
            MappingRule::DirectColumn(column) => column.clone(),
            MappingRule::ConstantField { value, .. } => format!("\"{value}\""),
            MappingRule::Concat {
                columns,
                separator,
                missing,
            } => {
                let mut text = format!("{} (sep {:?})", columns.join(" + "), separator);
                if let Some(policy) = missing {
                    text.push_str(&format!(", missing {policy}"));
                }
                text
            }
        }
    }
}

fn constant_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)^(key)\((.*)\)$").expect("valid constant pattern"))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_column_list(field: &str, items: &[Value]) -> std::result::Result<Vec<String>, MappingError> {
    if items.is_empty() {
        return Err(MappingError::rule(
            field,
            "concat requires at least one column",
        ));
    }
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let name = scalar_to_string(item).ok_or_else(|| {
                MappingError::rule(field, format!("concat entry {} must be a column name", idx + 1))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(MappingError::rule(
                    field,
                    format!("concat entry {} is an empty column name", idx + 1),
                ));
            }
            Ok(name.to_string())
        })
        .collect()
}

fn parse_structured_rule(
    field: &str,
    mapping: &Mapping,
) -> std::result::Result<MappingRule, MappingError> {
    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| MappingError::rule(field, "rule object keys must be strings"))?;
        entries.push((key, value));
    }

    if let Some((_, columns)) = entries.iter().find(|(key, _)| *key == CONCAT_KEY) {
        let items = columns
            .as_sequence()
            .ok_or_else(|| MappingError::rule(field, "`concat` must be a list of column names"))?;
        let mut separator = DEFAULT_SEPARATOR.to_string();
        let mut missing = None;
        for (key, value) in &entries {
            match *key {
                CONCAT_KEY => {}
                SEP_KEY => {
                    separator = match value {
                        Value::Null => String::new(),
                        other => scalar_to_string(other).ok_or_else(|| {
                            MappingError::rule(field, "`sep` must be a string")
                        })?,
                    };
                }
                MISSING_KEY => {
                    let raw = value.as_str().ok_or_else(|| {
                        MappingError::rule(field, "`missing` must be 'pad' or 'skip'")
                    })?;
                    missing = Some(
                        raw.parse::<ConcatPolicy>()
                            .map_err(|reason| MappingError::rule(field, reason))?,
                    );
                }
                other => {
                    return Err(MappingError::rule(
                        field,
                        format!("unknown concat option '{other}'"),
                    ));
                }
            }
        }
        return Ok(MappingRule::Concat {
            columns: parse_column_list(field, items)?,
            separator,
            missing,
        });
    }

    match entries.as_slice() {
        [(key, value)] => {
            let value = scalar_to_string(value).ok_or_else(|| {
                MappingError::rule(field, format!("constant '{key}' must have a scalar value"))
            })?;
            Ok(MappingRule::ConstantField {
                key: (*key).to_string(),
                value,
            })
        }
        [] => Err(MappingError::rule(field, "rule object cannot be empty")),
        _ => Err(MappingError::rule(
            field,
            format!(
                "unknown mapping object keys: {}",
                entries
                    .iter()
                    .map(|(key, _)| *key)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )),
    }
}

/// Document syntax of a mapping file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.yaml`/`.yml` are YAML; everything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

/// Parsed mapping: output field name to rule, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MappingConfig {
    fields: Vec<(String, MappingRule)>,
}

impl MappingConfig {
    pub fn new(fields: Vec<(String, MappingRule)>) -> Self {
        MappingConfig { fields }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Opening mapping file {path:?}"))?;
        let config = load_config(&text, ConfigFormat::from_path(path))
            .with_context(|| format!("Parsing mapping file {path:?}"))?;
        Ok(config)
    }

    pub fn from_value(value: &Value) -> std::result::Result<Self, MappingError> {
        let mapping = value.as_mapping().ok_or_else(|| {
            MappingError::Document("mapping root must be an object".to_string())
        })?;
        let mut fields = Vec::with_capacity(mapping.len());
        for (key, rule) in mapping {
            let field = scalar_to_string(key).ok_or_else(|| {
                MappingError::Document(
                    "all top-level mapping keys (output column names) must be strings".to_string(),
                )
            })?;
            let parsed = MappingRule::from_value(&field, rule)?;
            fields.push((field, parsed));
        }
        Ok(MappingConfig { fields })
    }

    pub fn fields(&self) -> &[(String, MappingRule)] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn rule(&self, field: &str) -> Option<&MappingRule> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, rule)| rule)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every distinct input column any rule reads.
    pub fn referenced_columns(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .flat_map(|(_, rule)| rule.columns())
            .map(|column| column.trim().to_string())
            .collect()
    }

    /// Referenced columns that no (trimmed) header matches, sorted.
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        let known = headers
            .iter()
            .map(|header| header.trim())
            .collect::<BTreeSet<_>>();
        self.referenced_columns()
            .into_iter()
            .filter(|column| !known.contains(column.as_str()))
            .collect()
    }
}

/// Parses a mapping document.
pub fn load_config(
    document: &str,
    format: ConfigFormat,
) -> std::result::Result<MappingConfig, MappingError> {
    let value: Value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(document)
            .map_err(|err| MappingError::Document(err.to_string()))?,
        ConfigFormat::Json => {
            let json: serde_json::Value = serde_json::from_str(document)
                .map_err(|err| MappingError::Document(err.to_string()))?;
            serde_yaml::to_value(&json).map_err(|err| MappingError::Document(err.to_string()))?
        }
    };
    MappingConfig::from_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(document: &str) -> MappingConfig {
        load_config(document, ConfigFormat::Yaml).expect("valid mapping")
    }

    #[test]
    fn constant_string_rule_keeps_inner_text() {
        let rule = MappingRule::parse_str("Attr", "key(Some Value)").unwrap();
        assert_eq!(
            rule,
            MappingRule::ConstantField {
                key: "key".into(),
                value: "Some Value".into()
            }
        );
    }

    #[test]
    fn constant_pattern_is_case_insensitive_and_allows_empty_values() {
        let rule = MappingRule::parse_str("Attr", "  KEY()  ").unwrap();
        assert_eq!(
            rule,
            MappingRule::ConstantField {
                key: "KEY".into(),
                value: String::new()
            }
        );
    }

    #[test]
    fn constant_value_may_contain_parentheses() {
        let rule = MappingRule::parse_str("Attr", "key(Size (EU))").unwrap();
        assert_eq!(
            rule,
            MappingRule::ConstantField {
                key: "key".into(),
                value: "Size (EU)".into()
            }
        );
    }

    #[test]
    fn parenthesized_column_names_stay_columns() {
        let rule = MappingRule::parse_str("Price", "Price(EUR)").unwrap();
        assert_eq!(rule, MappingRule::DirectColumn("Price(EUR)".into()));
    }

    #[test]
    fn list_rule_becomes_space_joined_concat() {
        let config = yaml("Name:\n  - Brand\n  - Description\n");
        assert_eq!(
            config.rule("Name"),
            Some(&MappingRule::Concat {
                columns: vec!["Brand".into(), "Description".into()],
                separator: " ".into(),
                missing: None,
            })
        );
    }

    #[test]
    fn structured_concat_reads_separator_and_policy() {
        let config = yaml("Title:\n  concat: [Brand, Model]\n  sep: \" - \"\n  missing: skip\n");
        assert_eq!(
            config.rule("Title"),
            Some(&MappingRule::Concat {
                columns: vec!["Brand".into(), "Model".into()],
                separator: " - ".into(),
                missing: Some(ConcatPolicy::Skip),
            })
        );
    }

    #[test]
    fn single_pair_object_is_a_constant() {
        let config = yaml("Type:\n  key: simple\n");
        assert_eq!(
            config.rule("Type"),
            Some(&MappingRule::ConstantField {
                key: "key".into(),
                value: "simple".into()
            })
        );
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        let err = load_config("Bad:\n  a: 1\n  b: 2\n", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { ref field, .. } if field == "Bad"));

        let err = load_config("Bad:\n  concat: Brand\n", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { .. }));

        let err = load_config("Bad:\n", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { .. }));

        let err = load_config("Bad: []\n", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { .. }));
    }

    #[test]
    fn document_root_must_be_an_object() {
        let err = load_config("- SKU\n- Name\n", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, MappingError::Document(_)));
    }

    #[test]
    fn json_documents_preserve_field_order() {
        let config = load_config(
            r#"{"Zeta": "Z", "Alpha": ["A", "B"], "Mid": "key(x)"}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(config.field_names(), vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn missing_columns_compare_trimmed_headers() {
        let config = yaml("SKU: Code\nName: [Brand, Description]\nKind: key(x)\n");
        let headers = vec!["Code ".to_string(), " Brand".to_string()];
        assert_eq!(config.missing_columns(&headers), vec!["Description"]);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("m.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("m.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("m")), ConfigFormat::Json);
    }
}
