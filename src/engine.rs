//! Row transformation.
//!
//! [`transform`] applies a [`MappingConfig`] to a batch of [`InputRow`]s and
//! returns exactly one [`OutputRow`] per input row, in input order. Column
//! lookups trim both the row's header text and the requested name, so a rule
//! asking for `SKU` finds a spreadsheet header exported as `"SKU "`.
//!
//! Missing source columns are handled per run: in strict mode the first one
//! aborts the whole batch with [`MappingError::MissingColumn`]; otherwise the
//! field resolves to an empty string and a [`Warning`] is collected.

use std::fmt;

use serde::Serialize;

use crate::mapping::{ConcatPolicy, MappingConfig, MappingError, MappingRule};

/// One input record: raw header text paired with the raw cell value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRow {
    cells: Vec<(String, String)>,
}

impl InputRow {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        InputRow { cells }
    }

    /// Pairs a header row with one record. Surplus values without a header
    /// are dropped; headers without a value are absent from the row.
    pub fn from_record<H, V>(headers: &[H], values: &[V]) -> Self
    where
        H: AsRef<str>,
        V: AsRef<str>,
    {
        let cells = headers
            .iter()
            .zip(values.iter())
            .map(|(header, value)| (header.as_ref().to_string(), value.as_ref().to_string()))
            .collect();
        InputRow { cells }
    }

    /// Looks up a column, ignoring surrounding whitespace on both sides.
    /// The first matching header wins.
    pub fn get(&self, column: &str) -> Option<&str> {
        let wanted = column.trim();
        self.cells
            .iter()
            .find(|(header, _)| header.trim() == wanted)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for InputRow
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        InputRow {
            cells: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// One output record, fields in mapping order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRow {
    fields: Vec<(String, String)>,
}

impl OutputRow {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn values(&self) -> Vec<String> {
        self.fields.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for OutputRow
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        OutputRow {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// A missing source column tolerated in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Zero-based index of the input row.
    pub row: usize,
    pub field: String,
    pub column: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row index {}: column '{}' for output field '{}' is missing",
            self.row, self.column, self.field
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub strict: bool,
    pub concat_policy: ConcatPolicy,
}

impl TransformOptions {
    pub fn strict(strict: bool) -> Self {
        TransformOptions {
            strict,
            ..TransformOptions::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub headers: Vec<String>,
    pub rows: Vec<OutputRow>,
    pub warnings: Vec<Warning>,
}

/// Transforms `rows` with the default concat policy.
pub fn transform(
    config: &MappingConfig,
    rows: &[InputRow],
    strict: bool,
) -> Result<TransformOutput, MappingError> {
    transform_with(config, rows, &TransformOptions::strict(strict))
}

pub fn transform_with(
    config: &MappingConfig,
    rows: &[InputRow],
    options: &TransformOptions,
) -> Result<TransformOutput, MappingError> {
    let mut output = TransformOutput {
        headers: config.field_names(),
        rows: Vec::with_capacity(rows.len()),
        warnings: Vec::new(),
    };
    for (index, row) in rows.iter().enumerate() {
        let mut resolver = RowResolver {
            row,
            index,
            options,
            warnings: &mut output.warnings,
        };
        let fields = config
            .fields()
            .iter()
            .map(|(field, rule)| Ok((field.clone(), resolver.resolve(field, rule)?)))
            .collect::<Result<Vec<_>, MappingError>>()?;
        output.rows.push(OutputRow { fields });
    }
    Ok(output)
}

struct RowResolver<'a> {
    row: &'a InputRow,
    index: usize,
    options: &'a TransformOptions,
    warnings: &'a mut Vec<Warning>,
}

impl RowResolver<'_> {
    fn resolve(&mut self, field: &str, rule: &MappingRule) -> Result<String, MappingError> {
        match rule {
            MappingRule::DirectColumn(column) => {
                Ok(self.column(field, column)?.unwrap_or_default())
            }
            MappingRule::ConstantField { value, .. } => Ok(value.clone()),
            MappingRule::Concat {
                columns,
                separator,
                missing,
            } => {
                let policy = missing.unwrap_or(self.options.concat_policy);
                let mut parts = Vec::with_capacity(columns.len());
                for column in columns {
                    match self.column(field, column)? {
                        Some(value) => parts.push(value),
                        None if policy == ConcatPolicy::Pad => parts.push(String::new()),
                        None => {}
                    }
                }
                Ok(parts.join(separator.as_str()))
            }
        }
    }

    /// `Ok(None)` means the column was absent and a warning was recorded.
    fn column(&mut self, field: &str, column: &str) -> Result<Option<String>, MappingError> {
        if let Some(value) = self.row.get(column) {
            return Ok(Some(value.trim().to_string()));
        }
        if self.options.strict {
            return Err(MappingError::MissingColumn {
                field: field.to_string(),
                column: column.to_string(),
                row: self.index,
            });
        }
        self.warnings.push(Warning {
            row: self.index,
            field: field.to_string(),
            column: column.to_string(),
        });
        Ok(None)
    }
}
