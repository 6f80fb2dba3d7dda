use serde_json::Value as JsonValue;

use super::error::{DataError, Result};
use super::model::{CellValue, Column, Table};
use super::reader::json_to_cell;

// ---------------------------------------------------------------------------
// Filter predicate: which values are accepted per column
// ---------------------------------------------------------------------------

/// Accepted values for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Rows where the column is missing (`Null` or NaN).
    Null,
    /// Rows equal to a single value.
    Equals(CellValue),
    /// Rows whose value is in the set.
    AnyOf(Vec<CellValue>),
}

impl FilterValue {
    pub fn equals(value: impl Into<CellValue>) -> Self {
        FilterValue::Equals(value.into())
    }

    pub fn any_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        FilterValue::AnyOf(values.into_iter().map(Into::into).collect())
    }

    /// Whether `cell` passes this constraint.
    ///
    /// * A null cell passes only if a null is among the accepted values.
    /// * Integers and floats compare numerically, so `1` accepts `1.0`.
    pub fn matches(&self, cell: &CellValue) -> bool {
        match self {
            FilterValue::Null => cell.is_null(),
            FilterValue::Equals(v) => cell_eq(cell, v),
            FilterValue::AnyOf(vs) => vs.iter().any(|v| cell_eq(cell, v)),
        }
    }
}

fn cell_eq(cell: &CellValue, accepted: &CellValue) -> bool {
    if cell.is_null() || accepted.is_null() {
        return cell.is_null() && accepted.is_null();
    }
    if cell == accepted {
        return true;
    }
    match (cell.as_f64(), accepted.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Return indices of rows that pass every `(column, accepted)` pair.
///
/// `column_names` and `filter_values` are paired by position. All column
/// names are resolved before any row is looked at, so an unknown column is
/// reported even on an empty table.
pub fn filtered_indices<S: AsRef<str>>(
    table: &Table,
    column_names: &[S],
    filter_values: &[FilterValue],
) -> Result<Vec<usize>> {
    if column_names.len() != filter_values.len() {
        return Err(DataError::FilterArity {
            columns: column_names.len(),
            values: filter_values.len(),
        });
    }

    let constraints: Vec<(&Column, &FilterValue)> = column_names
        .iter()
        .map(|name| table.column(name.as_ref()))
        .zip(filter_values)
        .map(|(col, fv)| col.map(|c| (c, fv)))
        .collect::<Result<_>>()?;

    Ok((0..table.num_rows())
        .filter(|&row| {
            constraints
                .iter()
                .all(|(col, fv)| fv.matches(&col.values[row]))
        })
        .collect())
}

/// Rows of `table` matching all constraints, in their original order and
/// with every column kept.
pub fn filter<S: AsRef<str>>(
    table: &Table,
    column_names: &[S],
    filter_values: &[FilterValue],
) -> Result<Table> {
    let indices = filtered_indices(table, column_names, filter_values)?;
    Ok(table.take(&indices))
}

/// Paired form of a filter: one accepted-value spec per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    constraints: Vec<(String, FilterValue)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip column names with their value specs.
    pub fn from_parts<S: AsRef<str>>(
        column_names: &[S],
        filter_values: Vec<FilterValue>,
    ) -> Result<Self> {
        if column_names.len() != filter_values.len() {
            return Err(DataError::FilterArity {
                columns: column_names.len(),
                values: filter_values.len(),
            });
        }
        Ok(Self {
            constraints: column_names
                .iter()
                .map(|c| c.as_ref().to_string())
                .zip(filter_values)
                .collect(),
        })
    }

    /// Add one constraint.
    pub fn with(mut self, column: impl Into<String>, value: FilterValue) -> Self {
        self.constraints.push((column.into(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.constraints.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn apply(&self, table: &Table) -> Result<Table> {
        let (names, values): (Vec<&str>, Vec<FilterValue>) = self
            .constraints
            .iter()
            .map(|(c, v)| (c.as_str(), v.clone()))
            .unzip();
        filter(table, &names, &values)
    }
}

// ---------------------------------------------------------------------------
// Loosely typed input
// ---------------------------------------------------------------------------

/// Convert a JSON array into per-column filter values.
///
/// `["bio", null, [1, 2, 3]]` becomes `Equals("bio")`, `Null` and
/// `AnyOf([1, 2, 3])`. A bare scalar such as `"bio"` is rejected rather
/// than guessed at.
pub fn parse_filter_values(json: &JsonValue) -> Result<Vec<FilterValue>> {
    let items = match json {
        JsonValue::Array(items) => items,
        JsonValue::Object(_) => {
            return Err(DataError::InvalidFilterValue(format!(
                "expected an array of per-column values, got {json}"
            )))
        }
        scalar => return Err(DataError::BareScalarFilter(scalar.to_string())),
    };

    items
        .iter()
        .map(|item| match item {
            JsonValue::Null => Ok(FilterValue::Null),
            JsonValue::Array(values) => values
                .iter()
                .map(json_scalar)
                .collect::<Result<Vec<_>>>()
                .map(FilterValue::AnyOf),
            scalar => json_scalar(scalar).map(FilterValue::Equals),
        })
        .collect()
}

fn json_scalar(value: &JsonValue) -> Result<CellValue> {
    match value {
        JsonValue::Array(_) | JsonValue::Object(_) => {
            Err(DataError::InvalidFilterValue(value.to_string()))
        }
        other => Ok(json_to_cell(other)),
    }
}
