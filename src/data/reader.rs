use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;
use serde_pickle::{DeOptions, HashableValue, Value as PickleValue};

use super::error::{DataError, Result};
use super::format::FileFormat;
use super::model::{CellValue, Column, Table};

// ---------------------------------------------------------------------------
// Read primitive
// ---------------------------------------------------------------------------

/// Turns a plain (non-archive) file into a [`Table`].
///
/// The [`Loader`](super::loader::Loader) calls this once per cache miss, so
/// wrapping it is the way to observe or stub out disk reads.
pub trait TableReader {
    fn read(&self, path: &Path, format: FileFormat) -> Result<Table>;
}

/// Reads straight from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsReader;

impl TableReader for FsReader {
    fn read(&self, path: &Path, format: FileFormat) -> Result<Table> {
        match format {
            FileFormat::Csv => read_csv(path),
            FileFormat::Pickle => read_pickle(path),
            FileFormat::Parquet => read_parquet(path),
            FileFormat::Json => read_json(path),
            FileFormat::Zip | FileFormat::Xz | FileFormat::Unknown => {
                Err(DataError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one record per row.
/// Column types are inferred over the whole column, see [`infer_column`].
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for result in reader.records() {
        let record = result?;
        for (col_idx, value) in record.iter().enumerate() {
            raw[col_idx].push(value.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, cells)| Column::new(name, infer_column(&cells)))
        .collect();
    Table::new(columns)
}

/// Pick the narrowest type every non-empty cell agrees on:
/// Integer, then Float, then Bool, falling back to String.
/// Empty cells are `Null` whatever the column type.
fn infer_column(cells: &[String]) -> Vec<CellValue> {
    let filled = || cells.iter().filter(|s| !s.is_empty());

    let convert: fn(&str) -> CellValue = if filled().all(|s| s.parse::<i64>().is_ok()) {
        |s| s.parse::<i64>().map_or(CellValue::Null, CellValue::Integer)
    } else if filled().all(|s| s.parse::<f64>().is_ok()) {
        |s| s.parse::<f64>().map_or(CellValue::Null, CellValue::Float)
    } else if filled().all(|s| parse_bool(s).is_some()) {
        |s| parse_bool(s).map_or(CellValue::Null, CellValue::Bool)
    } else {
        |s| CellValue::String(s.to_string())
    };

    cells
        .iter()
        .map(|s| {
            if s.is_empty() {
                CellValue::Null
            } else {
                convert(s)
            }
        })
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// JSON reader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "id": 137739, "name": "arriba baked winter squash", "tags": "vegan" },
///   { "id": 31490, "name": "a bit different breakfast pizza", "tags": null }
/// ]
/// ```
///
/// Columns appear in order of first appearance; absent keys become `Null`.
pub fn read_json(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let root: JsonValue = serde_json::from_reader(BufReader::new(file))?;

    let records = root
        .as_array()
        .ok_or_else(|| DataError::Schema("expected top-level JSON array".to_string()))?;

    let mut names: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| DataError::Schema(format!("row {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values = records
                .iter()
                .map(|rec| rec.get(&name).map_or(CellValue::Null, json_to_cell))
                .collect();
            Column::new(name, values)
        })
        .collect();
    Table::new(columns)
}

pub(crate) fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Pickle reader
// ---------------------------------------------------------------------------

/// Load a pickled table. No schema validation beyond the outer shape.
///
/// Accepted layouts:
/// * `df.to_dict(orient="split")`: `{"columns": [...], "data": [[...], ...]}`,
///   column order preserved (an `"index"` key is ignored)
/// * `df.to_dict(orient="list")`: `{"col": [...], ...}`, columns in key order
///
/// Python globals that cannot be resolved are replaced by `None`.
pub fn read_pickle(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let value = serde_pickle::value_from_reader(
        BufReader::new(file),
        DeOptions::new().replace_unresolved_globals(),
    )?;
    pickle_to_table(value)
}

fn pickle_to_table(value: PickleValue) -> Result<Table> {
    let PickleValue::Dict(mut dict) = value else {
        return Err(DataError::Schema(
            "pickled object is not a dict of columns".to_string(),
        ));
    };

    let columns_key = HashableValue::String("columns".to_string());
    let data_key = HashableValue::String("data".to_string());
    if dict.contains_key(&columns_key) && dict.contains_key(&data_key) {
        let names = dict.remove(&columns_key).unwrap_or(PickleValue::None);
        let data = dict.remove(&data_key).unwrap_or(PickleValue::None);
        return split_to_table(names, data);
    }

    let columns = dict
        .into_iter()
        .map(|(key, values)| {
            let values = pickle_sequence(values)
                .ok_or_else(|| DataError::Schema(format!("column {key} is not a list")))?;
            Ok(Column::new(
                hashable_to_name(key),
                values.into_iter().map(pickle_to_cell).collect(),
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Table::new(columns)
}

fn split_to_table(names: PickleValue, data: PickleValue) -> Result<Table> {
    let names: Vec<String> = pickle_sequence(names)
        .ok_or_else(|| DataError::Schema("'columns' is not a list".to_string()))?
        .into_iter()
        .map(|n| match n {
            PickleValue::String(s) => s,
            other => other.to_string(),
        })
        .collect();
    let rows = pickle_sequence(data)
        .ok_or_else(|| DataError::Schema("'data' is not a list of rows".to_string()))?;

    let mut values: Vec<Vec<CellValue>> = vec![Vec::with_capacity(rows.len()); names.len()];
    for (i, row) in rows.into_iter().enumerate() {
        let row = pickle_sequence(row)
            .ok_or_else(|| DataError::Schema(format!("row {i} is not a list")))?;
        if row.len() != names.len() {
            return Err(DataError::Schema(format!(
                "row {i} has {} values, expected {}",
                row.len(),
                names.len()
            )));
        }
        for (col, cell) in values.iter_mut().zip(row) {
            col.push(pickle_to_cell(cell));
        }
    }

    Table::new(
        names
            .into_iter()
            .zip(values)
            .map(|(name, vals)| Column::new(name, vals))
            .collect(),
    )
}

fn pickle_sequence(value: PickleValue) -> Option<Vec<PickleValue>> {
    match value {
        PickleValue::List(items) | PickleValue::Tuple(items) => Some(items),
        _ => None,
    }
}

fn hashable_to_name(key: HashableValue) -> String {
    match key {
        HashableValue::String(s) => s,
        other => other.to_string(),
    }
}

fn pickle_to_cell(value: PickleValue) -> CellValue {
    match value {
        PickleValue::None => CellValue::Null,
        PickleValue::Bool(b) => CellValue::Bool(b),
        PickleValue::I64(i) => CellValue::Integer(i),
        PickleValue::F64(f) => CellValue::Float(f),
        PickleValue::String(s) => CellValue::String(s),
        PickleValue::Bytes(b) => CellValue::String(String::from_utf8_lossy(&b).into_owned()),
        // Big ints, nested lists and sets keep their Python-ish text form.
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Load a Parquet file written by Pandas (`df.to_parquet()`) or Polars.
///
/// Scalar Arrow types map onto [`CellValue`]; anything else (dates,
/// timestamps, lists, ...) is kept as Arrow's display text for the cell.
pub fn read_parquet(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut values: BTreeMap<usize, Vec<CellValue>> = BTreeMap::new();
    for batch_result in reader {
        let batch = batch_result?;
        for (col_idx, col) in batch.columns().iter().enumerate() {
            values.entry(col_idx).or_default().extend(arrow_cells(col)?);
        }
    }

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Column::new(name, values.remove(&i).unwrap_or_default()))
        .collect();
    Table::new(columns)
}

/// Convert every cell of an Arrow column.
fn arrow_cells(col: &Arc<dyn Array>) -> Result<Vec<CellValue>> {
    let cell = |row: usize, value: CellValue| {
        if col.is_null(row) {
            CellValue::Null
        } else {
            value
        }
    };
    let rows = 0..col.len();
    let cells = match col.data_type() {
        DataType::Utf8 => {
            let arr = col.as_string::<i32>();
            rows.map(|r| cell(r, arr.value(r).into())).collect()
        }
        DataType::LargeUtf8 => {
            let arr = col.as_string::<i64>();
            rows.map(|r| cell(r, arr.value(r).into())).collect()
        }
        DataType::Int32 => {
            let arr = col.as_primitive::<Int32Type>();
            rows.map(|r| cell(r, CellValue::Integer(arr.value(r) as i64)))
                .collect()
        }
        DataType::Int64 => {
            let arr = col.as_primitive::<Int64Type>();
            rows.map(|r| cell(r, CellValue::Integer(arr.value(r)))).collect()
        }
        DataType::Float32 => {
            let arr = col.as_primitive::<Float32Type>();
            rows.map(|r| cell(r, CellValue::Float(arr.value(r) as f64)))
                .collect()
        }
        DataType::Float64 => {
            let arr = col.as_primitive::<Float64Type>();
            rows.map(|r| cell(r, CellValue::Float(arr.value(r)))).collect()
        }
        DataType::Boolean => {
            let arr = col.as_boolean();
            rows.map(|r| cell(r, CellValue::Bool(arr.value(r)))).collect()
        }
        _ => {
            let formatter = ArrayFormatter::try_new(col.as_ref(), &FormatOptions::default())?;
            rows.map(|r| cell(r, CellValue::String(formatter.value(r).to_string())))
                .collect()
        }
    };
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_csv_infers_column_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.csv");
        std::fs::write(
            &path,
            "id,minutes,tags,vegan\n1,30.5,bio,true\n2,,\"quick,easy\",FALSE\n3,12,,true\n",
        )
        .unwrap();

        let table = read_csv(&path).unwrap();
        assert_eq!(table.column_names(), vec!["id", "minutes", "tags", "vegan"]);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(
            table.column("id").unwrap().values,
            vec![1.into(), 2.into(), 3.into()]
        );
        assert_eq!(
            table.column("minutes").unwrap().values,
            vec![30.5.into(), CellValue::Null, 12.0.into()]
        );
        assert_eq!(
            table.column("tags").unwrap().values,
            vec!["bio".into(), "quick,easy".into(), CellValue::Null]
        );
        assert_eq!(
            table.column("vegan").unwrap().values,
            vec![true.into(), false.into(), true.into()]
        );
    }

    #[test]
    fn test_csv_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "tags,value\n").unwrap();

        let table = read_csv(&path).unwrap();
        assert_eq!(table.column_names(), vec!["tags", "value"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_csv_ragged_row_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n").unwrap();

        assert!(matches!(read_csv(&path), Err(DataError::Csv(_))));
    }

    #[test]
    fn test_json_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.json");
        std::fs::write(
            &path,
            r#"[{"name": "pizza", "n_steps": 4}, {"name": "soup", "tags": "bio"}]"#,
        )
        .unwrap();

        let table = read_json(&path).unwrap();
        assert_eq!(table.column_names(), vec!["name", "n_steps", "tags"]);
        assert_eq!(
            table.column("tags").unwrap().values,
            vec![CellValue::Null, "bio".into()]
        );
    }

    #[test]
    fn test_pickle_split_orientation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ingr_map.pkl");

        let mut dict = BTreeMap::new();
        dict.insert(
            HashableValue::String("columns".into()),
            PickleValue::List(vec![
                PickleValue::String("raw_ingr".into()),
                PickleValue::String("id".into()),
            ]),
        );
        dict.insert(
            HashableValue::String("data".into()),
            PickleValue::List(vec![
                PickleValue::List(vec![PickleValue::String("salt".into()), PickleValue::I64(6270)]),
                PickleValue::List(vec![PickleValue::None, PickleValue::I64(1170)]),
            ]),
        );
        let mut file = File::create(&path).unwrap();
        serde_pickle::value_to_writer(
            &mut file,
            &PickleValue::Dict(dict),
            serde_pickle::SerOptions::new(),
        )
        .unwrap();

        let table = read_pickle(&path).unwrap();
        assert_eq!(table.column_names(), vec!["raw_ingr", "id"]);
        assert_eq!(
            table.column("raw_ingr").unwrap().values,
            vec!["salt".into(), CellValue::Null]
        );
        assert_eq!(
            table.column("id").unwrap().values,
            vec![6270.into(), 1170.into()]
        );
    }

    #[test]
    fn test_pickle_rejects_non_dict() {
        let err = pickle_to_table(PickleValue::List(vec![])).unwrap_err();
        assert!(matches!(err, DataError::Schema(_)));
    }

    #[test]
    fn test_parquet_renders_non_scalar_cells() {
        use arrow::array::{Date32Array, Int32Array, ListArray};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.parquet");

        let submitted: Arc<dyn Array> = Arc::new(Date32Array::from(vec![Some(0), Some(19000), None]));
        let steps: Arc<dyn Array> = Arc::new(ListArray::from_iter_primitive::<Int32Type, _, _>(vec![
            Some(vec![Some(1), Some(2)]),
            Some(vec![]),
            None,
        ]));
        let ids: Arc<dyn Array> = Arc::new(Int32Array::from(vec![7, 8, 9]));
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("submitted", submitted.data_type().clone(), true),
            Field::new("steps", steps.data_type().clone(), true),
        ]));
        let batch = RecordBatch::try_new(schema.clone(), vec![ids, submitted, steps]).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = read_parquet(&path).unwrap();
        assert_eq!(
            table.column("id").unwrap().values,
            vec![7.into(), 8.into(), 9.into()]
        );
        assert_eq!(
            table.column("submitted").unwrap().values,
            vec!["1970-01-01".into(), "2022-01-08".into(), CellValue::Null]
        );
        assert_eq!(
            table.column("steps").unwrap().values,
            vec!["[1, 2]".into(), "[]".into(), CellValue::Null]
        );
    }

    #[test]
    fn test_fs_reader_refuses_archives() {
        let err = FsReader
            .read(Path::new("data.zip"), FileFormat::Zip)
            .unwrap_err();
        assert!(matches!(err, DataError::UnsupportedFormat { .. }));
    }
}
