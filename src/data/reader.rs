use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, Schema,
    UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::ipc::reader::{FileReader, StreamReader};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{FieldValue, Record};

/// File extensions that hold dataset records.
pub const DATA_EXTENSIONS: &[&str] = &["parquet", "arrow", "jsonl", "json", "csv"];

/// Column an audio folder's `file_name` entries are exposed as.
pub const AUDIOFOLDER_COLUMN: &str = "audio";

const ARROW_FILE_MAGIC: &[u8; 6] = b"ARROW1";

/// Records read from a single data file.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    pub column_names: Vec<String>,
    pub records: Vec<Record>,
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Read every record of a data file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – HF Hub data files and parquet exports
/// * `.arrow`   – Arrow IPC, file or streaming format (HF cache files)
/// * `.jsonl`   – one JSON object per line
/// * `.json`    – `[{ "text": ..., "audio": ... }, ...]`
/// * `.csv`     – header row, scalar cells
///
/// A `metadata.csv` / `metadata.jsonl` with a `file_name` column is read as an
/// audio folder: `file_name` is replaced by an `audio` struct pointing at the
/// file next to the metadata.
pub fn read_data_file(path: &Path) -> Result<DataTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut table = match ext.as_str() {
        "parquet" | "pq" => read_parquet(path),
        "arrow" => read_arrow_ipc(path),
        "jsonl" => read_json_lines(path),
        "json" => read_json(path),
        "csv" => read_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("reading {}", path.display()))?;

    if is_audiofolder_metadata(path) {
        attach_audio_paths(path, &mut table);
    }

    log::debug!(
        "read {} records ({} columns) from {}",
        table.records.len(),
        table.column_names.len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Parquet / Arrow IPC
// ---------------------------------------------------------------------------

fn read_parquet(path: &Path) -> Result<DataTable> {
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let column_names = field_names(builder.schema());
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        append_batch(&batch, &mut records)?;
    }

    Ok(DataTable {
        column_names,
        records,
    })
}

/// HF writes its cache files in the streaming format; `save_to_disk` and other
/// tools may produce the random-access file format, recognised by its magic.
fn read_arrow_ipc(path: &Path) -> Result<DataTable> {
    let mut file = File::open(path).context("opening arrow file")?;
    let mut magic = [0u8; 6];
    let is_file_format = file.read_exact(&mut magic).is_ok() && &magic == ARROW_FILE_MAGIC;
    file.seek(SeekFrom::Start(0))?;

    if is_file_format {
        let reader = FileReader::try_new(file, None).context("reading arrow file footer")?;
        let column_names = field_names(&reader.schema());
        collect_batches(reader, column_names)
    } else {
        let reader = StreamReader::try_new(BufReader::new(file), None)
            .context("reading arrow stream schema")?;
        let column_names = field_names(&reader.schema());
        collect_batches(reader, column_names)
    }
}

fn collect_batches<I>(batches: I, column_names: Vec<String>) -> Result<DataTable>
where
    I: Iterator<Item = std::result::Result<RecordBatch, arrow::error::ArrowError>>,
{
    let mut records = Vec::new();
    for batch_result in batches {
        let batch = batch_result.context("reading arrow record batch")?;
        append_batch(&batch, &mut records)?;
    }
    Ok(DataTable {
        column_names,
        records,
    })
}

fn field_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

fn append_batch(batch: &RecordBatch, records: &mut Vec<Record>) -> Result<()> {
    let schema = batch.schema();
    for row in 0..batch.num_rows() {
        let mut record = Record::new();
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let value = arrow_value(column.as_ref(), row)
                .with_context(|| format!("Row {row}: failed to read '{}'", field.name()))?;
            record.insert(field.name().clone(), value);
        }
        records.push(record);
    }
    Ok(())
}

/// Convert one cell of an Arrow array, recursing into lists and structs.
fn arrow_value(col: &dyn Array, row: usize) -> Result<FieldValue> {
    if col.is_null(row) {
        return Ok(FieldValue::Null);
    }
    let value = match col.data_type() {
        DataType::Null => FieldValue::Null,
        DataType::Boolean => FieldValue::Bool(col.as_boolean().value(row)),
        DataType::Int8 => FieldValue::Integer(col.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => FieldValue::Integer(col.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => FieldValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => FieldValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => FieldValue::Integer(col.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => {
            FieldValue::Integer(col.as_primitive::<UInt16Type>().value(row) as i64)
        }
        DataType::UInt32 => {
            FieldValue::Integer(col.as_primitive::<UInt32Type>().value(row) as i64)
        }
        DataType::UInt64 => {
            let v = col.as_primitive::<UInt64Type>().value(row);
            FieldValue::Integer(i64::try_from(v).context("uint64 value out of range")?)
        }
        DataType::Float32 => {
            FieldValue::Float(col.as_primitive::<Float32Type>().value(row) as f64)
        }
        DataType::Float64 => FieldValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => FieldValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => FieldValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Binary => FieldValue::Binary(col.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => FieldValue::Binary(col.as_binary::<i64>().value(row).to_vec()),
        DataType::List(_) => list_value(col.as_list::<i32>().value(row).as_ref())?,
        DataType::LargeList(_) => list_value(col.as_list::<i64>().value(row).as_ref())?,
        DataType::Struct(_) => {
            let struct_arr = col.as_struct();
            let mut fields = BTreeMap::new();
            for (name, child) in struct_arr.column_names().into_iter().zip(struct_arr.columns()) {
                fields.insert(name.to_string(), arrow_value(child.as_ref(), row)?);
            }
            FieldValue::Struct(fields)
        }
        other => bail!("unsupported Arrow type {other:?}"),
    };
    Ok(value)
}

fn list_value(values: &dyn Array) -> Result<FieldValue> {
    (0..values.len())
        .map(|i| arrow_value(values, i))
        .collect::<Result<Vec<_>>>()
        .map(FieldValue::List)
}

// ---------------------------------------------------------------------------
// JSON / JSON Lines
// ---------------------------------------------------------------------------

fn read_json(path: &Path) -> Result<DataTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let rows = root.as_array().context("Expected top-level JSON array")?;
    let mut table = DataTable::default();
    for (i, row) in rows.iter().enumerate() {
        push_json_record(&mut table, row, i)?;
    }
    Ok(table)
}

fn read_json_lines(path: &Path) -> Result<DataTable> {
    let file = File::open(path).context("opening JSON Lines file")?;
    let mut table = DataTable::default();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: JsonValue =
            serde_json::from_str(&line).with_context(|| format!("parsing line {}", i + 1))?;
        push_json_record(&mut table, &row, i)?;
    }
    Ok(table)
}

fn push_json_record(table: &mut DataTable, row: &JsonValue, index: usize) -> Result<()> {
    let obj = row
        .as_object()
        .with_context(|| format!("Row {index} is not a JSON object"))?;

    let mut record = Record::new();
    for (key, val) in obj {
        if !table.column_names.contains(key) {
            table.column_names.push(key.clone());
        }
        record.insert(key.clone(), json_to_field(val));
    }
    table.records.push(record);
    Ok(())
}

/// Convert a JSON value into a [`FieldValue`].
pub fn json_to_field(val: &JsonValue) -> FieldValue {
    match val {
        JsonValue::String(s) => FieldValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                FieldValue::Float(f)
            } else {
                FieldValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => FieldValue::Bool(*b),
        JsonValue::Null => FieldValue::Null,
        JsonValue::Array(items) => FieldValue::List(items.iter().map(json_to_field).collect()),
        JsonValue::Object(fields) => FieldValue::Struct(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_field(v)))
                .collect(),
        ),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<DataTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let column_names: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("CSV row {row_no}"))?;
        let record: Record = column_names
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.clone(), guess_field_type(value)))
            .collect();
        records.push(record);
    }

    Ok(DataTable {
        column_names,
        records,
    })
}

fn guess_field_type(s: &str) -> FieldValue {
    if s.is_empty() {
        return FieldValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return FieldValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return FieldValue::Float(f);
    }
    if s == "true" || s == "false" {
        return FieldValue::Bool(s == "true");
    }
    FieldValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Audio folders
// ---------------------------------------------------------------------------

fn is_audiofolder_metadata(path: &Path) -> bool {
    let stem = path.file_stem().and_then(|s| s.to_str());
    let ext = path.extension().and_then(|e| e.to_str());
    stem == Some("metadata") && matches!(ext, Some("csv") | Some("jsonl"))
}

fn attach_audio_paths(path: &Path, table: &mut DataTable) {
    let Some(pos) = table.column_names.iter().position(|c| c == "file_name") else {
        return;
    };
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    for record in &mut table.records {
        match record.remove("file_name") {
            Some(FieldValue::String(name)) => {
                let audio_path = base.join(&name).to_string_lossy().into_owned();
                let audio: BTreeMap<String, FieldValue> = [
                    ("bytes".to_string(), FieldValue::Null),
                    ("path".to_string(), FieldValue::String(audio_path)),
                ]
                .into_iter()
                .collect();
                record.insert(AUDIOFOLDER_COLUMN.to_string(), FieldValue::Struct(audio));
            }
            Some(other) => {
                record.insert("file_name".to_string(), other);
            }
            None => {}
        }
    }
    table.column_names[pos] = AUDIOFOLDER_COLUMN.to_string();
}
