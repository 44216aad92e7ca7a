use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// FieldValue – a single cell of a dataset record
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the value kinds found in HF datasets
/// (Arrow scalars, nested lists/structs and the decoded audio feature).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Binary(Vec<u8>),
    List(Vec<FieldValue>),
    Struct(BTreeMap<String, FieldValue>),
    /// Raw waveform samples.
    Wave(Vec<f32>),
    /// Audio decoded at a known sample rate.
    Audio(AudioData),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "<null>"),
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v:.4}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Binary(b) => write!(f, "<{} bytes>", b.len()),
            FieldValue::List(items) => write!(f, "<list of {}>", items.len()),
            FieldValue::Struct(fields) => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                write!(f, "{{{}}}", keys.join(", "))
            }
            FieldValue::Wave(samples) => write!(f, "<{} samples>", samples.len()),
            FieldValue::Audio(audio) => write!(
                f,
                "<{} samples @ {} Hz>",
                audio.array.len(),
                audio.sampling_rate
            ),
        }
    }
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Look up a sub-field of a struct value.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Struct(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Read a waveform out of `Wave`, `Audio` or a list of numbers.
    pub fn to_samples(&self) -> Option<Vec<f32>> {
        match self {
            FieldValue::Wave(samples) => Some(samples.clone()),
            FieldValue::Audio(audio) => Some(audio.array.clone()),
            FieldValue::List(items) => items
                .iter()
                .map(|v| v.as_f64().map(|x| x as f32))
                .collect(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioData – the decoded audio feature
// ---------------------------------------------------------------------------

/// Mono waveform plus the rate it is sampled at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioData {
    /// Source file, if the audio came from one.
    pub path: Option<String>,
    pub array: Vec<f32>,
    pub sampling_rate: u32,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One row of a dataset: column name → value.
pub type Record = BTreeMap<String, FieldValue>;

/// Flat training record: `text`, `wave`, optional `speaker` and constant fields.
pub type PreparedItem = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// AudioDataset – the complete loaded split
// ---------------------------------------------------------------------------

/// A loaded dataset split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioDataset {
    /// Ordered column names as declared by the source files.
    pub column_names: Vec<String>,
    /// All records (rows) in source order.
    pub records: Vec<Record>,
}

impl AudioDataset {
    pub fn new(column_names: Vec<String>, records: Vec<Record>) -> Self {
        AudioDataset {
            column_names,
            records,
        }
    }

    /// Build a dataset whose columns are the union of the record keys.
    pub fn from_records(records: Vec<Record>) -> Self {
        let column_names: BTreeSet<String> = records
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect();
        AudioDataset {
            column_names: column_names.into_iter().collect(),
            records,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_names.iter().any(|c| c == name)
    }
}

impl<'a> IntoIterator for &'a AudioDataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
