//! Core data model types for the streaming pipeline.
//!
//! The reader produces [`RecordBatch`]es: a typed [`Schema`] (inferred per batch) plus row-major
//! [`Value`] storage. Every later stage consumes and produces the same type.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing the shape of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns `true` if a field named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// A single scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric coercion used by column enrichment.
    ///
    /// Strings are trimmed and parsed; booleans become `1.0`/`0.0`; anything unparseable is `None`.
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Utf8(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Int64(v) => serializer.serialize_i64(*v),
            // serde_json writes non-finite floats as `null`.
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Utf8(s) => serializer.serialize_str(s),
        }
    }
}

/// A bounded, ordered group of records read from the source.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Schema describing row shape (types are inferred per batch).
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl RecordBatch {
    /// Create a batch from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the batch.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the rows for which `predicate` returns `Ok(true)`, preserving order.
    ///
    /// Stops at the first predicate error and returns it; the batch is left untouched in that
    /// case.
    pub fn try_retain_rows<F, E>(&mut self, mut predicate: F) -> Result<(), E>
    where
        F: FnMut(&[Value]) -> Result<bool, E>,
    {
        let mut keep = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            keep.push(predicate(row.as_slice())?);
        }
        let mut flags = keep.into_iter();
        self.rows.retain(|_| flags.next().unwrap_or(false));
        Ok(())
    }

    /// Set column `name` to the values produced by `compute` for every row.
    ///
    /// An existing column with the same name is overwritten in place (keeping its position and
    /// taking the new type); otherwise the column is appended.
    pub fn set_column<F>(&mut self, name: &str, data_type: DataType, mut compute: F)
    where
        F: FnMut(&[Value]) -> Value,
    {
        match self.schema.index_of(name) {
            Some(idx) => {
                self.schema.fields[idx].data_type = data_type;
                for row in &mut self.rows {
                    let v = compute(row.as_slice());
                    row[idx] = v;
                }
            }
            None => {
                self.schema.fields.push(Field::new(name, data_type));
                for row in &mut self.rows {
                    let v = compute(row.as_slice());
                    row.push(v);
                }
            }
        }
    }

    /// Borrow the rows as a serializable list of JSON objects keyed by column name.
    pub fn records(&self) -> Records<'_> {
        Records(self)
    }
}

/// Serializes a [`RecordBatch`] as an array of objects, keys in schema order.
#[derive(Debug, Clone, Copy)]
pub struct Records<'a>(&'a RecordBatch);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let batch = self.0;
        let mut seq = serializer.serialize_seq(Some(batch.rows.len()))?;
        for row in &batch.rows {
            seq.serialize_element(&Record {
                schema: &batch.schema,
                row,
            })?;
        }
        seq.end()
    }
}

struct Record<'a> {
    schema: &'a Schema,
    row: &'a [Value],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.fields.len()))?;
        for (field, value) in self.schema.fields.iter().zip(self.row.iter()) {
            map.serialize_entry(&field.name, value)?;
        }
        map.end()
    }
}
