//! Running per-key counts across the batches of one stream.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::types::{RecordBatch, Value};

/// Key under which null/missing group values are counted.
pub const NULL_GROUP_KEY: &str = "null";

/// A group-by key. Null sorts before every value key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Null,
    Value(String),
}

impl GroupKey {
    /// Canonical key for a cell value. NaN is the null key.
    ///
    /// A column may be typed `Int64` in one batch and `Float64` in the next, so integral floats
    /// render like integers (`2.0` and `2` share the key `"2"`).
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => GroupKey::Null,
            Value::Int64(v) => GroupKey::Value(v.to_string()),
            Value::Float64(v) if v.is_nan() => GroupKey::Null,
            // `-0.0` displays as "-0".
            Value::Float64(v) if *v == 0.0 => GroupKey::Value("0".to_string()),
            Value::Float64(v) => GroupKey::Value(v.to_string()),
            Value::Bool(b) => GroupKey::Value(b.to_string()),
            Value::Utf8(s) => GroupKey::Value(s.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GroupKey::Null => NULL_GROUP_KEY,
            GroupKey::Value(s) => s,
        }
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Cumulative counts per group key, owned by a single stream.
///
/// Serializes as a JSON object with keys in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RunningCounts {
    counts: BTreeMap<GroupKey, u64>,
}

impl RunningCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every row of `batch` to the counts using column `group_by`.
    ///
    /// Returns `false` without counting anything when the column is absent from the batch.
    pub fn update(&mut self, batch: &RecordBatch, group_by: &str) -> bool {
        let Some(idx) = batch.schema.index_of(group_by) else {
            return false;
        };
        for row in &batch.rows {
            let key = row.get(idx).map(GroupKey::from_value).unwrap_or(GroupKey::Null);
            *self.counts.entry(key).or_insert(0) += 1;
        }
        true
    }

    pub fn get(&self, key: &GroupKey) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// Total number of rows counted so far.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, u64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::{GroupKey, RunningCounts};
    use crate::types::{DataType, Field, RecordBatch, Schema, Value};

    fn batch(categories: &[Option<&str>]) -> RecordBatch {
        let schema = Schema::new(vec![Field::new("category", DataType::Utf8)]);
        RecordBatch::new(
            schema,
            categories
                .iter()
                .map(|c| vec![c.map(|s| Value::Utf8(s.to_string())).unwrap_or(Value::Null)])
                .collect(),
        )
    }

    #[test]
    fn counts_accumulate_across_batches() {
        let mut counts = RunningCounts::new();
        assert!(counts.update(&batch(&[Some("a"), Some("b")]), "category"));
        assert!(counts.update(&batch(&[Some("a"), None]), "category"));
        assert_eq!(counts.get(&GroupKey::Value("a".to_string())), Some(2));
        assert_eq!(counts.get(&GroupKey::Value("b".to_string())), Some(1));
        assert_eq!(counts.get(&GroupKey::Null), Some(1));
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn missing_column_counts_nothing() {
        let mut counts = RunningCounts::new();
        assert!(!counts.update(&batch(&[Some("a")]), "other"));
        assert!(counts.is_empty());
    }

    #[test]
    fn empty_batch_still_counts_as_present() {
        let mut counts = RunningCounts::new();
        assert!(counts.update(&batch(&[]), "category"));
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn serializes_sorted_with_null_first() {
        let mut counts = RunningCounts::new();
        counts.update(&batch(&[Some("b"), None, Some("a"), Some("b")]), "category");
        assert_eq!(
            serde_json::to_string(&counts).unwrap(),
            r#"{"null":1,"a":1,"b":2}"#
        );
    }

    #[test]
    fn key_formatting() {
        assert_eq!(GroupKey::from_value(&Value::Int64(3)).as_str(), "3");
        assert_eq!(GroupKey::from_value(&Value::Float64(2.0)).as_str(), "2");
        assert_eq!(GroupKey::from_value(&Value::Float64(-0.0)).as_str(), "0");
        assert_eq!(GroupKey::from_value(&Value::Float64(1e20)).as_str(), "100000000000000000000");
        assert_eq!(GroupKey::from_value(&Value::Float64(2.5)).as_str(), "2.5");
        assert_eq!(GroupKey::from_value(&Value::Bool(true)).as_str(), "true");
        assert_eq!(GroupKey::from_value(&Value::Float64(f64::NAN)), GroupKey::Null);
    }

    #[test]
    fn int_and_integral_float_batches_share_a_key() {
        let typed = |data_type, values: Vec<Value>| {
            let schema = Schema::new(vec![Field::new("k", data_type)]);
            RecordBatch::new(schema, values.into_iter().map(|v| vec![v]).collect())
        };
        let mut counts = RunningCounts::new();
        counts.update(&typed(DataType::Int64, vec![Value::Int64(1)]), "k");
        counts.update(
            &typed(DataType::Float64, vec![Value::Float64(2.5), Value::Float64(1.0)]),
            "k",
        );
        assert_eq!(serde_json::to_string(&counts).unwrap(), r#"{"1":2,"2.5":1}"#);
    }
}
