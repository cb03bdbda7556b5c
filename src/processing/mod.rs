//! Per-batch transformations applied between the reader and the encoder.
//!
//! Each stage wraps an upstream `Iterator<Item = StreamResult<RecordBatch>>` and is itself such
//! an iterator, so stages compose by plain wrapping and stay lazy: nothing is read until the
//! final consumer pulls.
//!
//! - [`FilterStage`]: drops rows that do not satisfy a [`Predicate`]
//! - [`EnrichStage`]: appends `output = source * factor` per [`ScaleSpec`]
//! - [`RunningCounts`]: cumulative group counts used by the encoder
//!
//! ## Example: filter → enrich
//!
//! ```rust
//! use csv_ndjson_stream::ingestion::{CsvBatchReader, ReaderOptions};
//! use csv_ndjson_stream::processing::{EnrichStage, FilterStage, Predicate, ScaleSpec};
//! use csv_ndjson_stream::types::Value;
//!
//! let csv = "category,value\na,5\nb,20\na,30\n";
//! let reader = CsvBatchReader::from_reader(csv.as_bytes(), &ReaderOptions::new(2)).unwrap();
//! let filtered = FilterStage::new(reader, Some(Predicate::parse("value > 10").unwrap()));
//! let enriched = EnrichStage::new(filtered, Some(ScaleSpec::new("value", 2.0, "double")));
//!
//! let batches: Vec<_> = enriched.map(Result::unwrap).collect();
//! assert_eq!(batches.len(), 2);
//! assert_eq!(batches[0].rows[0][2], Value::Float64(40.0));
//! assert_eq!(batches[1].rows[0][2], Value::Float64(60.0));
//! ```

pub mod aggregate;
pub mod enrich;
pub mod filter;
pub mod predicate;

pub use aggregate::{GroupKey, RunningCounts, NULL_GROUP_KEY};
pub use enrich::{enrich_batch, EnrichStage, ScaleSpec};
pub use filter::{filter_batch, FilterStage};
pub use predicate::{BoundPredicate, Predicate};
