//! Source readers.
//!
//! The only source format is CSV, read incrementally by [`csv::CsvBatchReader`]: the file is
//! opened once per stream and consumed batch by batch as downstream stages pull.

pub mod csv;

pub use self::csv::{CsvBatchReader, ReaderOptions};
