//! Incremental CSV reading into [`RecordBatch`]es.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::{StreamError, StreamResult};
use crate::types::{DataType, Field, RecordBatch, Schema, Value};

/// Cell contents treated as missing values.
const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NULL", "null", "NaN", "nan", "-NaN", "-nan", "None", "#N/A",
    "#N/A N/A", "#NA", "<NA>", "1.#IND", "-1.#IND", "1.#QNAN", "-1.#QNAN",
];

/// Upper bound on rows reserved before a batch is read; larger batches grow on demand.
const PREALLOC_ROWS: usize = 1024;

/// Options controlling [`CsvBatchReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Maximum number of records per batch. Must be > 0.
    pub batch_size: usize,
    /// Optional column allow-list. Selected columns keep file order.
    pub columns: Option<Vec<String>>,
}

impl ReaderOptions {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            columns: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }
}

/// Lazy, single-pass reader yielding batches of at most `batch_size` records in file order.
///
/// Rules:
///
/// - The first line is the header; duplicate names get `.1`, `.2`, ... suffixes.
/// - Column types are inferred per batch (`Int64`, then `Float64`, then `Bool`, else `Utf8`).
/// - A record with more fields than the header is a [`StreamError::MalformedInput`]; a record
///   with fewer fields is padded with nulls.
/// - After the first error the reader yields nothing further.
pub struct CsvBatchReader<R: Read> {
    rdr: csv::Reader<R>,
    header_len: usize,
    // (name, header index) of every selected column, in file order.
    selected: Vec<(String, usize)>,
    batch_size: usize,
    record: csv::StringRecord,
    // 1-based line number of the last record read; the header is line 1.
    line: usize,
    done: bool,
}

impl CsvBatchReader<File> {
    /// Open `path` and read its header.
    ///
    /// Fails with [`StreamError::SourceNotFound`] when the path is missing, is not a regular
    /// file, or cannot be opened.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> StreamResult<Self> {
        let path = path.as_ref();
        let file = open_source(path)?;
        Self::from_reader(file, options)
    }
}

impl<R: Read> CsvBatchReader<R> {
    /// Build a reader over any byte source. The header is read eagerly.
    pub fn from_reader(source: R, options: &ReaderOptions) -> StreamResult<Self> {
        if options.batch_size == 0 {
            return Err(StreamError::config("chunksize must be > 0"));
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let raw_headers = rdr.headers().map_err(|e| csv_error(1, e))?.clone();
        if raw_headers.is_empty() || (raw_headers.len() == 1 && raw_headers[0].trim().is_empty()) {
            return Err(StreamError::MalformedInput {
                row: 1,
                message: "no columns to parse from file".to_string(),
            });
        }
        let headers = dedupe_headers(raw_headers.iter());

        let selected = match &options.columns {
            None => headers.into_iter().enumerate().map(|(i, h)| (h, i)).collect(),
            Some(wanted) => {
                let missing: Vec<&str> = wanted
                    .iter()
                    .filter(|w| !headers.iter().any(|h| h == *w))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return Err(StreamError::config(format!(
                        "columns not found in source: {missing:?}. headers={headers:?}"
                    )));
                }
                headers
                    .into_iter()
                    .enumerate()
                    .filter(|(_, h)| wanted.iter().any(|w| w == h))
                    .map(|(i, h)| (h, i))
                    .collect()
            }
        };

        Ok(Self {
            rdr,
            header_len: raw_headers.len(),
            selected,
            batch_size: options.batch_size,
            record: csv::StringRecord::new(),
            line: 1,
            done: false,
        })
    }

    /// Names of the columns every batch will carry, in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(|(name, _)| name.as_str())
    }

    fn read_batch(&mut self) -> StreamResult<Option<RecordBatch>> {
        let mut raw_rows: Vec<Vec<Option<String>>> =
            Vec::with_capacity(self.batch_size.min(PREALLOC_ROWS));

        while raw_rows.len() < self.batch_size {
            let more = self
                .rdr
                .read_record(&mut self.record)
                .map_err(|e| csv_error(self.line + 1, e))?;
            if !more {
                break;
            }
            self.line = self
                .record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(self.line + 1);

            if self.record.len() > self.header_len {
                return Err(StreamError::MalformedInput {
                    row: self.line,
                    message: format!(
                        "expected {} fields, saw {}",
                        self.header_len,
                        self.record.len()
                    ),
                });
            }

            let row = self
                .selected
                .iter()
                .map(|(_, idx)| self.record.get(*idx).and_then(normalize_cell))
                .collect();
            raw_rows.push(row);
        }

        if raw_rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(type_batch(&self.selected, raw_rows)))
    }
}

impl<R: Read> Iterator for CsvBatchReader<R> {
    type Item = StreamResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn open_source(path: &Path) -> StreamResult<File> {
    let not_found = |reason: String| StreamError::SourceNotFound {
        path: PathBuf::from(path),
        reason,
    };
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => not_found(e.to_string()),
        _ => StreamError::Io(e),
    })?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(not_found("not a regular file".to_string()));
    }
    Ok(file)
}

fn csv_error(row: usize, e: csv::Error) -> StreamError {
    let row = e.position().map(|p| p.line() as usize).unwrap_or(row);
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(io) => StreamError::Io(io),
        _ => StreamError::MalformedInput { row, message },
    }
}

fn dedupe_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in raw {
        let base = name.trim().to_string();
        let mut candidate = base.clone();
        let mut n = 0;
        while out.contains(&candidate) {
            n += 1;
            candidate = format!("{base}.{n}");
        }
        out.push(candidate);
    }
    out
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if NA_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn type_batch(selected: &[(String, usize)], raw_rows: Vec<Vec<Option<String>>>) -> RecordBatch {
    let types: Vec<DataType> = (0..selected.len())
        .map(|col| infer_column_type(raw_rows.iter().filter_map(|r| r[col].as_deref())))
        .collect();

    let rows = raw_rows
        .into_iter()
        .map(|raw| {
            raw.into_iter()
                .zip(types.iter())
                .map(|(cell, ty)| match cell {
                    None => Value::Null,
                    Some(s) => convert_cell(s, *ty),
                })
                .collect()
        })
        .collect();

    let fields = selected
        .iter()
        .zip(types)
        .map(|((name, _), ty)| Field::new(name.clone(), ty))
        .collect();
    RecordBatch::new(Schema::new(fields), rows)
}

/// Infer the narrowest type that fits every non-null cell of a column.
fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str>) -> DataType {
    let mut seen_any = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;
    for cell in cells {
        seen_any = true;
        if all_int && cell.parse::<i64>().is_err() {
            all_int = false;
        }
        if all_float && !all_int && cell.parse::<f64>().is_err() {
            all_float = false;
        }
        if all_bool && parse_bool(cell).is_none() {
            all_bool = false;
        }
        if !all_int && !all_float && !all_bool {
            return DataType::Utf8;
        }
    }
    if !seen_any {
        return DataType::Float64;
    }
    if all_int {
        DataType::Int64
    } else if all_float {
        DataType::Float64
    } else {
        DataType::Bool
    }
}

fn convert_cell(cell: String, ty: DataType) -> Value {
    // Types were inferred from these very cells, so the fallbacks are unreachable in practice.
    match ty {
        DataType::Int64 => cell.parse().map(Value::Int64).unwrap_or(Value::Utf8(cell)),
        DataType::Float64 => cell.parse().map(Value::Float64).unwrap_or(Value::Utf8(cell)),
        DataType::Bool => parse_bool(&cell).map(Value::Bool).unwrap_or(Value::Utf8(cell)),
        DataType::Utf8 => Value::Utf8(cell),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}
