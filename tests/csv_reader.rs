use csv_ndjson_stream::ingestion::{CsvBatchReader, ReaderOptions};
use csv_ndjson_stream::types::{DataType, RecordBatch, Value};
use csv_ndjson_stream::StreamError;

fn read_all(path: &str, options: &ReaderOptions) -> Vec<RecordBatch> {
    CsvBatchReader::open(path, options)
        .unwrap()
        .map(Result::unwrap)
        .collect()
}

#[test]
fn reads_people_fixture_with_inferred_types() {
    let batches = read_all("tests/fixtures/people.csv", &ReaderOptions::new(10));
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];

    let names: Vec<&str> = batch.schema.field_names().collect();
    assert_eq!(names, vec!["id", "name", "score", "active", "name.1"]);
    let types: Vec<DataType> = batch.schema.fields.iter().map(|f| f.data_type).collect();
    assert_eq!(
        types,
        vec![
            DataType::Int64,
            DataType::Utf8,
            DataType::Float64,
            DataType::Bool,
            DataType::Utf8
        ]
    );

    assert_eq!(
        batch.rows[1],
        vec![
            Value::Int64(2),
            Value::Null,
            Value::Null,
            Value::Bool(false),
            Value::Utf8("y".to_string()),
        ]
    );
    // Short record is padded with nulls.
    assert_eq!(batch.rows[2][4], Value::Null);
    assert_eq!(batch.rows[2][2], Value::Float64(71.0));
}

#[test]
fn batches_preserve_file_order_and_size_bound() {
    let batches = read_all("tests/fixtures/sample.csv", &ReaderOptions::new(2));
    let sizes: Vec<usize> = batches.iter().map(RecordBatch::row_count).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let categories: Vec<Value> = batches
        .iter()
        .flat_map(|b| b.rows.iter().map(|r| r[0].clone()))
        .collect();
    let expected: Vec<Value> = ["a", "b", "a", "c", "b"]
        .iter()
        .map(|s| Value::Utf8(s.to_string()))
        .collect();
    assert_eq!(categories, expected);
}

#[test]
fn chunk_size_larger_than_file_yields_one_batch() {
    let batches = read_all("tests/fixtures/sample.csv", &ReaderOptions::new(1_000));
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].row_count(), 5);
}

#[test]
fn oversized_chunk_size_does_not_preallocate() {
    let mut reader =
        CsvBatchReader::from_reader("a\n1\n".as_bytes(), &ReaderOptions::new(usize::MAX)).unwrap();
    let batch = reader.next().unwrap().unwrap();
    assert_eq!(batch.row_count(), 1);
    assert!(reader.next().is_none());
}

#[test]
fn column_allow_list_keeps_file_order() {
    let opts = ReaderOptions::new(10).with_columns(vec!["score".to_string(), "id".to_string()]);
    let reader = CsvBatchReader::open("tests/fixtures/people.csv", &opts).unwrap();
    assert_eq!(reader.column_names().collect::<Vec<_>>(), vec!["id", "score"]);
    let batch = reader.map(Result::unwrap).next().unwrap();
    assert_eq!(batch.rows[0], vec![Value::Int64(1), Value::Float64(98.5)]);
}

#[test]
fn unknown_allow_list_column_is_rejected_at_open() {
    let opts = ReaderOptions::new(10).with_columns(vec!["nope".to_string()]);
    let err = CsvBatchReader::open("tests/fixtures/people.csv", &opts)
        .err()
        .unwrap();
    assert!(matches!(err, StreamError::InvalidConfiguration { .. }));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn missing_file_is_source_not_found() {
    let err = CsvBatchReader::open("tests/fixtures/does_not_exist.csv", &ReaderOptions::new(10))
        .err()
        .unwrap();
    assert!(matches!(err, StreamError::SourceNotFound { .. }));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn directory_is_source_not_found() {
    let err = CsvBatchReader::open("tests/fixtures", &ReaderOptions::new(10))
        .err()
        .unwrap();
    assert!(matches!(err, StreamError::SourceNotFound { .. }));
}

#[test]
fn empty_file_is_malformed() {
    let err = CsvBatchReader::open("tests/fixtures/empty.csv", &ReaderOptions::new(10))
        .err()
        .unwrap();
    assert!(matches!(err, StreamError::MalformedInput { .. }));
}

#[test]
fn header_only_file_yields_no_batches() {
    let batches = read_all("tests/fixtures/header_only.csv", &ReaderOptions::new(10));
    assert!(batches.is_empty());
}

#[test]
fn too_many_fields_reports_line_and_stops() {
    let mut reader =
        CsvBatchReader::open("tests/fixtures/malformed.csv", &ReaderOptions::new(1)).unwrap();
    assert_eq!(reader.next().unwrap().unwrap().row_count(), 1);
    match reader.next().unwrap() {
        Err(StreamError::MalformedInput { row, .. }) => assert_eq!(row, 3),
        other => panic!("expected MalformedInput, got {other:?}"),
    }
    assert!(reader.next().is_none());
}

#[test]
fn types_are_inferred_per_batch() {
    let batches = read_all("tests/fixtures/mixed.csv", &ReaderOptions::new(1));
    let types: Vec<DataType> = batches.iter().map(|b| b.schema.fields[1].data_type).collect();
    assert_eq!(types, vec![DataType::Int64, DataType::Utf8, DataType::Int64]);
}
