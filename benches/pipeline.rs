use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use csv_ndjson_stream::ingestion::{CsvBatchReader, ReaderOptions};
use csv_ndjson_stream::pipeline::FrameEncoder;
use csv_ndjson_stream::processing::{EnrichStage, FilterStage, Predicate, ScaleSpec};

const ROWS: usize = 50_000;

fn build_csv(rows: usize) -> String {
    let categories = ["north", "south", "east", "west"];
    let mut out = String::from("id,category,value,active\n");
    for i in 0..rows {
        out.push_str(&format!(
            "{},{},{:.2},{}\n",
            i,
            categories[i % categories.len()],
            (i % 1000) as f64 * 0.75,
            i % 3 == 0
        ));
    }
    out
}

fn stream_bytes(csv: &[u8], chunk_size: usize, predicate: Option<&Predicate>) -> usize {
    let reader = CsvBatchReader::from_reader(csv, &ReaderOptions::new(chunk_size)).unwrap();
    let filtered = FilterStage::new(reader, predicate.cloned());
    let enriched = EnrichStage::new(filtered, Some(ScaleSpec::new("value", 2.0, "value_scaled")));
    FrameEncoder::new(enriched, Some("category".to_string()))
        .map(|line| line.unwrap().len())
        .sum()
}

fn bench_pipeline(c: &mut Criterion) {
    let csv = build_csv(ROWS);
    let predicate = Predicate::parse("value > 100 and category != 'east'").unwrap();

    let mut group = c.benchmark_group("csv_to_ndjson");
    group.throughput(Throughput::Bytes(csv.len() as u64));
    for chunk_size in [100_usize, 1_000, 5_000] {
        group.bench_with_input(
            BenchmarkId::new("passthrough", chunk_size),
            &chunk_size,
            |b, &n| b.iter(|| black_box(stream_bytes(csv.as_bytes(), n, None))),
        );
        group.bench_with_input(
            BenchmarkId::new("filtered", chunk_size),
            &chunk_size,
            |b, &n| b.iter(|| black_box(stream_bytes(csv.as_bytes(), n, Some(&predicate)))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
