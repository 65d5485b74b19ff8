use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;

use rtseg::core::config::SegmentConfig;
use rtseg::core::stats::StatsHistory;
use rtseg::core::types::{DataType, Row, Value};
use rtseg::memory::manager::MemoryManager;
use rtseg::schema::schema::Schema;
use rtseg::segment::mutable::MutableSegment;

fn schema() -> Schema {
    Schema::new()
        .add_dimension("dim", DataType::String)
        .add_dimension("site", DataType::Int)
        .add_metric("clicks", DataType::Long)
        .add_time("time", DataType::Long)
}

fn segment(capacity: u32, inverted: &[&str]) -> MutableSegment {
    let manager = Arc::new(MemoryManager::new(true));
    let stats = StatsHistory::in_memory();
    let mut config = SegmentConfig::new("benchSegment", "benchStream", schema(), capacity, manager, stats);
    config.inverted_index_columns = inverted.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
    MutableSegment::new(config).unwrap()
}

/// Helper to create benchmark rows
fn create_row(i: u64, cardinality: u64) -> Row {
    let mut rng = rand::thread_rng();
    let mut row = Row::new();
    row.put("dim", Value::Str(format!("dim-{}", i % cardinality)));
    row.put("site", Value::Int(rng.gen_range(0..1000)));
    row.put("clicks", Value::Long(rng.gen_range(0..100)));
    row.put("time", Value::Long(1_600_000_000_000 + i as i64));
    row
}

/// Benchmark single row ingestion
fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_row");
    for cardinality in [10u64, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(cardinality),
            &cardinality,
            |b, &cardinality| {
                let seg = segment(50_000_000, &["dim"]);
                let mut i = 0;
                b.iter(|| {
                    seg.index(&create_row(i, cardinality), None).unwrap();
                    i += 1;
                });
            },
        );
    }
    group.finish();
}

/// Benchmark point reads against a populated segment
fn bench_record(c: &mut Criterion) {
    let seg = segment(100_000, &["dim"]);
    for i in 0..100_000u64 {
        seg.index(&create_row(i, 1000), None).unwrap();
    }
    let mut reuse = Row::new();
    let mut i = 0u32;
    c.bench_function("record", |b| {
        b.iter(|| {
            seg.record(i % 100_000, &mut reuse).unwrap();
            black_box(&reuse);
            i += 1;
        });
    });
}

/// Benchmark sorted doc-id iteration
fn bench_sorted_iteration(c: &mut Criterion) {
    let seg = segment(100_000, &["dim"]);
    for i in 0..100_000u64 {
        seg.index(&create_row(i, 1000), None).unwrap();
    }
    c.bench_function("sorted_doc_id_iteration", |b| {
        b.iter(|| black_box(seg.sorted_doc_id_iteration("dim").unwrap()));
    });
}

criterion_group!(benches, bench_index, bench_record, bench_sorted_iteration);
criterion_main!(benches);
