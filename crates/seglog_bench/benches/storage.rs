//! Segment read path benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use seglog_bench::{encoded_run, SegmentFixture};
use seglog_storage::{read_chunks_from, ReadCursor, StreamBufferPool};
use std::io::Cursor;

/// Benchmark read_range with and without a sparse index.
fn bench_read_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_range");
    group.sample_size(50);

    for indexed in [false, true] {
        let fixture = SegmentFixture::new(2000, 8, 400, indexed);
        let offset = fixture.end_offset() - 100;
        let label = if indexed { "indexed" } else { "scan" };

        group.bench_function(label, |b| {
            b.iter(|| {
                let outcome = fixture
                    .store
                    .read_range(&fixture.topic, 0, black_box(offset), 64 * 1024, 32)
                    .unwrap();
                black_box(outcome);
            });
        });
    }

    group.finish();
}

/// Benchmark the read loop over an in-memory segment.
fn bench_read_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_chunks_from");
    let data = encoded_run(1024, 300, 13);

    for max_records in [1usize, 64, 1024].iter() {
        group.throughput(Throughput::Elements(*max_records as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(max_records),
            max_records,
            |b, &max_records| {
                let mut buffer = vec![0u8; 256 * 1024];
                b.iter(|| {
                    let mut cursor = ReadCursor::new(&mut buffer[..], 256 * 1024, 512);
                    let outcome =
                        read_chunks_from(&mut Cursor::new(&data), &mut cursor, 2000, max_records, None)
                            .unwrap();
                    black_box(outcome);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark buffer pool acquire and release.
fn bench_pool(c: &mut Criterion) {
    let pool = StreamBufferPool::new(2, 4096);

    c.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let buf = pool.acquire();
            black_box(buf.len());
        });
    });
}

criterion_group!(benches, bench_read_range, bench_read_loop, bench_pool);
criterion_main!(benches);
