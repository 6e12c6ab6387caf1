//! Metadata merge benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docrel_core::{
    merge_snapshot, FieldType, IdentifierFactory, ImmutableMetaSnapshot, MutableMetaSnapshot,
    TableRef,
};
use std::sync::Arc;

/// Build a committed snapshot with `collections` collections of `fields`
/// fields each.
fn wide_snapshot(collections: usize, fields: usize) -> ImmutableMetaSnapshot {
    let factory = IdentifierFactory::default();
    let mut changes = MutableMetaSnapshot::new(Arc::new(ImmutableMetaSnapshot::empty()));
    for c in 0..collections {
        for f in 0..fields {
            changes
                .get_or_create_field(
                    &factory,
                    "bench",
                    &format!("col{c}"),
                    &TableRef::root(),
                    &format!("field{f}"),
                    FieldType::Integer,
                )
                .unwrap();
        }
    }
    merge_snapshot(&ImmutableMetaSnapshot::empty(), &changes).unwrap()
}

/// Benchmark merging one new field into snapshots of growing size.
fn bench_single_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_single_field");
    let factory = IdentifierFactory::default();

    for collections in [1, 10, 100].iter() {
        let base = Arc::new(wide_snapshot(*collections, 20));
        group.bench_with_input(BenchmarkId::from_parameter(collections), &base, |b, base| {
            let mut changes = MutableMetaSnapshot::new(Arc::clone(base));
            changes
                .get_or_create_field(&factory, "bench", "col0", &TableRef::root(), "extra", FieldType::Long)
                .unwrap();

            b.iter(|| merge_snapshot(black_box(base), black_box(&changes)).unwrap());
        });
    }
    group.finish();
}

/// Benchmark merging many new fields at once.
fn bench_batch_fields(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_batch_fields");
    let factory = IdentifierFactory::default();
    let base = Arc::new(wide_snapshot(10, 20));

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let mut changes = MutableMetaSnapshot::new(Arc::clone(&base));
                for i in 0..batch_size {
                    changes
                        .get_or_create_field(
                            &factory,
                            "bench",
                            "col0",
                            &TableRef::root(),
                            &format!("new{i}"),
                            FieldType::String,
                        )
                        .unwrap();
                }

                b.iter(|| merge_snapshot(black_box(&base), black_box(&changes)).unwrap());
            },
        );
    }
    group.finish();
}

/// Benchmark a stale transaction re-declaring the whole tree.
fn bench_idempotent_redeclare(c: &mut Criterion) {
    let base = wide_snapshot(10, 20);
    let changes = docrel_testkit::redeclare(&base);

    c.bench_function("merge_idempotent_redeclare", |b| {
        b.iter(|| merge_snapshot(black_box(&base), black_box(&changes)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_single_field,
    bench_batch_fields,
    bench_idempotent_redeclare
);
criterion_main!(benches);
