use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tablekv::{JournalMode, Store, StoreBuilder, SyncMode};
use tempfile::TempDir;

fn bench_store(temp_dir: &TempDir) -> Store {
    let mut store = StoreBuilder::new()
        .sync_mode(SyncMode::Off)
        .journal_mode(JournalMode::Memory)
        .build()
        .unwrap();
    assert!(store.create(temp_dir.path().join("bench.kv"), true).unwrap());
    store
}

fn populate(store: &mut Store, count: usize) {
    store
        .with_batch(|store| {
            for i in 0..count {
                store.set(format!("key-{:08}", i), format!("value-{}", i));
            }
            Ok(())
        })
        .unwrap();
}

/// Batched inserts at several sizes
fn bench_batched_sets(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_sets");

    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_with_setup(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let store = bench_store(&temp_dir);
                    (temp_dir, store)
                },
                |(_temp_dir, mut store)| {
                    populate(&mut store, count);
                    black_box(&store);
                },
            );
        });
    }

    group.finish();
}

/// Random point lookups against a populated table
fn bench_gets(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let mut store = bench_store(&temp_dir);
    populate(&mut store, 10_000);

    let mut rng = StdRng::seed_from_u64(42);
    let mut group = c.benchmark_group("gets");

    group.bench_function("hit", |b| {
        b.iter(|| {
            let key = format!("key-{:08}", rng.gen_range(0..10_000));
            black_box(store.get(&key))
        });
    });

    group.bench_function("miss", |b| {
        b.iter(|| {
            let key = format!("absent-{}", rng.gen::<u32>());
            black_box(store.get(&key))
        });
    });

    group.bench_function("contains", |b| {
        b.iter(|| {
            let key = format!("key-{:08}", rng.gen_range(0..10_000));
            black_box(store.contains(&key))
        });
    });

    group.finish();
}

/// Full scans with different page sizes
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(10_000));

    for page_size in [16, 256, 4096] {
        let temp_dir = TempDir::new().unwrap();
        let mut store = StoreBuilder::new()
            .sync_mode(SyncMode::Off)
            .scan_page_size(page_size)
            .build()
            .unwrap();
        assert!(store.create(temp_dir.path().join("scan.kv"), true).unwrap());
        populate(&mut store, 10_000);

        group.bench_with_input(
            BenchmarkId::from_parameter(page_size),
            &page_size,
            |b, _| {
                b.iter(|| black_box(store.entries().map(|entries| entries.count())));
            },
        );
    }

    group.finish();
}

/// Switching between tables keeps per-table statements warm
fn bench_table_switch(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let mut store = bench_store(&temp_dir);
    let names: Vec<String> = (0..8).map(|i| format!("table-{}", i)).collect();
    for name in &names {
        store.create_table(name);
        store.set("key", name);
    }

    let mut i = 0;
    c.bench_function("table_switch_get", |b| {
        b.iter(|| {
            i = (i + 1) % names.len();
            store.set_table(&names[i]);
            black_box(store.get("key"))
        });
    });
}

criterion_group!(
    benches,
    bench_batched_sets,
    bench_gets,
    bench_scan,
    bench_table_switch
);
criterion_main!(benches);
