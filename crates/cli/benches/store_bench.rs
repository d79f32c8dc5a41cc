use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use store::TwinSlotStore;
use tempfile::tempdir;

const MAGIC: u64 = 0xBE7C;
const SMALL: usize = 64;
const LARGE: usize = 64 * 1024;

fn store_small_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut store = TwinSlotStore::open(dir.path().join("bench.dat"), MAGIC).unwrap();
    let payload = vec![b'x'; SMALL];

    c.bench_function("store_64b", |b| {
        b.iter(|| store.store(&payload).unwrap());
    });
}

fn store_large_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut store = TwinSlotStore::open(dir.path().join("bench.dat"), MAGIC).unwrap();
    let payload = vec![b'y'; LARGE];

    c.bench_function("store_64k", |b| {
        b.iter(|| store.store(&payload).unwrap());
    });
}

fn store_with_growth_benchmark(c: &mut Criterion) {
    c.bench_function("store_growth_64b_to_64k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let mut store =
                    TwinSlotStore::open(dir.path().join("bench.dat"), MAGIC).unwrap();
                store.store(&[b's'; SMALL]).unwrap();
                (dir, store)
            },
            |(_dir, mut store)| {
                store.store(&[b'g'; LARGE]).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn reopen_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.dat");
    {
        let mut store = TwinSlotStore::open(&path, MAGIC).unwrap();
        store.store(&vec![b'o'; LARGE]).unwrap();
        store.store(&vec![b'n'; LARGE]).unwrap();
    }

    c.bench_function("reopen_64k", |b| {
        b.iter(|| {
            let store = TwinSlotStore::open(&path, MAGIC).unwrap();
            assert_eq!(store.latest_payload().map(|p| p.len()), Some(LARGE));
        });
    });
}

criterion_group!(
    benches,
    store_small_benchmark,
    store_large_benchmark,
    store_with_growth_benchmark,
    reopen_benchmark
);
criterion_main!(benches);
