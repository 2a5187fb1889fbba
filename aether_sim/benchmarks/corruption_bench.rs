use aether_sim::{
    AetherConfig, CellCoord, ClassificationId, CorruptionDriver, DriverState, GridHost,
    WorldStore,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn corrupted_world(size: i32) -> (AetherConfig, WorldStore, GridHost, DriverState) {
    let config = AetherConfig::default();
    let mut store = WorldStore::new(&config);
    let host = GridHost::new()
        .with_density("forest", &[("herba", 12), ("aer", 4)])
        .with_density("swamp", &[("aqua", 6), ("vitium", 9)])
        .with_area("forest", (0, size), (0, size))
        .with_area("swamp", (size, size + size / 2), (0, size));
    store.force_corruption(&ClassificationId::new("forest"), 17);
    let state = DriverState::new(&config);
    (config, store, host, state)
}

fn bench_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("corruption_window");

    for size in [8i32, 16, 32, 64] {
        group.bench_with_input(BenchmarkId::new("grid", size), &size, |b, &size| {
            b.iter_batched(
                || corrupted_world(size),
                |(config, mut store, mut host, mut state)| {
                    CorruptionDriver::new(&config, &mut store, &mut host, &mut state)
                        .run_window(0)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_region_discovery(c: &mut Criterion) {
    let config = AetherConfig::default();
    let store = WorldStore::new(&config);
    let host = GridHost::new().with_area("plains", (-64, 64), (-64, 64));

    c.bench_function("discover_region/plains", |b| {
        b.iter(|| store.discover_region_at(&host, CellCoord::new(0, 0)))
    });
}

criterion_group!(corruption_benches, bench_window, bench_region_discovery);
criterion_main!(corruption_benches);
