use cascade_core::{
    get_all_causes, propagate, simulate, CancellationToken, CausalGraph, DriverCatalog,
    EngineConfig, SimulationRequest,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_propagation(c: &mut Criterion) {
    let catalog = DriverCatalog::builtin();
    let graph = CausalGraph::from_catalog(&catalog);
    let config = EngineConfig::builtin();
    let mut group = c.benchmark_group("propagation");

    for driver in ["volcanic_eruption", "el_nino_onset", "arctic_sea_ice_loss"] {
        for depth in [2u32, 4, 6] {
            group.bench_with_input(
                BenchmarkId::new(driver, depth),
                &depth,
                |b, &depth| {
                    b.iter(|| {
                        propagate(&graph, driver, depth, &config.propagation, None)
                            .expect("builtin driver")
                    });
                },
            );
        }
    }

    group.bench_function("causes/wildfire", |b| {
        b.iter(|| {
            get_all_causes(&graph, "wildfire", 4, &config.propagation, None)
                .expect("builtin effect")
        });
    });

    group.finish();
}

fn bench_monte_carlo(c: &mut Criterion) {
    let catalog = DriverCatalog::builtin();
    let graph = CausalGraph::from_catalog(&catalog);
    let config = EngineConfig::builtin();
    let token = CancellationToken::new();
    let mut group = c.benchmark_group("monte_carlo");
    group.sample_size(20);

    for trials in [1_000u64, 10_000, 50_000] {
        group.bench_with_input(
            BenchmarkId::new("volcanic_eruption", trials),
            &trials,
            |b, &trials| {
                let request = SimulationRequest::new("volcanic_eruption", trials);
                b.iter(|| {
                    simulate(&graph, &request, &config.simulation, &token).expect("builtin driver")
                });
            },
        );
    }

    group.finish();
}

criterion_group!(cascade_benches, bench_propagation, bench_monte_carlo);
criterion_main!(cascade_benches);
