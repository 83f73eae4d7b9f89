use std::sync::Arc;

use cascade_core::{CascadeEngine, TessellationRequest, UniformGeodata};
use cascade_schema::{ClimateIndex, GeoPoint, LocalVulnerability};
use chrono::Utc;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn land_centers(count: usize) -> Vec<GeoPoint> {
    let mut rng = SmallRng::seed_from_u64(0x7e55);
    (0..count)
        .map(|_| GeoPoint::new(rng.gen_range(-40.0..-12.0), rng.gen_range(142.0..153.0)))
        .collect()
}

fn bench_tessellation(c: &mut Criterion) {
    let engine = CascadeEngine::builtin()
        .with_geodata(Arc::new(UniformGeodata(LocalVulnerability::default())));
    engine.update_climate_indices(vec![
        ClimateIndex::new("ONI", 1.8, "bench", Utc::now()),
        ClimateIndex::new("DMI", 0.9, "bench", Utc::now()),
    ]);
    let centers = land_centers(64);
    let mut group = c.benchmark_group("tessellation");
    group.sample_size(20);

    for radius_km in [25.0f64, 100.0, 250.0] {
        group.bench_with_input(
            BenchmarkId::new("resolution_6", radius_km as u32),
            &radius_km,
            |b, &radius_km| {
                let mut next = 0usize;
                b.iter_batched(
                    || {
                        next = (next + 1) % centers.len();
                        TessellationRequest::new(centers[next], radius_km).with_resolution(6)
                    },
                    |request| engine.generate_tessellation(&request).expect("valid request"),
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(tessellation_benches, bench_tessellation);
criterion_main!(tessellation_benches);
