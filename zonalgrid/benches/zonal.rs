//! Benchmark for the zonal-statistics hot path
//!
//! Run with: cargo bench -p zonalgrid

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo::{polygon, MultiPolygon};
use ndarray::Array2;
use zonalgrid::zonal::{zonal_stats, ZonalStat};
use zonalgrid::{GeoTransform, Grid};

fn synthetic_grid(size: usize) -> Grid<f32> {
    Grid::new(
        Array2::from_shape_fn((size, size), |(r, c)| ((r * 31 + c * 17) % 97) as f32),
        GeoTransform::north_up(0.0, size as f64, 1.0, -1.0),
        4326,
    )
    .unwrap()
}

fn synthetic_zones(size: usize, n: usize) -> Vec<MultiPolygon> {
    let step = size as f64 / n as f64;
    (0..n)
        .map(|i| {
            let x0 = i as f64 * step;
            MultiPolygon(vec![polygon![
                (x: x0, y: 0.0),
                (x: x0 + step, y: 0.0),
                (x: x0 + step, y: size as f64),
                (x: x0, y: size as f64),
                (x: x0, y: 0.0),
            ]])
        })
        .collect()
}

fn bench_zonal_sum(c: &mut Criterion) {
    let grid = synthetic_grid(512);
    let zones = synthetic_zones(512, 16);

    let mut group = c.benchmark_group("zonal");
    group.bench_function("sum_512_16zones_centers", |b| {
        b.iter(|| zonal_stats(black_box(&zones), black_box(&grid), ZonalStat::Sum, false).unwrap())
    });
    group.bench_function("sum_512_16zones_all_touched", |b| {
        b.iter(|| zonal_stats(black_box(&zones), black_box(&grid), ZonalStat::Sum, true).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_zonal_sum);
criterion_main!(benches);
