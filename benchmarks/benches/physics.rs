//! Physics engine benchmarks (criterion - wall-clock time).
//!
//! Run all:    cargo bench --manifest-path benchmarks/Cargo.toml --bench physics
//! Filter:     cargo bench --manifest-path benchmarks/Cargo.toml --bench physics -- dynamic_tree

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use rein2d::physics::collider::{DiskShape, PolygonShape, Shape};
use rein2d::physics::distance::{distance, SimplexCache};
use rein2d::physics::dynamic_tree::DynamicTree;
use rein2d::physics::manifold::collide_shapes;
use rein2d::physics::math::{Rot, Sweep, Transformation};
use rein2d::physics::toi::{time_of_impact, ToiConf};
use rein2d::StepConf;
use rein2d_bench::*;

// ---------------------------------------------------------------------------
// Broad phase
// ---------------------------------------------------------------------------

fn bench_dynamic_tree(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("dynamic_tree/insert");
        for &n in &[100, 1000, 5000] {
            let boxes = scattered_aabbs(n, 100.0);
            group.bench_with_input(BenchmarkId::from_parameter(n), &boxes, |b, boxes| {
                b.iter(|| {
                    let mut tree = DynamicTree::<usize>::default();
                    for (i, aabb) in boxes.iter().enumerate() {
                        tree.create_proxy(*aabb, i);
                    }
                    tree
                });
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("dynamic_tree/query");
        for &n in &[100, 1000, 5000] {
            let boxes = scattered_aabbs(n, 100.0);
            let mut tree = DynamicTree::<usize>::default();
            for (i, aabb) in boxes.iter().enumerate() {
                tree.create_proxy(*aabb, i);
            }
            group.bench_with_input(BenchmarkId::from_parameter(n), &boxes, |b, boxes| {
                b.iter(|| {
                    let mut hits = 0usize;
                    for aabb in boxes {
                        tree.query(aabb, |_| {
                            hits += 1;
                            true
                        });
                    }
                    hits
                });
            });
        }
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// Narrow phase
// ---------------------------------------------------------------------------

fn bench_narrowphase(c: &mut Criterion) {
    let square: Shape = PolygonShape::new_box(0.5, 0.5)
        .expect("valid box")
        .into();
    let disk: Shape = DiskShape::new(0.5).into();
    let square_proxy = square.child(0).expect("box child");
    let disk_proxy = disk.child(0).expect("disk child");
    let xf_a = Transformation::IDENTITY;

    {
        let mut group = c.benchmark_group("narrowphase/distance");
        let near = Transformation::new(Vec2::new(0.9, 0.3), Rot::from_angle(0.4));
        let far = Transformation::new(Vec2::new(5.0, 0.0), Rot::from_angle(0.4));
        group.bench_function("polygon_near", |b| {
            b.iter(|| {
                let mut cache = SimplexCache::default();
                distance(&mut cache, &square_proxy, &xf_a, &square_proxy, &near)
            });
        });
        group.bench_function("polygon_far", |b| {
            b.iter(|| {
                let mut cache = SimplexCache::default();
                distance(&mut cache, &square_proxy, &xf_a, &square_proxy, &far)
            });
        });
        group.bench_function("polygon_disk", |b| {
            b.iter(|| {
                let mut cache = SimplexCache::default();
                distance(&mut cache, &square_proxy, &xf_a, &disk_proxy, &near)
            });
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/manifold");
        let xf_b = Transformation::new(Vec2::new(0.95, 0.2), Rot::from_angle(0.1));
        group.bench_function("polygon_polygon", |b| {
            b.iter(|| collide_shapes(&square_proxy, &xf_a, &square_proxy, &xf_b));
        });
        group.bench_function("polygon_disk", |b| {
            b.iter(|| collide_shapes(&square_proxy, &xf_a, &disk_proxy, &xf_b));
        });
        group.bench_function("disk_disk", |b| {
            b.iter(|| collide_shapes(&disk_proxy, &xf_a, &disk_proxy, &xf_b));
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/time_of_impact");
        let conf = ToiConf::default();
        let still = Sweep::default();
        let falling = Sweep {
            c0: Vec2::new(0.0, 10.0),
            c: Vec2::new(0.2, -10.0),
            a0: 0.0,
            a: 1.0,
            ..Sweep::default()
        };
        group.bench_function("polygon_polygon", |b| {
            b.iter(|| time_of_impact(&square_proxy, still, &square_proxy, falling, &conf));
        });
        group.bench_function("disk_polygon", |b| {
            b.iter(|| time_of_impact(&square_proxy, still, &disk_proxy, falling, &conf));
        });
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// World step
// ---------------------------------------------------------------------------

fn bench_world(c: &mut Criterion) {
    let conf = StepConf::default();

    {
        let mut group = c.benchmark_group("world/pyramid_60_steps");
        group.sample_size(20);
        for &rows in &[5, 10, 20] {
            group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
                b.iter_batched(
                    || setup_pyramid(rows).expect("pyramid"),
                    |mut world| run_steps(&mut world, &conf, 60).expect("steps"),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("world/disk_rain_60_steps");
        group.sample_size(20);
        for &n in &[100, 400, 1000] {
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
                b.iter_batched(
                    || setup_disk_rain(n).expect("disk rain"),
                    |mut world| run_steps(&mut world, &conf, 60).expect("steps"),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("world/bullets_30_steps");
        group.sample_size(20);
        for &n in &[10, 50] {
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
                b.iter_batched(
                    || setup_bullets(n).expect("bullets"),
                    |mut world| run_steps(&mut world, &conf, 30).expect("steps"),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_dynamic_tree, bench_narrowphase, bench_world);
criterion_main!(benches);
