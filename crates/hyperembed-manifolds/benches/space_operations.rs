//! Benchmarks for the per-step vector space operations
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hyperembed_core::ManifoldKind;
use hyperembed_manifolds::{Space, VectorSpace};
use rand::{rngs::SmallRng, SeedableRng};

fn benchmark_space(c: &mut Criterion, kind: ManifoldKind, group_name: &str) {
    let mut group = c.benchmark_group(group_name);
    let mut rng = SmallRng::seed_from_u64(42);

    for &dim in &[2, 10, 50] {
        let space = Space::new(kind, dim, 1.0, false).unwrap();
        let a = space.random_point(&mut rng);
        let b = space.random_point(&mut rng);

        group.bench_with_input(BenchmarkId::new("dist", dim), &dim, |bench, _| {
            bench.iter(|| space.dist(black_box(&a), black_box(&b)));
        });

        group.bench_with_input(BenchmarkId::new("diff_dist", dim), &dim, |bench, _| {
            let mut ga = space.zeros();
            let mut gb = space.zeros();
            bench.iter(|| {
                space.diff_dist(black_box(&a), black_box(&b), &mut ga, &mut gb, 1.0);
            });
        });

        group.bench_with_input(BenchmarkId::new("exp_map", dim), &dim, |bench, _| {
            let tangent = (&b - &a) * 0.01;
            let mut out = space.zeros();
            bench.iter(|| space.exp_map(black_box(&a), black_box(&tangent), &mut out));
        });
    }

    group.finish();
}

fn benchmark_poincare(c: &mut Criterion) {
    benchmark_space(c, ManifoldKind::Poincare, "poincare");
}

fn benchmark_lorentz(c: &mut Criterion) {
    benchmark_space(c, ManifoldKind::Lorentz, "lorentz");
}

fn benchmark_stack(c: &mut Criterion) {
    benchmark_space(c, ManifoldKind::PoincareStack, "poincare_stack");
}

criterion_group!(benches, benchmark_poincare, benchmark_lorentz, benchmark_stack);
criterion_main!(benches);
