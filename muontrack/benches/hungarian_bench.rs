use criterion::{black_box, criterion_group, criterion_main, Criterion};
use muontrack::hungarian::HungarianSolver;
use ndarray::Array2;
use rand::prelude::*;

/// Scores look like -ln P values: mostly small, a tail of poor matches
fn generate_random_cost_matrix(standalone: usize, tracker: usize) -> Array2<f32> {
    let mut rng = thread_rng();
    Array2::from_shape_fn((standalone, tracker), |_| {
        let u: f32 = rng.gen_range(0.0..1.0);
        -(1.0 - u).max(1e-6).ln() * 10.0
    })
}

fn bench_hungarian_small(c: &mut Criterion) {
    let cost_matrix = generate_random_cost_matrix(4, 20);

    c.bench_function("hungarian_4x20", |b| {
        b.iter(|| HungarianSolver::solve(black_box(cost_matrix.view()), black_box(30.0)))
    });
}

fn bench_hungarian_medium(c: &mut Criterion) {
    let cost_matrix = generate_random_cost_matrix(20, 200);

    c.bench_function("hungarian_20x200", |b| {
        b.iter(|| HungarianSolver::solve(black_box(cost_matrix.view()), black_box(30.0)))
    });
}

fn bench_hungarian_sparse(c: &mut Criterion) {
    // Tight cut sends most entries over threshold and takes the greedy path
    let cost_matrix = generate_random_cost_matrix(50, 50);

    c.bench_function("hungarian_sparse_50x50", |b| {
        b.iter(|| HungarianSolver::solve(black_box(cost_matrix.view()), black_box(1.0)))
    });
}

criterion_group!(
    benches,
    bench_hungarian_small,
    bench_hungarian_medium,
    bench_hungarian_sparse
);
criterion_main!(benches);
