use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use single_analytics::svd::{svd, SvdParams};
use single_analytics::svm::{Svc, SvcParams};
use single_analytics::{Matrix, SparseMatrix, SparseVector, Vector};

/// Two Gaussian blobs around `+1` and `-1` on every feature, sparsified at `density`.
fn create_blobs(dim: usize, n: usize, density: f64, seed: u64) -> (SparseMatrix, Vector) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = SparseMatrix::with_rows(dim);
    let mut y = Vec::with_capacity(n);
    for col in 0..n {
        let label = if col % 2 == 0 { 1.0 } else { -1.0 };
        let pairs: Vec<(usize, f64)> = (0..dim)
            .filter(|_| rng.random::<f64>() < density)
            .map(|row| (row, label + 0.5 * (rng.random::<f64>() - 0.5)))
            .collect();
        x.push(SparseVector::new(pairs, Some(dim)).unwrap()).unwrap();
        y.push(label);
    }
    (x, Vector::from_vec(y))
}

pub fn bench_pegasos(c: &mut Criterion) {
    let _ = env_logger::try_init();
    let mut group = c.benchmark_group("Pegasos_Fit");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for &(dim, n) in [(100, 1000), (1000, 5000)].iter() {
        let (x, y) = create_blobs(dim, n, 0.1, 42);
        for &batch_size in [1, 100, n].iter() {
            let params = SvcParams::default()
                .with_batch_size(batch_size)
                .with_max_iterations(200)
                .with_max_time(f64::INFINITY)
                .with_min_diff(0.0);
            group.bench_with_input(
                BenchmarkId::new(format!("batch_{batch_size}"), format!("{dim}x{n}")),
                &params,
                |b, params| {
                    b.iter(|| {
                        let mut svc = Svc::new(*params).unwrap();
                        svc.fit((&x).into(), &y).unwrap();
                        svc
                    });
                },
            );
        }
    }
    group.finish();
}

pub fn bench_truncated_svd(c: &mut Criterion) {
    let mut group = c.benchmark_group("Truncated_SVD");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for &(rows, cols) in [(200, 100), (1000, 500)].iter() {
        let mut rng = StdRng::seed_from_u64(7);
        let dense = Matrix::randn(rows, cols, &mut rng);
        let (sparse, _) = create_blobs(rows, cols, 0.05, 7);
        let params = SvdParams::default();
        for &k in [5, 20].iter() {
            let label = format!("{rows}x{cols}_k{k}");
            group.bench_with_input(BenchmarkId::new("dense", &label), &k, |b, &k| {
                b.iter(|| svd(&dense, k, &params).unwrap());
            });
            group.bench_with_input(BenchmarkId::new("sparse", &label), &k, |b, &k| {
                b.iter(|| svd(&sparse, k, &params).unwrap());
            });
        }
    }
    group.finish();
}

criterion_group!(learning_benches, bench_pegasos, bench_truncated_svd);
criterion_main!(learning_benches);
