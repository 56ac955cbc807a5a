use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use coexnet_gpu::BatchBackend;
use coexnet_ml::ClusteringMethod;
use coexnet_omics::ExpressionMatrix;
use coexnet_similarity::{
    BatchExecutor, BlockExecutor, HostBackend, PairProcessor, SerialExecutor, SimilarityConfig,
    WorkBlock,
};

/// Deterministic pseudo-random values in [0, 1) using an LCG.
fn random_unit(state: &mut u64) -> f32 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    ((*state >> 11) as f64 / (1u64 << 53) as f64) as f32
}

/// Genes with one or two expression modes over `samples` samples.
fn random_expression(genes: usize, samples: usize) -> ExpressionMatrix {
    let mut state = 42u64;
    let data = (0..genes)
        .map(|g| {
            (0..samples)
                .map(|s| {
                    let shift = if g % 2 == 0 && s % 3 == 0 { 8.0 } else { 0.0 };
                    shift + 4.0 * random_unit(&mut state)
                })
                .collect()
        })
        .collect();
    ExpressionMatrix::new(
        data,
        (0..genes).map(|i| format!("g{i}")).collect(),
        (0..samples).map(|i| format!("s{i}")).collect(),
    )
    .unwrap()
}

fn bench_block(c: &mut Criterion) {
    let input = random_expression(40, 200);
    let block = WorkBlock { index: 0, start: 0, size: 256 };
    let mut group = c.benchmark_group("similarity_block");
    group.sample_size(10);

    for (name, clustering) in [("none", ClusteringMethod::None), ("gmm", ClusteringMethod::Gmm)] {
        let config = SimilarityConfig {
            clustering,
            batch_width: 64,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("serial", name), &config, |b, config| {
            let mut exec = SerialExecutor::new(PairProcessor::new(&input, config), 40);
            b.iter(|| exec.execute(black_box(&block)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("host_batch", name), &config, |b, config| {
            let backend = HostBackend::new(&input, config);
            let args = config.kernel_args(input.n_samples());
            let mut exec = BatchExecutor::new(backend.session(&args).unwrap(), &args, 40);
            b.iter(|| exec.execute(black_box(&block)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_block);
criterion_main!(benches);
