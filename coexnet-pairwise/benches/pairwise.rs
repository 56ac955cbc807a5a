use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use coexnet_pairwise::{total_pairs, CorrelationCodec, CorrelationMatrix, CorrelationWriter, PairIndex};

/// Deterministic pseudo-random values in [0, 1) using an LCG.
fn random_unit(state: &mut u64) -> f64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    (*state >> 11) as f64 / (1u64 << 53) as f64
}

/// Write a matrix where roughly one pair in `every` carries a record.
fn sparse_matrix(dir: &tempfile::TempDir, gene_size: u32, every: u64) -> std::path::PathBuf {
    let path = dir.path().join(format!("bench_{gene_size}_{every}.bin"));
    let mut w = CorrelationWriter::create(&path, CorrelationCodec::new("pearson")).unwrap();
    let names = (0..gene_size).map(|i| format!("g{i}")).collect();
    w.initialize(names, 100, 5).unwrap();
    let mut state = 42u64;
    for index in (0..total_pairs(gene_size)).step_by(every as usize) {
        let k = 1 + (random_unit(&mut state) * 3.0) as usize;
        let values: Vec<f32> = (0..k).map(|_| random_unit(&mut state) as f32).collect();
        w.write(index, &values).unwrap();
    }
    w.finish().unwrap();
    path
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_index");
    for &gene_size in &[1_000u32, 30_000] {
        let total = total_pairs(gene_size);
        group.bench_with_input(
            BenchmarkId::new("from_linear", gene_size),
            &gene_size,
            |b, &n| {
                let mut state = 7u64;
                b.iter(|| {
                    let linear = (random_unit(&mut state) * total as f64) as u64;
                    PairIndex::from_linear(n, black_box(linear)).unwrap()
                })
            },
        );
    }
    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("matrix_seek");

    for &every in &[3u64, 50] {
        let gene_size = 2_000;
        let path = sparse_matrix(&dir, gene_size, every);
        let matrix = CorrelationMatrix::open(&path).unwrap();
        let total = total_pairs(gene_size);

        group.bench_with_input(BenchmarkId::new("random_read", every), &every, |b, _| {
            let mut cursor = matrix.cursor();
            let mut state = 11u64;
            b.iter(|| {
                let index = (random_unit(&mut state) * total as f64) as u64;
                cursor.read(black_box(index)).unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("scan", every), &every, |b, _| {
            b.iter(|| {
                let mut cursor = matrix.cursor();
                let mut n = 0usize;
                while cursor.read_next().unwrap() {
                    n += cursor.cluster_size();
                }
                n
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_index, bench_seek);
criterion_main!(benches);
