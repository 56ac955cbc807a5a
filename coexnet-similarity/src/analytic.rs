//! Run driver: partitions the pair space into work blocks, executes them
//! (in parallel under the `parallel` feature) and commits the results in
//! block order.

use std::path::Path;

use tracing::{debug, debug_span, info};

use coexnet_core::{CoexError, Result, Summarizable};
use coexnet_gpu::BatchBackend;
use coexnet_omics::ExpressionMatrix;
use coexnet_pairwise::total_pairs;

use crate::block::{ResultBlock, WorkBlock};
use crate::commit::Committer;
use crate::config::SimilarityConfig;
use crate::executor::{BatchExecutor, BlockExecutor, SerialExecutor};
use crate::processor::PairProcessor;
use crate::progress::{Progress, ProgressFn};

/// How work blocks are executed.
#[derive(Clone, Copy)]
pub enum Execution<'b> {
    /// Pair-by-pair on the host.
    Serial,
    /// Fixed-width batches on a batch backend; each worker opens its own
    /// session.
    Batch(&'b dyn BatchBackend),
}

impl Execution<'_> {
    fn name(&self) -> String {
        match self {
            Self::Serial => "serial".into(),
            Self::Batch(backend) => backend.device_info().kind.to_string(),
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimilarityReport {
    /// Pairs processed.
    pub pairs: u64,
    pub blocks: usize,
    /// Pairs stored in the cluster matrix (`K > 1`).
    pub cluster_records: u64,
    /// Pairs stored in the correlation matrix (`K > 0`).
    pub correlation_records: u64,
    pub backend: String,
}

impl Summarizable for SimilarityReport {
    fn summary(&self) -> String {
        format!(
            "Similarity: {} pairs in {} blocks ({}), {} cluster records, {} correlation records",
            self.pairs, self.blocks, self.backend, self.cluster_records, self.correlation_records
        )
    }
}

/// The pairwise similarity analytic over one expression matrix.
///
/// # Example
///
/// ```
/// use coexnet_omics::ExpressionMatrix;
/// use coexnet_similarity::{Execution, Similarity, SimilarityConfig};
///
/// let input = ExpressionMatrix::new(
///     vec![vec![1.0, 2.0, 3.0, 4.0], vec![2.0, 4.1, 5.9, 8.2], vec![4.0, 3.0, 2.0, 1.0]],
///     vec!["a".into(), "b".into(), "c".into()],
///     (0..4).map(|i| format!("s{i}")).collect(),
/// ).unwrap();
/// let config = SimilarityConfig { min_samples: 3, ..Default::default() };
///
/// let dir = tempfile::tempdir().unwrap();
/// let report = Similarity::new(&input, config)
///     .unwrap()
///     .run(Execution::Serial, dir.path().join("ccm.bin"), dir.path().join("cmx.bin"))
///     .unwrap();
/// assert_eq!(report.pairs, 3);
/// ```
pub struct Similarity<'a> {
    input: &'a ExpressionMatrix,
    config: SimilarityConfig,
    gene_size: u32,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> Similarity<'a> {
    /// Prepare a run.
    ///
    /// # Errors
    ///
    /// [`CoexError::InvalidInput`] if the configuration is inconsistent or
    /// the matrix has fewer than two genes.
    pub fn new(input: &'a ExpressionMatrix, config: SimilarityConfig) -> Result<Self> {
        config.validate()?;
        if input.n_genes() < 2 {
            return Err(CoexError::InvalidInput(format!(
                "similarity needs at least two genes, got {}",
                input.n_genes()
            )));
        }
        let gene_size = u32::try_from(input.n_genes()).map_err(|_| {
            CoexError::InvalidInput(format!("{} genes exceed the index range", input.n_genes()))
        })?;
        if u32::try_from(input.n_samples()).is_err() {
            return Err(CoexError::InvalidInput(format!(
                "{} samples exceed the storage limit",
                input.n_samples()
            )));
        }
        Ok(Self {
            input,
            config,
            gene_size,
            progress: None,
        })
    }

    /// Report progress as an integer percentage.
    pub fn on_progress(mut self, callback: impl FnMut(u8) + Send + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Number of gene pairs in the run.
    pub fn total_pairs(&self) -> u64 {
        total_pairs(self.gene_size)
    }

    /// The work blocks of the run, in commit order.
    pub fn work_blocks(&self) -> Vec<WorkBlock> {
        WorkBlock::partition(self.total_pairs(), self.config.work_block_size)
    }

    /// Execute every work block and write the cluster matrix to
    /// `ccm_path` and the correlation matrix to `cmx_path`.
    ///
    /// The first fatal error aborts the run; blocks committed before it
    /// remain readable on disk.
    pub fn run(
        mut self,
        execution: Execution<'_>,
        ccm_path: impl AsRef<Path>,
        cmx_path: impl AsRef<Path>,
    ) -> Result<SimilarityReport> {
        let blocks = self.work_blocks();
        let total = self.total_pairs();
        let backend = execution.name();
        info!(
            genes = self.gene_size,
            samples = self.input.n_samples(),
            pairs = total,
            blocks = blocks.len(),
            backend = %backend,
            "starting similarity run"
        );

        let mut committer = Committer::create(ccm_path, cmx_path, self.input, &self.config)?;
        let mut progress = Progress::new(total, self.progress.take());

        let (input, config, gene_size) = (self.input, &self.config, self.gene_size);

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            // One executor per worker, opened once for the whole run.
            let wave = rayon::current_num_threads().clamp(1, blocks.len().max(1));
            let mut executors = (0..wave)
                .map(|_| executor(input, config, gene_size, execution))
                .collect::<Result<Vec<_>>>()?;
            debug!(workers = executors.len(), "opened block executors");

            for chunk in blocks.chunks(wave) {
                let results: Vec<Result<ResultBlock>> = executors
                    .par_iter_mut()
                    .zip(chunk.par_iter())
                    .map(|(executor, block)| execute_block(executor.as_mut(), block))
                    .collect();
                for result in results {
                    progress.advance(committer.commit(result?)?);
                }
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            let mut executor = executor(input, config, gene_size, execution)?;
            for block in &blocks {
                let result = execute_block(executor.as_mut(), block)?;
                progress.advance(committer.commit(result)?);
            }
        }

        let stats = committer.finish()?;
        let report = SimilarityReport {
            pairs: progress.completed(),
            blocks: stats.blocks,
            cluster_records: stats.cluster_records,
            correlation_records: stats.correlation_records,
            backend,
        };
        info!(
            pairs = report.pairs,
            cluster_records = report.cluster_records,
            correlation_records = report.correlation_records,
            "finished similarity run"
        );
        Ok(report)
    }
}

fn executor<'s>(
    input: &'s ExpressionMatrix,
    config: &SimilarityConfig,
    gene_size: u32,
    execution: Execution<'s>,
) -> Result<Box<dyn BlockExecutor + 's>> {
    match execution {
        Execution::Serial => Ok(Box::new(SerialExecutor::new(
            PairProcessor::new(input, config),
            gene_size,
        ))),
        Execution::Batch(backend) => {
            let args = config.kernel_args(input.n_samples());
            let session = backend.session(&args)?;
            Ok(Box::new(BatchExecutor::new(session, &args, gene_size)))
        }
    }
}

fn execute_block(executor: &mut dyn BlockExecutor, block: &WorkBlock) -> Result<ResultBlock> {
    let _span = debug_span!("block", index = block.index, start = block.start).entered();
    let result = executor.execute(block)?;
    debug!(pairs = result.pairs.len(), "executed block");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostBackend;
    use crate::testing::{expression, two_mode_genes};
    use coexnet_gpu::{BatchOutput, DeviceInfo, KernelArgs, KernelSession};
    use coexnet_pairwise::{ClusterMatrix, CorrelationMatrix, PairIndex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn config() -> SimilarityConfig {
        SimilarityConfig {
            min_samples: 5,
            max_clusters: 2,
            work_block_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_single_gene() {
        let input = ExpressionMatrix::new(
            vec![vec![1.0, 2.0]],
            vec!["a".into()],
            vec!["s0".into(), "s1".into()],
        )
        .unwrap();
        assert!(matches!(
            Similarity::new(&input, config()),
            Err(CoexError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_bad_config() {
        let input = expression(two_mode_genes(5));
        let bad = SimilarityConfig { min_samples: 0, ..config() };
        assert!(Similarity::new(&input, bad).is_err());
    }

    #[test]
    fn blocks_cover_pairs() {
        let input = expression(two_mode_genes(5));
        let run = Similarity::new(&input, config()).unwrap();
        assert_eq!(run.total_pairs(), 6);
        let blocks = run.work_blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks.iter().map(|b| b.size).sum::<u64>(), 6);
    }

    #[test]
    fn serial_run_reports() {
        let input = expression(two_mode_genes(20));
        let dir = tempfile::tempdir().unwrap();
        let report = Similarity::new(&input, config())
            .unwrap()
            .run(Execution::Serial, dir.path().join("ccm"), dir.path().join("cmx"))
            .unwrap();
        assert_eq!(report.pairs, 6);
        assert_eq!(report.blocks, 3);
        assert_eq!(report.backend, "serial");
        assert!(report.correlation_records >= report.cluster_records);
        assert!(report.summary().starts_with("Similarity: 6 pairs in 3 blocks (serial)"));
    }

    #[test]
    fn batch_files_match_serial() {
        let input = expression(two_mode_genes(20));
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name);
        let cfg = SimilarityConfig { batch_width: 3, ..config() };

        let serial = Similarity::new(&input, cfg.clone())
            .unwrap()
            .run(Execution::Serial, path("s.ccm"), path("s.cmx"))
            .unwrap();
        let backend = HostBackend::new(&input, &cfg);
        let batch = Similarity::new(&input, cfg)
            .unwrap()
            .run(Execution::Batch(&backend), path("b.ccm"), path("b.cmx"))
            .unwrap();

        assert_eq!(batch.backend, "Host");
        assert_eq!(serial.cluster_records, batch.cluster_records);
        assert_eq!(serial.correlation_records, batch.correlation_records);
        for (a, b) in [("s.ccm", "b.ccm"), ("s.cmx", "b.cmx")] {
            assert_eq!(std::fs::read(path(a)).unwrap(), std::fs::read(path(b)).unwrap());
        }
    }

    #[test]
    fn outputs_are_consistent() {
        let input = expression(two_mode_genes(20));
        let dir = tempfile::tempdir().unwrap();
        let (ccm, cmx) = (dir.path().join("ccm"), dir.path().join("cmx"));
        let report = Similarity::new(&input, config())
            .unwrap()
            .run(Execution::Serial, &ccm, &cmx)
            .unwrap();

        let clusters = ClusterMatrix::open(&ccm).unwrap();
        let correlations = CorrelationMatrix::open(&cmx).unwrap();
        assert_eq!(clusters.size(), report.cluster_records);
        assert_eq!(correlations.size(), report.correlation_records);
        assert_eq!(clusters.gene_names(), input.gene_names());
        assert_eq!(clusters.sample_size(), 40);

        // Every clustered pair also has one correlation per cluster.
        let mut c = clusters.cursor();
        let mut r = correlations.cursor();
        while c.read_next().unwrap() {
            assert!(c.cluster_size() > 1);
            assert!(r.read(c.index()).unwrap());
            assert_eq!(r.cluster_size(), c.cluster_size());
            // Each sample is a member of at most one cluster.
            for s in 0..40 {
                let members = c.pair().clusters().iter().filter(|m| m[s] == 1).count();
                assert!(members <= 1);
            }
        }

        // The two-mode genes 0 and 1 split into two clusters.
        assert!(c.read_pair(PairIndex::new(4, 1, 0).unwrap()).unwrap());
        assert_eq!(c.cluster_size(), 2);
    }

    #[test]
    fn progress_is_monotonic() {
        let input = expression(two_mode_genes(10));
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        Similarity::new(&input, SimilarityConfig { work_block_size: 1, ..config() })
            .unwrap()
            .on_progress(move |p| sink.lock().unwrap().push(p))
            .run(Execution::Serial, dir.path().join("a"), dir.path().join("b"))
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn post_outlier_stored_in_cluster_masks() {
        let mut genes = two_mode_genes(20);
        genes[0][5] = 4.0;
        let input = expression(genes);
        let dir = tempfile::tempdir().unwrap();
        let ccm = dir.path().join("ccm");
        let cfg = SimilarityConfig { remove_post_outliers: true, ..config() };
        Similarity::new(&input, cfg)
            .unwrap()
            .run(Execution::Serial, &ccm, dir.path().join("cmx"))
            .unwrap();

        let clusters = ClusterMatrix::open(&ccm).unwrap();
        let mut cursor = clusters.cursor();
        assert!(cursor.read_pair(PairIndex::new(4, 1, 0).unwrap()).unwrap());
        assert_eq!(cursor.cluster_size(), 2);
        for mask in cursor.pair().clusters() {
            assert_eq!(mask[5], 8);
        }
    }

    /// Host backend counting the sessions it opens.
    struct CountingBackend<'a> {
        inner: HostBackend<'a>,
        sessions: AtomicUsize,
    }

    impl BatchBackend for CountingBackend<'_> {
        fn device_info(&self) -> DeviceInfo {
            self.inner.device_info()
        }

        fn session(&self, args: &KernelArgs) -> Result<Box<dyn KernelSession + '_>> {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            self.inner.session(args)
        }
    }

    #[test]
    fn sessions_opened_once_per_worker() {
        let input = expression(two_mode_genes(10));
        let dir = tempfile::tempdir().unwrap();
        let cfg = SimilarityConfig { work_block_size: 1, ..config() };
        let backend = CountingBackend {
            inner: HostBackend::new(&input, &cfg),
            sessions: AtomicUsize::new(0),
        };
        let report = Similarity::new(&input, cfg)
            .unwrap()
            .run(Execution::Batch(&backend), dir.path().join("a"), dir.path().join("b"))
            .unwrap();
        assert_eq!(report.blocks, 6);

        let opened = backend.sessions.load(Ordering::SeqCst);
        #[cfg(feature = "parallel")]
        assert_eq!(opened, rayon::current_num_threads().min(6));
        #[cfg(not(feature = "parallel"))]
        assert_eq!(opened, 1);
    }

    /// Host backend whose sessions fail on any batch touching gene 3.
    struct FaultyBackend<'a>(HostBackend<'a>);

    struct FaultySession<'s>(Box<dyn KernelSession + 's>);

    impl KernelSession for FaultySession<'_> {
        fn run(&mut self, pairs: &[(u32, u32)], out: &mut BatchOutput) -> Result<()> {
            if pairs.iter().any(|&(x, _)| x == 3) {
                return Err(CoexError::BackendExecution("kernel fault".into()));
            }
            self.0.run(pairs, out)
        }
    }

    impl BatchBackend for FaultyBackend<'_> {
        fn device_info(&self) -> DeviceInfo {
            self.0.device_info()
        }

        fn session(&self, args: &KernelArgs) -> Result<Box<dyn KernelSession + '_>> {
            Ok(Box::new(FaultySession(self.0.session(args)?)))
        }
    }

    #[test]
    fn backend_failure_aborts_after_committed_blocks() {
        let input = expression(two_mode_genes(20));
        let dir = tempfile::tempdir().unwrap();
        let (ccm, cmx) = (dir.path().join("ccm"), dir.path().join("cmx"));
        let cfg = config();
        let backend = FaultyBackend(HostBackend::new(&input, &cfg));
        let err = Similarity::new(&input, cfg)
            .unwrap()
            .run(Execution::Batch(&backend), &ccm, &cmx)
            .unwrap_err();
        assert!(matches!(err, CoexError::BackendExecution(_)));

        // Block 0 (pairs 0 and 1) was committed; pair 3 onwards never ran.
        let correlations = CorrelationMatrix::open(&cmx).unwrap();
        let mut cursor = correlations.cursor();
        while cursor.read_next().unwrap() {
            assert!(cursor.index() < 2);
        }
        assert!(correlations.size() >= 1);
    }
}
