//! Block executors: turn a [`WorkBlock`] into a [`ResultBlock`].
//!
//! [`SerialExecutor`] processes one pair at a time on the host;
//! [`BatchExecutor`] feeds fixed-width batches to a [`KernelSession`].
//! Both produce the same per-pair outcomes for the same input.

use coexnet_core::{CoexError, Result};
use coexnet_gpu::{BatchOutput, KernelArgs, KernelSession};

use crate::block::{PairOutcome, ResultBlock, WorkBlock};
use crate::processor::PairProcessor;

/// Computes the outcomes of one work block.
pub trait BlockExecutor: Send {
    /// Process every pair of `block`, in pair order.
    fn execute(&mut self, block: &WorkBlock) -> Result<ResultBlock>;
}

// ---------------------------------------------------------------------------
// Serial
// ---------------------------------------------------------------------------

/// Host executor running the pair pipeline one pair at a time.
#[derive(Debug, Clone)]
pub struct SerialExecutor<'a> {
    processor: PairProcessor<'a>,
    gene_size: u32,
    labels: Vec<i8>,
}

impl<'a> SerialExecutor<'a> {
    pub fn new(processor: PairProcessor<'a>, gene_size: u32) -> Self {
        let labels = vec![0; processor.sample_size()];
        Self {
            processor,
            gene_size,
            labels,
        }
    }
}

impl BlockExecutor for SerialExecutor<'_> {
    fn execute(&mut self, block: &WorkBlock) -> Result<ResultBlock> {
        let mut result = ResultBlock::new(block);
        for pair in block.pairs(self.gene_size)? {
            let outcome = self.processor.outcome(pair.x(), pair.y(), &mut self.labels)?;
            result.pairs.push(outcome);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Executor that stages pairs into batches of at most `batch_width` and
/// runs them through a backend session.
pub struct BatchExecutor<'b> {
    session: Box<dyn KernelSession + 'b>,
    gene_size: u32,
    batch_width: usize,
    max_clusters: u8,
    pairs: Vec<(u32, u32)>,
    out: BatchOutput,
}

impl<'b> BatchExecutor<'b> {
    pub fn new(session: Box<dyn KernelSession + 'b>, args: &KernelArgs, gene_size: u32) -> Self {
        Self {
            session,
            gene_size,
            batch_width: args.batch_width,
            max_clusters: args.max_clusters,
            pairs: Vec::with_capacity(args.batch_width),
            out: BatchOutput::for_args(args),
        }
    }

    fn run_batch(&mut self, result: &mut ResultBlock) -> Result<()> {
        if self.pairs.is_empty() {
            return Ok(());
        }
        self.session.run(&self.pairs, &mut self.out)?;
        for j in 0..self.pairs.len() {
            let k = self.out.k[j];
            if k < 0 || k as u8 > self.max_clusters {
                let (x, y) = self.pairs[j];
                return Err(CoexError::BackendExecution(format!(
                    "kernel returned K = {k} for pair ({x}, {y}), limit is {}",
                    self.max_clusters
                )));
            }
            result.pairs.push(PairOutcome::new(
                k as u8,
                self.out.labels(j),
                self.out.correlations(j),
            ));
        }
        self.pairs.clear();
        Ok(())
    }
}

impl BlockExecutor for BatchExecutor<'_> {
    fn execute(&mut self, block: &WorkBlock) -> Result<ResultBlock> {
        let mut result = ResultBlock::new(block);
        self.pairs.clear();
        for pair in block.pairs(self.gene_size)? {
            self.pairs.push((pair.x(), pair.y()));
            if self.pairs.len() == self.batch_width {
                self.run_batch(&mut result)?;
            }
        }
        self.run_batch(&mut result)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimilarityConfig;
    use crate::host::HostBackend;
    use crate::testing::{assert_blocks_eq, expression, two_mode_genes};
    use coexnet_gpu::BatchBackend;

    fn config() -> SimilarityConfig {
        SimilarityConfig {
            min_samples: 5,
            max_clusters: 3,
            batch_width: 2,
            ..Default::default()
        }
    }

    #[test]
    fn serial_covers_block() {
        let input = expression(two_mode_genes(20));
        let cfg = config();
        let mut exec = SerialExecutor::new(PairProcessor::new(&input, &cfg), 4);
        let block = WorkBlock { index: 1, start: 2, size: 4 };
        let result = exec.execute(&block).unwrap();
        assert_eq!(result.index, 1);
        assert_eq!(result.start, 2);
        assert_eq!(result.pairs.len(), 4);
    }

    #[test]
    fn batch_matches_serial() {
        let input = expression(two_mode_genes(20));
        let cfg = config();
        let backend = HostBackend::new(&input, &cfg);
        let args = cfg.kernel_args(input.n_samples());
        let mut batch = BatchExecutor::new(backend.session(&args).unwrap(), &args, 4);
        let mut serial = SerialExecutor::new(PairProcessor::new(&input, &cfg), 4);

        // Odd size leaves a partial final batch.
        for block in WorkBlock::partition(6, 5) {
            assert_blocks_eq(&batch.execute(&block).unwrap(), &serial.execute(&block).unwrap());
        }
    }

    struct BadKernel;

    impl KernelSession for BadKernel {
        fn run(&mut self, pairs: &[(u32, u32)], out: &mut BatchOutput) -> Result<()> {
            out.k[..pairs.len()].fill(9);
            Ok(())
        }
    }

    #[test]
    fn rejects_k_above_limit() {
        let cfg = config();
        let args = cfg.kernel_args(4);
        let mut exec = BatchExecutor::new(Box::new(BadKernel), &args, 4);
        let err = exec.execute(&WorkBlock { index: 0, start: 0, size: 3 }).unwrap_err();
        assert!(matches!(err, CoexError::BackendExecution(_)));
    }

    struct FailingKernel;

    impl KernelSession for FailingKernel {
        fn run(&mut self, _: &[(u32, u32)], _: &mut BatchOutput) -> Result<()> {
            Err(CoexError::BackendExecution("launch failed".into()))
        }
    }

    #[test]
    fn session_error_propagates() {
        let cfg = config();
        let args = cfg.kernel_args(4);
        let mut exec = BatchExecutor::new(Box::new(FailingKernel), &args, 4);
        assert!(exec.execute(&WorkBlock { index: 0, start: 0, size: 1 }).is_err());
    }
}
