//! Host implementation of the batch backend contract.
//!
//! Runs the same per-pair pipeline as [`SerialExecutor`](crate::SerialExecutor)
//! behind [`BatchBackend`], so the batch path can run (and be tested)
//! without a GPU.

use coexnet_core::{CoexError, Result};
use coexnet_gpu::{BackendKind, BatchBackend, BatchOutput, DeviceInfo, KernelArgs, KernelSession};
use coexnet_omics::ExpressionMatrix;

use crate::config::SimilarityConfig;
use crate::processor::PairProcessor;

/// Batch backend executing kernels on the calling thread.
#[derive(Debug, Clone)]
pub struct HostBackend<'a> {
    input: &'a ExpressionMatrix,
    config: SimilarityConfig,
}

impl<'a> HostBackend<'a> {
    pub fn new(input: &'a ExpressionMatrix, config: &SimilarityConfig) -> Self {
        Self {
            input,
            config: config.clone(),
        }
    }
}

impl BatchBackend for HostBackend<'_> {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "host".into(),
            kind: BackendKind::Host,
            total_memory: 0,
            max_parallelism: 1,
        }
    }

    fn session(&self, args: &KernelArgs) -> Result<Box<dyn KernelSession + '_>> {
        args.validate()?;
        if args.sample_size != self.input.n_samples() {
            return Err(CoexError::InvalidInput(format!(
                "kernel args declare {} samples, expression matrix has {}",
                args.sample_size,
                self.input.n_samples()
            )));
        }
        if args.max_clusters < self.config.max_clusters {
            return Err(CoexError::InvalidInput(format!(
                "kernel args allow {} clusters, configuration needs {}",
                args.max_clusters, self.config.max_clusters
            )));
        }
        Ok(Box::new(HostSession {
            processor: PairProcessor::new(self.input, &self.config),
        }))
    }
}

struct HostSession<'a> {
    processor: PairProcessor<'a>,
}

impl KernelSession for HostSession<'_> {
    fn run(&mut self, pairs: &[(u32, u32)], out: &mut BatchOutput) -> Result<()> {
        if out.capacity() < pairs.len() {
            return Err(CoexError::InvalidInput(format!(
                "batch of {} pairs exceeds output capacity {}",
                pairs.len(),
                out.capacity()
            )));
        }
        for (j, &(x, y)) in pairs.iter().enumerate() {
            let (k, correlations) = self.processor.process(x, y, out.labels_mut(j))?;
            out.k[j] = k as i8;
            let slots = out.correlations_mut(j);
            slots.fill(f32::NAN);
            slots[..correlations.len()].copy_from_slice(&correlations);
        }
        Ok(())
    }
}
