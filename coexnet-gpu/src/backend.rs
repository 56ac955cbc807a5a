//! Backend trait and core types for batched pair processing.

use core::fmt;

use coexnet_core::{CoexError, Result, Summarizable};
use coexnet_ml::{ClusteringMethod, Criterion};
use coexnet_stats::CorrelationMethod;

/// Identifies which compute backend is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendKind {
    /// Host CPU running the batch contract.
    Host,
    /// NVIDIA CUDA backend.
    Cuda,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "Host"),
            Self::Cuda => write!(f, "CUDA"),
        }
    }
}

/// Information about a compute device.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Backend kind.
    pub kind: BackendKind,
    /// Total device memory in bytes (0 if unknown).
    pub total_memory: u64,
    /// Maximum parallelism (threads, warps, etc.).
    pub max_parallelism: usize,
}

impl Summarizable for DeviceInfo {
    fn summary(&self) -> String {
        format!(
            "{} ({}, {} bytes, {} parallel)",
            self.name, self.kind, self.total_memory, self.max_parallelism
        )
    }
}

/// Scalar arguments shared by every batch of one analytic run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KernelArgs {
    /// Pairs per batch (global work size).
    pub batch_width: usize,
    /// Threads per block (local work size).
    pub local_width: usize,
    pub sample_size: usize,
    pub clustering: ClusteringMethod,
    pub correlation: CorrelationMethod,
    pub remove_pre_outliers: bool,
    pub remove_post_outliers: bool,
    pub min_expression: f32,
    pub min_samples: usize,
    pub min_clusters: u8,
    pub max_clusters: u8,
    pub criterion: Criterion,
}

impl KernelArgs {
    /// Check buffer dimensions before allocating.
    pub fn validate(&self) -> Result<()> {
        if self.batch_width == 0 || self.local_width == 0 {
            return Err(CoexError::InvalidInput(
                "batch and local widths must be > 0".into(),
            ));
        }
        if self.max_clusters == 0 {
            return Err(CoexError::InvalidInput("max_clusters must be > 0".into()));
        }
        Ok(())
    }
}

/// Host-side result buffers for one batch, sized
/// `batch_width` (K), `batch_width × sample_size` (labels) and
/// `batch_width × max_clusters` (correlations).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    sample_size: usize,
    max_clusters: usize,
    pub k: Vec<i8>,
    pub labels: Vec<i8>,
    pub correlations: Vec<f32>,
}

impl BatchOutput {
    pub fn new(batch_width: usize, sample_size: usize, max_clusters: usize) -> Self {
        Self {
            sample_size,
            max_clusters,
            k: vec![0; batch_width],
            labels: vec![0; batch_width * sample_size],
            correlations: vec![f32::NAN; batch_width * max_clusters],
        }
    }

    /// Buffers sized for `args`.
    pub fn for_args(args: &KernelArgs) -> Self {
        Self::new(args.batch_width, args.sample_size, args.max_clusters as usize)
    }

    /// Number of pairs the buffers hold.
    pub fn capacity(&self) -> usize {
        self.k.len()
    }

    /// Labels of pair `j` in the batch.
    pub fn labels(&self, j: usize) -> &[i8] {
        &self.labels[j * self.sample_size..(j + 1) * self.sample_size]
    }

    pub fn labels_mut(&mut self, j: usize) -> &mut [i8] {
        &mut self.labels[j * self.sample_size..(j + 1) * self.sample_size]
    }

    /// Correlation slots of pair `j` in the batch.
    pub fn correlations(&self, j: usize) -> &[f32] {
        &self.correlations[j * self.max_clusters..(j + 1) * self.max_clusters]
    }

    pub fn correlations_mut(&mut self, j: usize) -> &mut [f32] {
        &mut self.correlations[j * self.max_clusters..(j + 1) * self.max_clusters]
    }
}

/// Per-worker state for running batches: private device buffers and
/// command stream, never shared with another in-flight batch.
pub trait KernelSession: Send {
    /// Process `pairs` (`(x, y)` gene indices, at most the batch width) and
    /// fill the first `pairs.len()` entries of `out`.
    ///
    /// Returns only after every submitted kernel and transfer has
    /// completed.
    ///
    /// # Errors
    ///
    /// [`CoexError::BackendExecution`] on a launch, transfer or
    /// asynchronous kernel failure.
    fn run(&mut self, pairs: &[(u32, u32)], out: &mut BatchOutput) -> Result<()>;
}

/// A device able to run the clustering and correlation kernels.
pub trait BatchBackend: Send + Sync {
    /// Returns information about the underlying compute device.
    fn device_info(&self) -> DeviceInfo;

    /// Open a session for one worker.
    ///
    /// # Errors
    ///
    /// [`CoexError::BackendExecution`] if device buffers cannot be
    /// allocated.
    fn session(&self, args: &KernelArgs) -> Result<Box<dyn KernelSession + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> KernelArgs {
        KernelArgs {
            batch_width: 4,
            local_width: 2,
            sample_size: 3,
            clustering: ClusteringMethod::Gmm,
            correlation: CorrelationMethod::Pearson,
            remove_pre_outliers: false,
            remove_post_outliers: false,
            min_expression: f32::NEG_INFINITY,
            min_samples: 2,
            min_clusters: 1,
            max_clusters: 2,
            criterion: Criterion::Bic,
        }
    }

    #[test]
    fn output_layout() {
        let mut out = BatchOutput::for_args(&args());
        assert_eq!(out.capacity(), 4);
        assert_eq!(out.labels.len(), 12);
        assert_eq!(out.correlations.len(), 8);
        out.labels_mut(2).copy_from_slice(&[1, 0, -9]);
        assert_eq!(out.labels(2), &[1, 0, -9]);
        assert_eq!(&out.labels[6..9], &[1, 0, -9]);
        out.correlations_mut(3)[1] = 0.5;
        assert_eq!(out.correlations[7], 0.5);
    }

    #[test]
    fn args_validation() {
        assert!(args().validate().is_ok());
        let mut bad = args();
        bad.batch_width = 0;
        assert!(bad.validate().is_err());
        let mut bad = args();
        bad.max_clusters = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn device_summary() {
        let info = DeviceInfo {
            name: "host".into(),
            kind: BackendKind::Host,
            total_memory: 0,
            max_parallelism: 8,
        };
        assert_eq!(info.summary(), "host (Host, 0 bytes, 8 parallel)");
    }
}
