//! Configuration for the similarity analytic.

use coexnet_core::{CoexError, Result};
use coexnet_gpu::KernelArgs;
use coexnet_ml::{ClusterParams, ClusteringMethod, Criterion, GmmConfig};
use coexnet_pairwise::MAX_CLUSTERS;
use coexnet_stats::CorrelationMethod;

/// Settings for one similarity run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimilarityConfig {
    pub clustering: ClusteringMethod,
    pub correlation: CorrelationMethod,
    /// Samples where either gene is below this are excluded.
    pub min_expression: f32,
    /// Minimum retained samples for clustering and for a cluster's
    /// correlation.
    pub min_samples: usize,
    pub min_clusters: u8,
    pub max_clusters: u8,
    pub criterion: Criterion,
    pub remove_pre_outliers: bool,
    pub remove_post_outliers: bool,
    /// Pairs per work block.
    pub work_block_size: usize,
    /// Pairs per batch-backend kernel launch.
    pub batch_width: usize,
    /// Threads per block on the batch backend.
    pub local_width: usize,
    pub gmm: GmmConfig,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            clustering: ClusteringMethod::Gmm,
            correlation: CorrelationMethod::Pearson,
            min_expression: f32::NEG_INFINITY,
            min_samples: 30,
            min_clusters: 1,
            max_clusters: 5,
            criterion: Criterion::Bic,
            remove_pre_outliers: false,
            remove_post_outliers: false,
            work_block_size: 32_768,
            batch_width: 4096,
            local_width: 32,
            gmm: GmmConfig::default(),
        }
    }
}

impl SimilarityConfig {
    /// Check that the settings are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.min_expression.is_nan() {
            return Err(CoexError::InvalidInput("min_expression must not be NaN".into()));
        }
        if self.min_samples == 0 {
            return Err(CoexError::InvalidInput("min_samples must be > 0".into()));
        }
        if self.min_clusters == 0 || self.min_clusters > self.max_clusters {
            return Err(CoexError::InvalidInput(format!(
                "cluster bounds {}..={} are invalid",
                self.min_clusters, self.max_clusters
            )));
        }
        if self.max_clusters > MAX_CLUSTERS {
            return Err(CoexError::InvalidInput(format!(
                "max_clusters {} exceeds the limit of {MAX_CLUSTERS}",
                self.max_clusters
            )));
        }
        if self.work_block_size == 0 || self.batch_width == 0 || self.local_width == 0 {
            return Err(CoexError::InvalidInput(
                "block, batch and local widths must be > 0".into(),
            ));
        }
        if self.gmm.max_iter == 0 {
            return Err(CoexError::InvalidInput("gmm.max_iter must be > 0".into()));
        }
        Ok(())
    }

    /// Clustering bounds for [`coexnet_ml::PairwiseGmm`].
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            min_samples: self.min_samples,
            min_clusters: self.min_clusters,
            max_clusters: self.max_clusters,
            criterion: self.criterion,
        }
    }

    /// Kernel arguments for a batch backend over `sample_size` samples.
    pub fn kernel_args(&self, sample_size: usize) -> KernelArgs {
        KernelArgs {
            batch_width: self.batch_width,
            local_width: self.local_width,
            sample_size,
            clustering: self.clustering,
            correlation: self.correlation,
            remove_pre_outliers: self.remove_pre_outliers,
            remove_post_outliers: self.remove_post_outliers,
            min_expression: self.min_expression,
            min_samples: self.min_samples,
            min_clusters: self.min_clusters,
            max_clusters: self.max_clusters,
            criterion: self.criterion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimilarityConfig::default();
        config.validate().unwrap();
        assert_eq!(config.min_samples, 30);
        assert_eq!(config.max_clusters, 5);
        assert_eq!(config.work_block_size, 32_768);
        assert_eq!(config.gmm.seed, 42);
    }

    #[test]
    fn rejects_bad_bounds() {
        let mut config = SimilarityConfig {
            min_clusters: 3,
            max_clusters: 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoexError::InvalidInput(_))));
        config.min_clusters = 1;
        config.max_clusters = 65;
        assert!(config.validate().is_err());
        config.max_clusters = 64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_sizes() {
        for config in [
            SimilarityConfig { min_samples: 0, ..Default::default() },
            SimilarityConfig { work_block_size: 0, ..Default::default() },
            SimilarityConfig { batch_width: 0, ..Default::default() },
            SimilarityConfig { min_expression: f32::NAN, ..Default::default() },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn kernel_args_mirror_config() {
        let config = SimilarityConfig {
            remove_post_outliers: true,
            ..Default::default()
        };
        let args = config.kernel_args(12);
        assert_eq!(args.sample_size, 12);
        assert_eq!(args.batch_width, 4096);
        assert!(args.remove_post_outliers);
        assert_eq!(config.cluster_params().max_clusters, 5);
    }
}
