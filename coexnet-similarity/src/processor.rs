//! The per-pair pipeline shared by every backend.

use coexnet_core::{CoexError, Result};
use coexnet_ml::{ClusterParams, ClusteringMethod, PairwiseGmm};
use coexnet_omics::ExpressionMatrix;
use coexnet_stats::label::{BELOW_THRESHOLD, MISSING, POST_OUTLIER, PRE_OUTLIER};
use coexnet_stats::{cluster_correlations, mark_outliers};

use crate::block::PairOutcome;
use crate::config::SimilarityConfig;

/// Runs fetch, outlier removal, clustering and correlation for single
/// pairs against a shared, read-only expression matrix.
#[derive(Debug, Clone)]
pub struct PairProcessor<'a> {
    input: &'a ExpressionMatrix,
    config: SimilarityConfig,
    gmm: PairwiseGmm,
    params: ClusterParams,
}

impl<'a> PairProcessor<'a> {
    pub fn new(input: &'a ExpressionMatrix, config: &SimilarityConfig) -> Self {
        Self {
            input,
            config: config.clone(),
            gmm: PairwiseGmm::new(config.gmm.clone()),
            params: config.cluster_params(),
        }
    }

    /// Number of samples per gene.
    pub fn sample_size(&self) -> usize {
        self.input.n_samples()
    }

    /// Maximum clusters per pair.
    pub fn max_clusters(&self) -> usize {
        self.config.max_clusters as usize
    }

    fn genes(&self, x: u32, y: u32) -> Result<(&'a [f32], &'a [f32])> {
        let gene = |i: u32| {
            self.input.gene(i as usize).ok_or_else(|| {
                CoexError::InvalidIndex(format!(
                    "gene {i} is outside the expression matrix ({} genes)",
                    self.input.n_genes()
                ))
            })
        };
        Ok((gene(x)?, gene(y)?))
    }

    /// Label every sample of pair `(x, y)` as retained (`0`), missing or
    /// below the expression threshold. Returns the retained count.
    pub fn fetch(&self, x: u32, y: u32, labels: &mut [i8]) -> Result<usize> {
        let (a, b) = self.genes(x, y)?;
        let min = self.config.min_expression;
        let mut retained = 0;
        for ((label, &va), &vb) in labels.iter_mut().zip(a).zip(b) {
            *label = if va.is_nan() || vb.is_nan() {
                MISSING
            } else if va < min || vb < min {
                BELOW_THRESHOLD
            } else {
                retained += 1;
                0
            };
        }
        Ok(retained)
    }

    /// Run the whole pipeline for pair `(x, y)`.
    ///
    /// `labels` (one per sample) receives the final labels; the returned
    /// vector holds one correlation per cluster.
    pub fn process(&self, x: u32, y: u32, labels: &mut [i8]) -> Result<(u8, Vec<f32>)> {
        if labels.len() != self.sample_size() {
            return Err(CoexError::InvalidInput(format!(
                "label buffer has {} entries for {} samples",
                labels.len(),
                self.sample_size()
            )));
        }
        let (a, b) = self.genes(x, y)?;
        self.fetch(x, y, labels)?;

        if self.config.remove_pre_outliers {
            mark_outliers(a, labels, 0, PRE_OUTLIER);
            mark_outliers(b, labels, 0, PRE_OUTLIER);
        }

        let k = match self.config.clustering {
            ClusteringMethod::None => 1,
            ClusteringMethod::Gmm => self.gmm.compute(a, b, labels, &self.params)?,
        };

        if k > 1 && self.config.remove_post_outliers {
            for cluster in 0..k as i8 {
                mark_outliers(a, labels, cluster, POST_OUTLIER);
                mark_outliers(b, labels, cluster, POST_OUTLIER);
            }
        }

        let correlations = cluster_correlations(
            a,
            b,
            labels,
            k,
            self.config.min_samples,
            self.config.correlation,
        )?;
        Ok((k, correlations))
    }

    /// Process a pair into the form stored in a result block.
    pub fn outcome(&self, x: u32, y: u32, labels: &mut [i8]) -> Result<PairOutcome> {
        let (k, correlations) = self.process(x, y, labels)?;
        Ok(PairOutcome::new(k, labels, &correlations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{expression, two_mode_genes};

    fn config() -> SimilarityConfig {
        SimilarityConfig {
            min_samples: 5,
            max_clusters: 2,
            ..Default::default()
        }
    }

    #[test]
    fn fetch_classifies_samples() {
        let input = ExpressionMatrix::new(
            vec![vec![1.0, f32::NAN, 0.1, 4.0], vec![2.0, 3.0, 5.0, f32::NAN]],
            vec!["a".into(), "b".into()],
            (0..4).map(|i| format!("s{i}")).collect(),
        )
        .unwrap();
        let cfg = SimilarityConfig {
            min_expression: 0.5,
            ..config()
        };
        let processor = PairProcessor::new(&input, &cfg);
        let mut labels = [0i8; 4];
        let retained = processor.fetch(1, 0, &mut labels).unwrap();
        assert_eq!(retained, 1);
        assert_eq!(labels, [0, MISSING, BELOW_THRESHOLD, MISSING]);
    }

    #[test]
    fn two_mode_pair_gets_two_clusters() {
        let input = expression(two_mode_genes(40));
        let processor = PairProcessor::new(&input, &config());
        let mut labels = vec![0i8; input.n_samples()];
        let outcome = processor.outcome(1, 0, &mut labels).unwrap();
        assert_eq!(outcome.k, 2);
        assert_eq!(outcome.labels.as_ref().map(Vec::len), Some(80));
        let corr = outcome.correlations.unwrap();
        assert_eq!(corr.len(), 2);
        assert!(corr.iter().all(|r| (-1.0..=1.0).contains(r)));
    }

    #[test]
    fn clustering_disabled_gives_single_cluster() {
        let input = expression(two_mode_genes(20));
        let cfg = SimilarityConfig {
            clustering: ClusteringMethod::None,
            ..config()
        };
        let processor = PairProcessor::new(&input, &cfg);
        let mut labels = vec![0i8; input.n_samples()];
        let outcome = processor.outcome(1, 0, &mut labels).unwrap();
        assert_eq!(outcome.k, 1);
        assert!(outcome.labels.is_none());
        assert_eq!(outcome.correlations.map(|c| c.len()), Some(1));
    }

    #[test]
    fn too_few_samples_gives_zero() {
        let input = expression(two_mode_genes(2));
        let processor = PairProcessor::new(&input, &config());
        let mut labels = vec![0i8; input.n_samples()];
        let outcome = processor.outcome(1, 0, &mut labels).unwrap();
        assert_eq!(outcome, PairOutcome { k: 0, labels: None, correlations: None });
    }

    #[test]
    fn pre_outliers_marked_before_clustering() {
        let mut genes = two_mode_genes(20);
        genes[0][3] = 1e6;
        let input = expression(genes);
        let cfg = SimilarityConfig {
            remove_pre_outliers: true,
            clustering: ClusteringMethod::None,
            ..config()
        };
        let processor = PairProcessor::new(&input, &cfg);
        let mut labels = vec![0i8; input.n_samples()];
        processor.process(1, 0, &mut labels).unwrap();
        assert_eq!(labels[3], PRE_OUTLIER);
    }

    /// Two-mode genes where sample 5 of gene 0 sits between the modes:
    /// unremarkable across all samples, extreme within its own cluster.
    fn within_cluster_outlier() -> ExpressionMatrix {
        let mut genes = two_mode_genes(20);
        genes[0][5] = 4.0;
        expression(genes)
    }

    #[test]
    fn post_outliers_marked_within_cluster() {
        let input = within_cluster_outlier();
        let cfg = SimilarityConfig {
            remove_post_outliers: true,
            ..config()
        };
        let processor = PairProcessor::new(&input, &cfg);
        let mut labels = vec![0i8; input.n_samples()];
        let (k, correlations) = processor.process(1, 0, &mut labels).unwrap();
        assert_eq!(k, 2);
        assert_eq!(correlations.len(), 2);
        assert_eq!(labels[5], POST_OUTLIER);
        assert!(!labels.contains(&PRE_OUTLIER));

        // Only post-clustering removal catches it.
        let kept = PairProcessor::new(&input, &config());
        let mut labels = vec![0i8; input.n_samples()];
        kept.process(1, 0, &mut labels).unwrap();
        assert!((0..2).contains(&labels[5]));
    }

    #[test]
    fn post_outliers_need_clustering() {
        let input = within_cluster_outlier();
        let cfg = SimilarityConfig {
            remove_post_outliers: true,
            clustering: ClusteringMethod::None,
            ..config()
        };
        let processor = PairProcessor::new(&input, &cfg);
        let mut labels = vec![0i8; input.n_samples()];
        let (k, _) = processor.process(1, 0, &mut labels).unwrap();
        assert_eq!(k, 1);
        assert!(!labels.contains(&POST_OUTLIER));
    }

    #[test]
    fn bad_gene_index() {
        let input = expression(two_mode_genes(5));
        let processor = PairProcessor::new(&input, &config());
        let mut labels = vec![0i8; input.n_samples()];
        assert!(matches!(
            processor.process(7, 0, &mut labels),
            Err(CoexError::InvalidIndex(_))
        ));
        let mut short = vec![0i8; 2];
        assert!(processor.process(1, 0, &mut short).is_err());
    }
}
