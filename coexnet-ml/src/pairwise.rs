//! Clustering of one gene pair's samples.

use core::fmt;
use core::str::FromStr;

use coexnet_core::{CoexError, Result};
use coexnet_stats::label::is_retained;

use crate::criterion::Criterion;
use crate::gmm::{fit, GmmConfig, GmmFit};

/// How a pair's samples are clustered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClusteringMethod {
    /// No clustering: every retained sample is in cluster 0.
    None,
    /// Gaussian mixture with model selection.
    #[default]
    Gmm,
}

impl ClusteringMethod {
    /// Numeric code passed to compute kernels.
    pub fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Gmm => 1,
        }
    }
}

impl fmt::Display for ClusteringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gmm => write!(f, "gmm"),
        }
    }
}

impl FromStr for ClusteringMethod {
    type Err = CoexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gmm" => Ok(Self::Gmm),
            other => Err(CoexError::InvalidInput(format!(
                "unknown clustering method '{other}'"
            ))),
        }
    }
}

/// Bounds and selection rule for pairwise clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    /// Fewer retained samples than this gives `K = 0`.
    pub min_samples: usize,
    pub min_clusters: u8,
    pub max_clusters: u8,
    pub criterion: Criterion,
}

/// Selects the number of clusters for a pair by fitting a Gaussian mixture
/// for every `K` in `min_clusters..=max_clusters` and keeping the best
/// score.
#[derive(Debug, Clone, Default)]
pub struct PairwiseGmm {
    config: GmmConfig,
}

impl PairwiseGmm {
    pub fn new(config: GmmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GmmConfig {
        &self.config
    }

    /// Cluster the retained samples of a pair.
    ///
    /// `a` and `b` are the two genes' expression across all samples.
    /// Retained samples (non-negative label) are relabeled with their
    /// cluster id; excluded samples are left alone. Components that win no
    /// sample are dropped and ids are assigned in order of first
    /// appearance, so the returned `K` counts non-empty clusters.
    ///
    /// Returns `K = 0`, with labels untouched, if fewer than
    /// `min_samples` samples are retained or no model could be fitted.
    pub fn compute(
        &self,
        a: &[f32],
        b: &[f32],
        labels: &mut [i8],
        params: &ClusterParams,
    ) -> Result<u8> {
        if a.len() != labels.len() || b.len() != labels.len() {
            return Err(CoexError::InvalidInput(format!(
                "pairwise clustering: {} labels for {} and {} samples",
                labels.len(),
                a.len(),
                b.len()
            )));
        }
        let retained: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| is_retained(l))
            .map(|(i, _)| i)
            .collect();
        if retained.is_empty() || retained.len() < params.min_samples {
            return Ok(0);
        }
        let points: Vec<[f64; 2]> = retained
            .iter()
            .map(|&i| [a[i] as f64, b[i] as f64])
            .collect();

        let mut best: Option<(f64, GmmFit)> = None;
        for k in params.min_clusters.max(1)..=params.max_clusters {
            let Ok(model) = fit(&points, k as usize, &self.config) else {
                continue;
            };
            let score =
                params
                    .criterion
                    .score(model.log_likelihood, model.n_params(), points.len(), model.entropy);
            if !score.is_finite() {
                continue;
            }
            if best.as_ref().map_or(true, |(s, _)| score < *s) {
                best = Some((score, model));
            }
        }
        let Some((_, model)) = best else {
            return Ok(0);
        };

        let mut remap = vec![-1i8; model.k()];
        let mut next = 0i8;
        for (&i, &component) in retained.iter().zip(&model.labels) {
            if remap[component] < 0 {
                remap[component] = next;
                next += 1;
            }
            labels[i] = remap[component];
        }
        Ok(next as u8)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn labels_are_dense_cluster_ids(
            samples in prop::collection::vec((-5f32..5.0, -5f32..5.0, prop::bool::weighted(0.9)), 12..60)
        ) {
            let a: Vec<f32> = samples.iter().map(|s| s.0).collect();
            let b: Vec<f32> = samples.iter().map(|s| s.1).collect();
            let mut labels: Vec<i8> = samples.iter().map(|s| if s.2 { 0 } else { -9 }).collect();
            let before = labels.clone();
            let k = PairwiseGmm::default()
                .compute(&a, &b, &mut labels, &ClusterParams {
                    min_samples: 5,
                    min_clusters: 1,
                    max_clusters: 3,
                    criterion: Criterion::Icl,
                })
                .unwrap();
            prop_assert!(k <= 3);
            for (l, b) in labels.iter().zip(&before) {
                if *b < 0 {
                    prop_assert_eq!(l, b);
                } else if k > 0 {
                    prop_assert!(*l >= 0 && (*l as u8) < k);
                }
            }
            if k > 0 {
                for cluster in 0..k as i8 {
                    prop_assert!(labels.contains(&cluster));
                }
            }
        }
    }
}
