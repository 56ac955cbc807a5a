//! Clustering for co-expression analysis.
//!
//! - **Gaussian mixtures**: Bivariate [`gmm`] fitted by EM with k-means++
//!   seeding
//! - **Model selection**: [`Criterion`] (AIC, BIC, ICL) picks the number
//!   of clusters
//! - **Pairwise clustering**: [`PairwiseGmm`] labels one gene pair's
//!   samples with cluster ids

pub mod criterion;
pub mod gmm;
pub mod pairwise;

pub use criterion::Criterion;
pub use gmm::{GmmConfig, GmmFit};
pub use pairwise::{ClusterParams, ClusteringMethod, PairwiseGmm};
