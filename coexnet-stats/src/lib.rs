//! Per-pair statistics for co-expression analysis.
//!
//! - **Sample labels**: [`label`] codes shared by every stage of the
//!   per-pair pipeline
//! - **Outliers**: Quartile-based outlier marking on one expression axis
//! - **Correlation**: Pearson and Spearman coefficients, per cluster
//! - **Ranking**: Average-tie ranks for Spearman correlation

pub mod correlation;
pub mod label;
pub mod outlier;
pub mod rank;

pub use correlation::{cluster_correlations, pearson, spearman, CorrelationMethod};
pub use outlier::mark_outliers;
pub use rank::rank;
