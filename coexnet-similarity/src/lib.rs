//! Pairwise gene co-expression similarity.
//!
//! For every gene pair of an [`ExpressionMatrix`](coexnet_omics::ExpressionMatrix)
//! the analytic labels missing and low-expression samples, optionally
//! removes outliers, clusters the pair's samples with a Gaussian mixture,
//! correlates each cluster and stores the outcome in two sparse matrices:
//! the cluster composition matrix (`K > 1`) and the correlation matrix
//! (`K > 0`).
//!
//! - **Blocks**: [`WorkBlock`] ranges of pair indices and their
//!   [`ResultBlock`]s
//! - **Executors**: [`SerialExecutor`] (pair by pair) and [`BatchExecutor`]
//!   (fixed-width batches on a [`BatchBackend`](coexnet_gpu::BatchBackend),
//!   with [`HostBackend`] as the CPU implementation)
//! - **Commit**: [`Committer`] writes result blocks in block order
//! - **Driver**: [`Similarity`] runs the whole pipeline and returns a
//!   [`SimilarityReport`]

pub mod analytic;
pub mod block;
pub mod commit;
pub mod config;
pub mod executor;
pub mod host;
pub mod processor;
pub mod progress;

pub use analytic::{Execution, Similarity, SimilarityReport};
pub use block::{PairOutcome, ResultBlock, WorkBlock};
pub use commit::{CommitStats, Committer};
pub use config::SimilarityConfig;
pub use executor::{BatchExecutor, BlockExecutor, SerialExecutor};
pub use host::HostBackend;
pub use processor::PairProcessor;
pub use progress::{Progress, ProgressFn};
