//! Pairwise gene indexing and sparse indexed matrix storage.
//!
//! - **Pairwise index**: [`PairIndex`] maps an unordered gene pair
//!   `(x, y)`, `y < x`, to a linear ordinal and back
//! - **Storage**: [`SparseMatrix`] (memory-mapped reader) and
//!   [`MatrixWriter`] (append-only writer) over one file format shared by
//!   every pairwise matrix, parameterized by a [`PayloadCodec`]
//! - **Cursor**: [`Cursor`] gives sequential (`read_next`) and random
//!   (`read`) access to stored [`Pair`] records
//!
//! Only pairs with at least one cluster are stored. Each record carries its
//! own pair index, so a seek is a binary search rather than a scan.
//!
//! # Quick start
//!
//! ```
//! use coexnet_pairwise::{CorrelationCodec, CorrelationMatrix, CorrelationWriter, PairIndex};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("correlations.bin");
//! let genes = vec!["a".to_string(), "b".into(), "c".into(), "d".into()];
//!
//! let mut writer = CorrelationWriter::create(&path, CorrelationCodec::new("pearson")).unwrap();
//! writer.initialize(genes, 20, 5).unwrap();
//! let pair = PairIndex::new(4, 2, 1).unwrap();
//! writer.write(pair.to_linear(), &[0.8, -0.3]).unwrap();
//! writer.finish().unwrap();
//!
//! let matrix = CorrelationMatrix::open(&path).unwrap();
//! let mut cursor = matrix.cursor();
//! assert!(cursor.read_pair(pair).unwrap());
//! assert_eq!(cursor.pair().clusters(), &[0.8, -0.3]);
//! assert_eq!(matrix.size(), 1);
//! ```

mod bytes;
pub mod codec;
pub mod header;
pub mod index;
pub mod matrix;
pub mod pair;
pub mod writer;

pub use codec::{
    ClusterCodec, ConditionTestCodec, CorrelationCodec, PayloadCodec, PayloadKind, SampleCode,
    TestResult,
};
pub use header::{MatrixHeader, MAX_CLUSTERS};
pub use index::{total_pairs, PairIndex, PairRange};
pub use matrix::{Cursor, SparseMatrix};
pub use pair::Pair;
pub use writer::MatrixWriter;

/// Cluster composition matrix.
pub type ClusterMatrix = SparseMatrix<ClusterCodec>;
/// Correlation matrix.
pub type CorrelationMatrix = SparseMatrix<CorrelationCodec>;
/// Condition-specific test matrix.
pub type ConditionTestMatrix = SparseMatrix<ConditionTestCodec>;

/// Writer for a [`ClusterMatrix`].
pub type ClusterWriter = MatrixWriter<ClusterCodec>;
/// Writer for a [`CorrelationMatrix`].
pub type CorrelationWriter = MatrixWriter<CorrelationCodec>;
/// Writer for a [`ConditionTestMatrix`].
pub type ConditionTestWriter = MatrixWriter<ConditionTestCodec>;
