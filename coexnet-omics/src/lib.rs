//! Omics input data for the coexnet workspace.
//!
//! - **Expression matrices**: Dense [`ExpressionMatrix`] (genes × samples,
//!   `f32`, `NaN` marks a missing value)
//!
//! # Quick start
//!
//! ```
//! use coexnet_omics::ExpressionMatrix;
//! use coexnet_core::Summarizable;
//!
//! let matrix = ExpressionMatrix::new(
//!     vec![vec![1.0, 2.0], vec![3.0, f32::NAN]],
//!     vec!["gene1".into(), "gene2".into()],
//!     vec!["sample_a".into(), "sample_b".into()],
//! ).unwrap();
//!
//! assert_eq!(matrix.shape(), (2, 2));
//! assert_eq!(matrix.gene(0), Some(&[1.0, 2.0][..]));
//! assert_eq!(matrix.summary(), "ExpressionMatrix: 2 genes \u{00d7} 2 samples");
//! ```

pub mod expr;

pub use expr::ExpressionMatrix;
