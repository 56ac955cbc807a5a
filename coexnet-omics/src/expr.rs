//! Dense expression matrix for bulk gene expression data.
//!
//! [`ExpressionMatrix`] stores a row-major dense matrix of `f32` values
//! (n_genes × n_samples) with associated gene and sample names. A `NaN`
//! value marks an expression that was not measured. The matrix is read-only
//! once built and may be shared freely across worker threads.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use coexnet_core::{CoexError, Result, Summarizable};

/// Default token for a missing expression value in text input.
pub const DEFAULT_NAN_TOKEN: &str = "NA";

/// A dense, row-major expression matrix (genes × samples).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExpressionMatrix {
    data: Vec<f32>,
    n_genes: usize,
    n_samples: usize,
    gene_names: Vec<String>,
    sample_names: Vec<String>,
}

impl ExpressionMatrix {
    /// Create a matrix from row-major 2D data.
    ///
    /// Each inner `Vec` is one gene (row) with `n_samples` values.
    pub fn new(
        data: Vec<Vec<f32>>,
        gene_names: Vec<String>,
        sample_names: Vec<String>,
    ) -> Result<Self> {
        let n_genes = data.len();
        let n_samples = sample_names.len();

        if gene_names.len() != n_genes {
            return Err(CoexError::InvalidInput(format!(
                "gene_names length ({}) does not match row count ({n_genes})",
                gene_names.len()
            )));
        }

        let mut flat = Vec::with_capacity(n_genes * n_samples);
        for (i, row) in data.iter().enumerate() {
            if row.len() != n_samples {
                return Err(CoexError::InvalidInput(format!(
                    "row {i} has {} columns, expected {n_samples}",
                    row.len()
                )));
            }
            flat.extend_from_slice(row);
        }

        Ok(Self {
            data: flat,
            n_genes,
            n_samples,
            gene_names,
            sample_names,
        })
    }

    /// Read a whitespace-delimited expression file.
    ///
    /// The first non-empty line holds the sample names. Every following line
    /// is `gene_name value value ...` with one value per sample; `nan_token`
    /// marks a missing value.
    pub fn read_tsv(path: impl AsRef<Path>, nan_token: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CoexError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        Self::from_reader(BufReader::new(file), nan_token)
    }

    /// Parse expression text already held in memory. See [`read_tsv`](Self::read_tsv).
    pub fn parse_tsv_str(text: &str, nan_token: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes(), nan_token)
    }

    fn from_reader(reader: impl BufRead, nan_token: &str) -> Result<Self> {
        let mut sample_names: Option<Vec<String>> = None;
        let mut gene_names = Vec::new();
        let mut rows = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let mut tokens = trimmed.split_whitespace();
            if sample_names.is_none() {
                sample_names = Some(tokens.map(str::to_string).collect());
                continue;
            }
            let expected = sample_names.as_ref().map_or(0, Vec::len);

            let name = tokens.next().unwrap_or_default().to_string();
            let row = tokens
                .map(|token| parse_value(token, nan_token, line_num + 1))
                .collect::<Result<Vec<f32>>>()?;
            if row.len() != expected {
                return Err(CoexError::InvalidInput(format!(
                    "line {}: gene {name} has {} values, expected {expected}",
                    line_num + 1,
                    row.len(),
                )));
            }
            gene_names.push(name);
            rows.push(row);
        }

        let sample_names = sample_names.ok_or_else(|| {
            CoexError::InvalidInput("expression file has no sample header".into())
        })?;
        Self::new(rows, gene_names, sample_names)
    }

    /// (n_genes, n_samples).
    pub fn shape(&self) -> (usize, usize) {
        (self.n_genes, self.n_samples)
    }

    /// Number of genes (rows).
    pub fn n_genes(&self) -> usize {
        self.n_genes
    }

    /// Number of samples (columns).
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Get a single value by gene and sample index.
    pub fn get(&self, gene_idx: usize, sample_idx: usize) -> Option<f32> {
        if gene_idx < self.n_genes && sample_idx < self.n_samples {
            Some(self.data[gene_idx * self.n_samples + sample_idx])
        } else {
            None
        }
    }

    /// A slice of one gene's expression across all samples.
    pub fn gene(&self, gene_idx: usize) -> Option<&[f32]> {
        if gene_idx < self.n_genes {
            let start = gene_idx * self.n_samples;
            Some(&self.data[start..start + self.n_samples])
        } else {
            None
        }
    }

    /// The underlying flat data as a slice (row-major, n_genes × n_samples).
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Gene names.
    pub fn gene_names(&self) -> &[String] {
        &self.gene_names
    }

    /// Sample names.
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }
}

impl Summarizable for ExpressionMatrix {
    fn summary(&self) -> String {
        format!(
            "ExpressionMatrix: {} genes \u{00d7} {} samples",
            self.n_genes, self.n_samples
        )
    }
}

fn parse_value(token: &str, nan_token: &str, line: usize) -> Result<f32> {
    if token == nan_token {
        return Ok(f32::NAN);
    }
    token.parse::<f32>().map_err(|_| {
        CoexError::InvalidInput(format!("line {line}: invalid expression value '{token}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_matrix() -> ExpressionMatrix {
        ExpressionMatrix::new(
            vec![vec![1.0, 2.0, 3.0], vec![4.0, f32::NAN, 6.0]],
            vec!["g1".into(), "g2".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
        )
        .unwrap()
    }

    #[test]
    fn shape_and_access() {
        let m = sample_matrix();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.get(0, 2), Some(3.0));
        assert!(m.get(1, 1).unwrap().is_nan());
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.gene(0), Some(&[1.0, 2.0, 3.0][..]));
        assert!(m.gene(2).is_none());
    }

    #[test]
    fn ragged_rows_rejected() {
        let result = ExpressionMatrix::new(
            vec![vec![1.0, 2.0], vec![3.0]],
            vec!["a".into(), "b".into()],
            vec!["s1".into(), "s2".into()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn name_count_mismatch_rejected() {
        let result = ExpressionMatrix::new(
            vec![vec![1.0]],
            vec!["a".into(), "b".into()],
            vec!["s1".into()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn parse_text_with_nan_token() {
        let text = "s1\ts2\ts3\ngA\t1.5\tNA\t2\n\ngB 0 1 2\n";
        let m = ExpressionMatrix::parse_tsv_str(text, DEFAULT_NAN_TOKEN).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.gene_names(), &["gA".to_string(), "gB".to_string()]);
        assert_eq!(m.sample_names().len(), 3);
        assert!(m.get(0, 1).unwrap().is_nan());
        assert_eq!(m.get(1, 2), Some(2.0));
    }

    #[test]
    fn parse_text_bad_value() {
        let text = "s1 s2\ngA 1 x\n";
        assert!(ExpressionMatrix::parse_tsv_str(text, "NA").is_err());
    }

    #[test]
    fn parse_text_wrong_width() {
        let text = "s1 s2\ngA 1\n";
        assert!(ExpressionMatrix::parse_tsv_str(text, "NA").is_err());
    }

    #[test]
    fn read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a b").unwrap();
        writeln!(file, "g1 1 2").unwrap();
        writeln!(file, "g2 ? 4").unwrap();
        file.flush().unwrap();

        let m = ExpressionMatrix::read_tsv(file.path(), "?").unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert!(m.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn summary() {
        assert_eq!(
            sample_matrix().summary(),
            "ExpressionMatrix: 2 genes \u{00d7} 3 samples"
        );
    }
}
