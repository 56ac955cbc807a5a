//! Correlation analysis.
//!
//! Pearson and Spearman coefficients over `f64` sums, and the
//! per-cluster correlation of a gene pair. A constant series has no
//! defined correlation and yields `NaN`.

use core::fmt;
use core::str::FromStr;

use coexnet_core::{CoexError, Result};

use crate::rank::rank;

/// Which correlation coefficient to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

impl CorrelationMethod {
    /// Lowercase name, as recorded in correlation matrix files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
        }
    }

    /// Compute this coefficient for paired observations.
    pub fn compute(self, x: &[f64], y: &[f64]) -> Result<f64> {
        match self {
            Self::Pearson => pearson(x, y),
            Self::Spearman => spearman(x, y),
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CorrelationMethod {
    type Err = CoexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            other => Err(CoexError::InvalidInput(format!(
                "unknown correlation method '{other}'"
            ))),
        }
    }
}

/// Pearson correlation of paired observations.
///
/// Deviations are taken from the mean, so large offsets do not cancel.
/// `NaN` when either series has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<f64> {
    check_paired(x, y)?;
    let (mx, my) = (mean(x), mean(y));
    let (sxy, sxx, syy) = x
        .iter()
        .zip(y)
        .fold((0.0, 0.0, 0.0), |(sxy, sxx, syy), (&xi, &yi)| {
            let (dx, dy) = (xi - mx, yi - my);
            (sxy + dx * dy, sxx + dx * dx, syy + dy * dy)
        });
    if sxx == 0.0 || syy == 0.0 {
        return Ok(f64::NAN);
    }
    Ok((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Spearman correlation: Pearson over average-tie ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<f64> {
    check_paired(x, y)?;
    pearson(&rank(x), &rank(y))
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

fn check_paired(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(CoexError::InvalidInput(format!(
            "{} and {} observations cannot be paired",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(CoexError::InvalidInput(format!(
            "correlation needs two or more observations, got {}",
            x.len()
        )));
    }
    Ok(())
}

// ── Per-cluster correlation ────────────────────────────────────────────────

/// Correlation of each of the `k` clusters of a gene pair.
///
/// `a` and `b` are the two genes' expression across all samples and
/// `labels` the per-sample cluster ids (negative labels are excluded).
/// A cluster with fewer than `min_samples` members (or fewer than two)
/// gets `NaN` in its slot; the result always has `k` entries.
pub fn cluster_correlations(
    a: &[f32],
    b: &[f32],
    labels: &[i8],
    k: u8,
    min_samples: usize,
    method: CorrelationMethod,
) -> Result<Vec<f32>> {
    if a.len() != labels.len() || b.len() != labels.len() {
        return Err(CoexError::InvalidInput(format!(
            "cluster correlation: {} labels for {} and {} samples",
            labels.len(),
            a.len(),
            b.len()
        )));
    }

    let mut x = Vec::with_capacity(labels.len());
    let mut y = Vec::with_capacity(labels.len());
    let mut out = Vec::with_capacity(k as usize);
    for cluster in 0..k as i8 {
        x.clear();
        y.clear();
        for ((&l, &va), &vb) in labels.iter().zip(a).zip(b) {
            if l == cluster {
                x.push(va as f64);
                y.push(vb as f64);
            }
        }
        let r = if x.len() < min_samples.max(2) {
            f64::NAN
        } else {
            method.compute(&x, &y)?
        };
        out.push(r as f32);
    }
    Ok(out)
}

// ── Tests ──────────────────────────────────────────────────────────────────
