//! Model-selection criteria. Lower scores are better.

use core::fmt;
use core::str::FromStr;

use coexnet_core::{CoexError, Result};

/// Information criterion used to choose the number of clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Criterion {
    /// Akaike: `2p - 2 ln L`.
    Aic,
    /// Bayesian: `p ln n - 2 ln L`.
    #[default]
    Bic,
    /// Integrated completed likelihood: BIC plus twice the classification
    /// entropy.
    Icl,
}

impl Criterion {
    /// Score a fit with log-likelihood `log_likelihood`, `n_params` free
    /// parameters, `n` observations and classification entropy `entropy`.
    pub fn score(self, log_likelihood: f64, n_params: usize, n: usize, entropy: f64) -> f64 {
        let p = n_params as f64;
        match self {
            Self::Aic => 2.0 * p - 2.0 * log_likelihood,
            Self::Bic => p * (n as f64).ln() - 2.0 * log_likelihood,
            Self::Icl => p * (n as f64).ln() - 2.0 * log_likelihood + 2.0 * entropy,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Aic => "aic",
            Self::Bic => "bic",
            Self::Icl => "icl",
        }
    }

    /// Numeric code passed to compute kernels.
    pub fn code(self) -> i32 {
        match self {
            Self::Aic => 0,
            Self::Bic => 1,
            Self::Icl => 2,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Criterion {
    type Err = CoexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aic" => Ok(Self::Aic),
            "bic" => Ok(Self::Bic),
            "icl" => Ok(Self::Icl),
            other => Err(CoexError::InvalidInput(format!(
                "unknown model-selection criterion '{other}'"
            ))),
        }
    }
}
