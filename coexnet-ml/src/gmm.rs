//! Two-dimensional Gaussian mixture models fitted by expectation-maximization.

use core::f64::consts::PI;

use coexnet_core::{CoexError, Result, Summarizable};

/// Ridge added to covariance diagonals so tight clusters stay invertible.
const COVARIANCE_RIDGE: f64 = 1e-6;

/// Configuration for EM fitting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GmmConfig {
    pub max_iter: usize,
    /// Stop when the log-likelihood improves by less than this.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for GmmConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-3,
            seed: 42,
        }
    }
}

/// One bivariate normal component.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Component {
    pub weight: f64,
    pub mean: [f64; 2],
    /// `[s_xx, s_xy, s_yy]`.
    pub covariance: [f64; 3],
}

impl Component {
    fn log_density(&self, p: &[f64; 2]) -> f64 {
        let [sxx, sxy, syy] = self.covariance;
        let det = sxx * syy - sxy * sxy;
        let dx = p[0] - self.mean[0];
        let dy = p[1] - self.mean[1];
        let maha = (syy * dx * dx - 2.0 * sxy * dx * dy + sxx * dy * dy) / det;
        -(2.0 * PI).ln() - 0.5 * det.ln() - 0.5 * maha
    }
}

/// Result of fitting a mixture.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GmmFit {
    pub components: Vec<Component>,
    /// Most probable component for each point.
    pub labels: Vec<usize>,
    pub log_likelihood: f64,
    /// Classification entropy `-Σ r ln r` of the responsibilities.
    pub entropy: f64,
    pub n_iter: usize,
}

impl GmmFit {
    /// Number of components.
    pub fn k(&self) -> usize {
        self.components.len()
    }

    /// Free parameters: `k - 1` weights, `2k` means, `3k` covariances.
    pub fn n_params(&self) -> usize {
        6 * self.k() - 1
    }
}

impl Summarizable for GmmFit {
    fn summary(&self) -> String {
        format!(
            "GMM: k={}, log-likelihood={:.4}, iterations={}",
            self.k(),
            self.log_likelihood,
            self.n_iter,
        )
    }
}

/// Fit a `k`-component mixture to `points`.
///
/// Components are seeded with k-means++ and refined by EM until the
/// log-likelihood gain drops below the tolerance.
///
/// # Errors
///
/// [`CoexError::InvalidInput`] if `k == 0` or there are fewer points than
/// components; [`CoexError::Other`] if a component empties out or its
/// covariance becomes singular during EM.
pub fn fit(points: &[[f64; 2]], k: usize, config: &GmmConfig) -> Result<GmmFit> {
    let n = points.len();
    if k == 0 {
        return Err(CoexError::InvalidInput("k must be > 0".into()));
    }
    if k > n {
        return Err(CoexError::InvalidInput(format!(
            "k ({k}) > n_points ({n})"
        )));
    }

    let mut rng = Xorshift64(config.seed.max(1));
    let seeds = kmeans_plus_plus(points, k, &mut rng);

    // Start from a hard assignment to the nearest seed.
    let mut resp = vec![0.0; n * k];
    for (i, p) in points.iter().enumerate() {
        resp[i * k + nearest(p, &seeds)] = 1.0;
    }
    let mut components = m_step(points, &resp, k)?;

    let mut prev = f64::NEG_INFINITY;
    let mut n_iter = 0;
    for _ in 0..config.max_iter {
        n_iter += 1;
        let ll = e_step(points, &components, &mut resp)?;
        components = m_step(points, &resp, k)?;
        if (ll - prev).abs() < config.tolerance {
            break;
        }
        prev = ll;
    }
    let log_likelihood = e_step(points, &components, &mut resp)?;

    let mut labels = Vec::with_capacity(n);
    let mut entropy = 0.0;
    for row in resp.chunks_exact(k) {
        let mut best = 0;
        for (c, &r) in row.iter().enumerate() {
            if r > row[best] {
                best = c;
            }
            if r > 0.0 {
                entropy -= r * r.ln();
            }
        }
        labels.push(best);
    }

    Ok(GmmFit {
        components,
        labels,
        log_likelihood,
        entropy,
        n_iter,
    })
}

/// Fill `resp` with normalized responsibilities; returns the log-likelihood.
fn e_step(points: &[[f64; 2]], components: &[Component], resp: &mut [f64]) -> Result<f64> {
    let k = components.len();
    let mut ll = 0.0;
    for (p, row) in points.iter().zip(resp.chunks_exact_mut(k)) {
        let mut max = f64::NEG_INFINITY;
        for (r, comp) in row.iter_mut().zip(components) {
            *r = comp.weight.ln() + comp.log_density(p);
            max = max.max(*r);
        }
        let mut sum = 0.0;
        for r in row.iter_mut() {
            *r = (*r - max).exp();
            sum += *r;
        }
        for r in row.iter_mut() {
            *r /= sum;
        }
        ll += max + sum.ln();
    }
    if !ll.is_finite() {
        return Err(CoexError::Other("EM: log-likelihood is not finite".into()));
    }
    Ok(ll)
}

fn m_step(points: &[[f64; 2]], resp: &[f64], k: usize) -> Result<Vec<Component>> {
    let n = points.len() as f64;
    let mut components = Vec::with_capacity(k);
    for c in 0..k {
        let mut nk = 0.0;
        let mut mean = [0.0; 2];
        for (p, row) in points.iter().zip(resp.chunks_exact(k)) {
            let r = row[c];
            nk += r;
            mean[0] += r * p[0];
            mean[1] += r * p[1];
        }
        if nk < 1e-8 {
            return Err(CoexError::Other(format!("EM: component {c} is empty")));
        }
        mean[0] /= nk;
        mean[1] /= nk;

        let mut cov = [0.0; 3];
        for (p, row) in points.iter().zip(resp.chunks_exact(k)) {
            let r = row[c];
            let dx = p[0] - mean[0];
            let dy = p[1] - mean[1];
            cov[0] += r * dx * dx;
            cov[1] += r * dx * dy;
            cov[2] += r * dy * dy;
        }
        cov[0] = cov[0] / nk + COVARIANCE_RIDGE;
        cov[1] /= nk;
        cov[2] = cov[2] / nk + COVARIANCE_RIDGE;

        let det = cov[0] * cov[2] - cov[1] * cov[1];
        if !(det > 0.0 && det.is_finite()) {
            return Err(CoexError::Other(format!(
                "EM: component {c} has a singular covariance"
            )));
        }
        components.push(Component {
            weight: nk / n,
            mean,
            covariance: cov,
        });
    }
    Ok(components)
}

fn kmeans_plus_plus(points: &[[f64; 2]], k: usize, rng: &mut Xorshift64) -> Vec<[f64; 2]> {
    let n = points.len();
    let mut seeds = Vec::with_capacity(k);
    seeds.push(points[rng.next_bounded(n as u64) as usize]);

    let mut dists = vec![f64::INFINITY; n];
    for c in 1..k {
        let last = seeds[c - 1];
        for (d, p) in dists.iter_mut().zip(points) {
            *d = d.min(sq_euclidean(p, &last));
        }
        // Weighted random selection proportional to dist^2
        let total: f64 = dists.iter().sum();
        if total == 0.0 {
            seeds.push(points[c % n]);
            continue;
        }
        let threshold = rng.next_f64() * total;
        let mut cumulative = 0.0;
        let mut chosen = n - 1;
        for (i, &d) in dists.iter().enumerate() {
            cumulative += d;
            if cumulative >= threshold {
                chosen = i;
                break;
            }
        }
        seeds.push(points[chosen]);
    }
    seeds
}

fn nearest(p: &[f64; 2], seeds: &[[f64; 2]]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (c, s) in seeds.iter().enumerate() {
        let d = sq_euclidean(p, s);
        if d < best_d {
            best_d = d;
            best = c;
        }
    }
    best
}

fn sq_euclidean(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

/// Minimal xorshift64 PRNG.
struct Xorshift64(u64);

impl Xorshift64 {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_bounded(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two well-separated blobs of `per` points each, deterministic jitter.
    pub(crate) fn two_blobs(per: usize) -> Vec<[f64; 2]> {
        let mut points = Vec::with_capacity(2 * per);
        for i in 0..per {
            let t = i as f64 / per as f64;
            let jitter = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
            points.push([t + 0.1 * jitter, 1.0 + t * 0.5 - 0.1 * jitter]);
            points.push([10.0 + t, 10.0 - t * 0.5 + 0.1 * jitter]);
        }
        points
    }

    #[test]
    fn separates_two_blobs() {
        let points = two_blobs(40);
        let fit = fit(&points, 2, &GmmConfig::default()).unwrap();
        assert_eq!(fit.k(), 2);
        // Points alternate between blobs.
        let a = fit.labels[0];
        let b = fit.labels[1];
        assert_ne!(a, b);
        for (i, &l) in fit.labels.iter().enumerate() {
            assert_eq!(l, if i % 2 == 0 { a } else { b });
        }
        let weight_sum: f64 = fit.components.iter().map(|c| c.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
        assert!(fit.entropy >= 0.0);
    }

    #[test]
    fn single_component_matches_moments() {
        let points = vec![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0], [2.0, 2.0]];
        let fit = fit(&points, 1, &GmmConfig::default()).unwrap();
        let c = &fit.components[0];
        assert!((c.mean[0] - 1.0).abs() < 1e-12);
        assert!((c.mean[1] - 1.0).abs() < 1e-12);
        assert!((c.covariance[0] - 1.0 - COVARIANCE_RIDGE).abs() < 1e-12);
        assert!(c.covariance[1].abs() < 1e-12);
        assert_eq!(fit.n_params(), 5);
        assert_eq!(fit.entropy, 0.0);
    }

    #[test]
    fn deterministic_for_seed() {
        let points = two_blobs(25);
        let config = GmmConfig::default();
        let a = fit(&points, 3, &config);
        let b = fit(&points, 3, &config);
        match (a, b) {
            (Ok(a), Ok(b)) => {
                assert_eq!(a.labels, b.labels);
                assert_eq!(a.log_likelihood, b.log_likelihood);
            }
            (Err(_), Err(_)) => {}
            _ => panic!("same seed gave different outcomes"),
        }
    }

    #[test]
    fn invalid_k() {
        let points = vec![[0.0, 0.0], [1.0, 1.0]];
        assert!(fit(&points, 0, &GmmConfig::default()).is_err());
        assert!(fit(&points, 3, &GmmConfig::default()).is_err());
    }

    #[test]
    fn summary() {
        let points = two_blobs(10);
        let fit = fit(&points, 1, &GmmConfig::default()).unwrap();
        assert!(fit.summary().starts_with("GMM: k=1"));
    }
}
