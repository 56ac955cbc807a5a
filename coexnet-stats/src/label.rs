//! Per-sample label codes.
//!
//! A label is an `i8`: `0..K` is a cluster id, negative values record why a
//! sample was excluded.

/// Expression missing (`NaN`) in either gene.
pub const MISSING: i8 = -9;
/// Expression below the minimum threshold in either gene.
pub const BELOW_THRESHOLD: i8 = -6;
/// Removed as an outlier before clustering.
pub const PRE_OUTLIER: i8 = -7;
/// Removed as an outlier of its cluster after clustering.
pub const POST_OUTLIER: i8 = -8;

/// Whether a sample still takes part in clustering and correlation.
#[inline]
pub fn is_retained(label: i8) -> bool {
    label >= 0
}

/// Number of retained samples.
pub fn retained_count(labels: &[i8]) -> usize {
    labels.iter().filter(|&&l| is_retained(l)).count()
}
