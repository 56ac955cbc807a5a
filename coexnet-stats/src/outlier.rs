//! Quartile-based outlier marking along one expression axis.

/// Mark outliers of `cluster` along one axis.
///
/// The quartiles are the order statistics at `n / 4` and `3n / 4` of the
/// axis values of samples labeled `cluster` or already labeled `marker`
/// (`n` is their count). Samples labeled `cluster` whose value lies
/// outside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]` are relabeled `marker`. Counting
/// previously marked samples keeps the bounds fixed, so a second call with
/// the same arguments marks nothing new.
///
/// `values` holds one gene's expression for every sample and must be as
/// long as `labels`.
pub fn mark_outliers(values: &[f32], labels: &mut [i8], cluster: i8, marker: i8) {
    let mut sorted: Vec<f32> = values
        .iter()
        .zip(labels.iter())
        .filter(|(_, &l)| l == cluster || l == marker)
        .map(|(&v, _)| v)
        .collect();
    if sorted.is_empty() {
        return;
    }
    sorted.sort_by(f32::total_cmp);

    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[n * 3 / 4];
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    for (label, &v) in labels.iter_mut().zip(values) {
        if *label == cluster && (v < lower || upper < v) {
            *label = marker;
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
