//! Order statistics used throughout analysis.
//!
//! Selection uses a deterministic quickselect (Lomuto partition around the
//! middle element) so equal inputs always visit the same pivots and return
//! the same value, run after run.

/// Denominators at or below this are replaced by `1.0`.
pub const NORMALIZE_FLOOR: f32 = 1e-6;

/// The order statistic at rank `round((n - 1) * q)`.
///
/// `q` is clamped into `[0, 1]`. The input is copied; `values` is left
/// untouched. Returns `0.0` for an empty slice.
#[must_use = "returns the selected order statistic"]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn quantile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
    let rank = ((values.len() - 1) as f64 * f64::from(q)).round() as usize;
    let mut scratch = values.to_vec();
    select(&mut scratch, rank.min(values.len() - 1))
}

/// `quantile(values, p / 100)`.
#[must_use = "returns the selected percentile"]
pub fn percentile(values: &[f32], p: f32) -> f32 {
    quantile(values, p / 100.0)
}

/// A safe denominator for normalizing `values` by their `p`-th percentile.
///
/// Returns `1.0` when `values` is empty or when the percentile does not
/// exceed [`NORMALIZE_FLOOR`].
#[must_use = "returns the normalization denominator"]
pub fn robust_normalize(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 1.0;
    }
    let v = percentile(values, p);
    if v <= NORMALIZE_FLOOR { 1.0 } else { v }
}

#[must_use]
pub fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

#[must_use]
pub fn clamp01_f64(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn select(values: &mut [f32], k: usize) -> f32 {
    let mut left = 0;
    let mut right = values.len() - 1;
    loop {
        if left >= right {
            return values[left];
        }
        let pivot = partition(values, left, right, left + (right - left) / 2);
        match k.cmp(&pivot) {
            std::cmp::Ordering::Equal => return values[k],
            std::cmp::Ordering::Less => right = pivot - 1,
            std::cmp::Ordering::Greater => left = pivot + 1,
        }
    }
}

fn partition(values: &mut [f32], left: usize, right: usize, pivot_index: usize) -> usize {
    let pivot = values[pivot_index];
    values.swap(pivot_index, right);
    let mut store = left;
    for i in left..right {
        if values[i].total_cmp(&pivot).is_lt() {
            values.swap(store, i);
            store += 1;
        }
    }
    values.swap(right, store);
    store
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_zero() {
        assert!(quantile(&[], 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn median_of_odd_length() {
        assert!((quantile(&[5.0, 1.0, 3.0], 0.5) - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn extremes_select_min_and_max() {
        let values = [4.0, -2.0, 9.0, 0.5, 7.0];
        assert!((quantile(&values, 0.0) - -2.0).abs() < f32::EPSILON);
        assert!((quantile(&values, 1.0) - 9.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rank_is_rounded() {
        // n = 4, q = 0.5 -> rank round(1.5) = 2 -> third smallest.
        let values = [40.0, 10.0, 30.0, 20.0];
        assert!((quantile(&values, 0.5) - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn input_is_not_reordered() {
        let values = vec![3.0, 1.0, 2.0, 5.0, 4.0];
        let before = values.clone();
        let _ = quantile(&values, 0.3);
        assert_eq!(values, before);
    }

    #[test]
    fn matches_sorted_reference_for_every_rank() {
        let values: Vec<f32> = (0..97).map(|i| ((i * 37) % 101) as f32).collect();
        let mut sorted = values.clone();
        sorted.sort_by(f32::total_cmp);
        for i in 0..=20 {
            let q = i as f32 / 20.0;
            let rank = ((values.len() - 1) as f64 * f64::from(q)).round() as usize;
            assert!(
                (quantile(&values, q) - sorted[rank]).abs() < f32::EPSILON,
                "mismatch at q={q}"
            );
        }
    }

    #[test]
    fn handles_many_duplicates() {
        let values = vec![1.0; 50];
        assert!((quantile(&values, 0.85) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn percentile_scales_by_hundred() {
        let values: Vec<f32> = (0..=100).map(|i| i as f32).collect();
        assert!((percentile(&values, 99.0) - 99.0).abs() < f32::EPSILON);
    }

    #[test]
    fn robust_normalize_guards_small_denominators() {
        assert!((robust_normalize(&[], 99.0) - 1.0).abs() < f32::EPSILON);
        assert!((robust_normalize(&[0.0, 0.0, 0.0], 99.0) - 1.0).abs() < f32::EPSILON);
        assert!((robust_normalize(&[0.25, 0.5], 99.0) - 0.5).abs() < f32::EPSILON);
    }
}
