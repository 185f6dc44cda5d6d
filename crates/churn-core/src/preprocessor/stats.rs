//! Batch statistics used for imputation and outlier clamping
//!
//! Quantiles use linear interpolation between closest ranks, the same
//! convention the training notebooks used, so `median([2, 4]) == 3`.

/// Multiplier applied to the interquartile range for outlier fences
pub const IQR_FENCE: f64 = 1.5;

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Quantile `q` in [0, 1] of already sorted values
fn interpolate(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    // Weighted form stays finite where `hi - lo` would overflow
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Quantile of the finite values, `None` if there are none
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let sorted = sorted_copy(values);
    if sorted.is_empty() {
        return None;
    }
    Some(interpolate(&sorted, q))
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Outlier fences `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
pub fn iqr_bounds(values: &[f64]) -> Option<(f64, f64)> {
    let sorted = sorted_copy(values);
    if sorted.is_empty() {
        return None;
    }
    let q1 = interpolate(&sorted, 0.25);
    let q3 = interpolate(&sorted, 0.75);
    let iqr = q3 - q1;
    Some((q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr))
}

/// Outcome of clamping one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampSummary {
    pub lower: f64,
    pub upper: f64,
    pub clamped: usize,
}

/// Winsorize values outside the IQR fences in place.
///
/// Returns `None` and leaves the values alone when no usable fences exist.
pub fn clamp_outliers(values: &mut [f64]) -> Option<ClampSummary> {
    let (lower, upper) = iqr_bounds(values)?;
    if lower.is_nan() || upper.is_nan() || lower > upper {
        return None;
    }
    let mut clamped = 0;
    for v in values.iter_mut() {
        let bounded = v.clamp(lower, upper);
        if bounded != *v {
            *v = bounded;
            clamped += 1;
        }
    }
    Some(ClampSummary { lower, upper, clamped })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[2.0, 4.0]), Some(3.0));
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN]), None);
    }

    #[test]
    fn test_linear_quantiles() {
        let values = [10.0, 12.0, 11.0, 1000.0];
        assert!((quantile(&values, 0.25).unwrap() - 10.75).abs() < 1e-12);
        assert!((quantile(&values, 0.75).unwrap() - 259.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_outliers_upper_fence() {
        let mut values = vec![10.0, 12.0, 11.0, 1000.0];
        let summary = clamp_outliers(&mut values).unwrap();
        // Q1 = 10.75, Q3 = 259, IQR = 248.25
        assert!((summary.upper - 631.375).abs() < 1e-9);
        assert!((summary.lower - (10.75 - 372.375)).abs() < 1e-9);
        assert_eq!(summary.clamped, 1);
        assert_eq!(&values[..3], &[10.0, 12.0, 11.0]);
        assert!((values[3] - 631.375).abs() < 1e-9);
    }

    #[test]
    fn test_quantiles_of_extreme_values_stay_finite() {
        let values = [-1e308, 1e308];
        assert_eq!(median(&values), Some(0.0));
        let (lower, upper) = iqr_bounds(&values).unwrap();
        assert!(!lower.is_nan() && !upper.is_nan());

        let mut values = values.to_vec();
        let summary = clamp_outliers(&mut values).unwrap();
        assert_eq!(summary.clamped, 0);
        assert_eq!(values, vec![-1e308, 1e308]);
    }

    #[test]
    fn test_clamp_constant_column_is_noop() {
        let mut values = vec![0.0; 4];
        let summary = clamp_outliers(&mut values).unwrap();
        assert_eq!(summary.clamped, 0);
        assert_eq!(values, vec![0.0; 4]);
    }
}
