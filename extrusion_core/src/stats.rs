//! Robust statistics over numeric samples.
//!
//! All functions are pure and allocation-light. Empty inputs produce empty
//! outputs (or 0 for scalar summaries) rather than NaN.

/// Consistency constant scaling MAD to the standard deviation of a normal distribution.
pub const MAD_CONSISTENCY: f64 = 1.4826;
/// Fraction of absolute deviations dropped from each tail before taking their median.
pub const MAD_TRIM_FRACTION: f64 = 0.05;

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Standard deviation with divisor `n`.
pub fn population_std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Standard deviation with divisor `n - 1`; 0 for fewer than two values.
pub fn sample_std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Z-score of every value against the sample's mean and population std.
/// All zeros when the std is 0.
pub fn z_scores(xs: &[f64]) -> Vec<f64> {
    let m = mean(xs);
    let sd = population_std_dev(xs);
    if sd == 0.0 {
        return vec![0.0; xs.len()];
    }
    xs.iter().map(|x| (x - m) / sd).collect()
}

fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Upper median (`sorted[n / 2]`) of an already sorted slice.
#[inline]
fn upper_median(sorted: &[f64]) -> Option<f64> {
    sorted.get(sorted.len() / 2).copied()
}

/// Median absolute deviation with 5% tail trimming.
///
/// The trimmed median falls back to the untrimmed one when it is zero.
pub fn trimmed_mad(xs: &[f64]) -> f64 {
    let Some(median) = upper_median(&sorted(xs)) else {
        return 0.0;
    };
    let deviations: Vec<f64> = xs.iter().map(|x| (x - median).abs()).collect();
    trimmed_mad_of_deviations(&sorted(&deviations))
}

fn trimmed_mad_of_deviations(sorted_dev: &[f64]) -> f64 {
    let n = sorted_dev.len();
    let trim = (n as f64 * MAD_TRIM_FRACTION).floor() as usize;
    let trimmed = &sorted_dev[trim..n - trim];
    match upper_median(trimmed) {
        Some(m) if m != 0.0 => m,
        _ => upper_median(sorted_dev).unwrap_or(0.0),
    }
}

/// Robust outlier score of every value: `|x - median| / (mad * 1.4826)`.
/// All zeros when the MAD is 0.
pub fn mad_scores(xs: &[f64]) -> Vec<f64> {
    let Some(median) = upper_median(&sorted(xs)) else {
        return Vec::new();
    };
    let deviations: Vec<f64> = xs.iter().map(|x| (x - median).abs()).collect();
    let mad = trimmed_mad_of_deviations(&sorted(&deviations));
    if mad == 0.0 {
        return vec![0.0; xs.len()];
    }
    deviations
        .iter()
        .map(|d| d / (mad * MAD_CONSISTENCY))
        .collect()
}

/// Nearest-rank percentile (`p` in 0..=100) over the finite values.
///
/// Ranks outside the sample fall back to the maximum; an empty sample yields 0.
pub fn percentile(xs: &[f64], p: f64) -> f64 {
    let finite: Vec<f64> = xs.iter().copied().filter(|v| v.is_finite()).collect();
    let v = sorted(&finite);
    let Some(&last) = v.last() else {
        return 0.0;
    };
    let rank = (p / 100.0 * v.len() as f64).ceil() as i64 - 1;
    usize::try_from(rank)
        .ok()
        .and_then(|i| v.get(i).copied())
        .unwrap_or(last)
}
