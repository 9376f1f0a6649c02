use statrs::distribution::{ContinuousCDF, StudentsT};

/// Fewer aligned samples than this and a correlation is meaningless noise;
/// the estimator returns a neutral 0 instead of erroring.
pub const MIN_SAMPLES: usize = 3;

/// 1-based ranks of `values` by ascending order.
///
/// Ties are not averaged: equal values keep their input order (the sort is
/// stable), so the output is always an exact permutation of `1..=n`. Averaged
/// tie ranks would change every reported rho on tied data, so the simpler
/// contract is kept deliberately.
pub fn rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = (position + 1) as f64;
    }
    ranks
}

/// Spearman's rho over two equal-length samples, without tie correction.
///
/// Mismatched lengths or fewer than [`MIN_SAMPLES`] points return 0.0: an
/// insufficient-data sentinel, never an error. The result is not clamped.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < MIN_SAMPLES {
        return 0.0;
    }
    let n = x.len() as f64;
    let rank_x = rank(x);
    let rank_y = rank(y);
    let sum_d2: f64 = rank_x
        .iter()
        .zip(rank_y.iter())
        .map(|(a, b)| {
            let d = a - b;
            d * d
        })
        .sum();
    1.0 - (6.0 * sum_d2) / (n * (n * n - 1.0))
}

/// Two-sided p-value for Spearman's rho via the Student-t approximation
/// `t = r * sqrt((n - 2) / (1 - r^2))` with `n - 2` degrees of freedom.
///
/// Informational only; pair filtering never consults it.
pub fn spearman_p_value_t_approx(r: f64, n: usize) -> Option<f64> {
    if n < 4 || !r.is_finite() {
        return None;
    }
    let r = r.clamp(-0.999_999_9, 0.999_999_9);
    let df = (n as f64) - 2.0;
    let denom = (1.0 - r * r).max(1e-12);
    let t = r * (df / denom).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    Some(p.clamp(0.0, 1.0))
}
