//! Two-proportion statistics for A/B click-rate comparison.

use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// z for a two-sided 95% interval.
const Z_95: f64 = 1.959_964;

fn standard_error(p_a: f64, n_a: u64, p_b: f64, n_b: u64) -> f64 {
    let n_a = n_a.max(1) as f64;
    let n_b = n_b.max(1) as f64;
    (p_a * (1.0 - p_a) / n_a + p_b * (1.0 - p_b) / n_b).sqrt()
}

/// Confidence (0..100) that two click rates differ, from unpooled
/// proportions `p_a`, `p_b` in [0, 1]. A zero count is treated as one.
///
/// The two-sided p-value uses `tanh` in place of the normal CDF, so values
/// are approximate.
pub fn significance(p_a: f64, n_a: u64, p_b: f64, n_b: u64) -> f64 {
    let se = standard_error(p_a, n_a, p_b, n_b);
    let z = if se > 0.0 { (p_a - p_b).abs() / se } else { 0.0 };
    let p_value = 2.0 * (1.0 - 0.5 * (1.0 + (z / SQRT_2).tanh()));
    (1.0 - p_value) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Wald 95% interval for `p_b - p_a`, scaled to percentage points.
pub fn difference_interval(p_a: f64, n_a: u64, p_b: f64, n_b: u64) -> ConfidenceInterval {
    let diff = p_b - p_a;
    let half_width = Z_95 * standard_error(p_a, n_a, p_b, n_b);
    ConfidenceInterval {
        lower: (diff - half_width) * 100.0,
        upper: (diff + half_width) * 100.0,
    }
}

/// Percentage rounded to two decimals; 0 when nothing was sent.
pub fn rate_percent(count: u64, sent: u64) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    (count as f64 / sent as f64 * 10_000.0).round() / 100.0
}
