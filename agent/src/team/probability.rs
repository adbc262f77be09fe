use crate::types::OutcomeAnalysis;

/// Summed probability may drift this far from 100 before rescaling
pub const RESCALE_TOLERANCE: f64 = 2.0;

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn clamp_pct(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// Mean with the single highest and lowest values dropped once there are three or more
pub fn trimmed_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    if values.len() <= 2 {
        return Some(values.iter().sum::<f64>() / values.len() as f64);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let inner = &sorted[1..sorted.len() - 1];
    Some(inner.iter().sum::<f64>() / inner.len() as f64)
}

pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Proportionally rescale AI probabilities to sum to 100 when a multi-outcome
/// set (more than two outcomes) drifts past the tolerance. Edges are recomputed.
/// Returns true when a rescale happened.
pub fn rescale_to_hundred(rankings: &mut [OutcomeAnalysis]) -> bool {
    if rankings.len() <= 2 {
        return false;
    }
    let sum: f64 = rankings.iter().map(|o| o.ai_probability).sum();
    if sum <= 0.0 || (sum - 100.0).abs() <= RESCALE_TOLERANCE {
        return false;
    }
    for o in rankings.iter_mut() {
        o.ai_probability = clamp_pct(o.ai_probability * 100.0 / sum);
        o.edge = o.ai_probability - o.market_probability;
    }
    true
}

/// Highest AI probability first; stable for ties
pub fn sort_rankings(rankings: &mut [OutcomeAnalysis]) {
    rankings.sort_by(|a, b| b.ai_probability.total_cmp(&a.ai_probability));
}
