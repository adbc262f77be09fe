use crate::types::{MarketOutcome, RawOutcome};
use tracing::{debug, warn};

/// Sum deviation beyond which a renormalization is reported as a correction
pub const SUM_WARN_TOLERANCE: f64 = 0.15;

/// Convert caller-supplied prices into canonical [0, 1] outcomes.
///
/// With fewer than two `outcomes` the market is treated as binary and built
/// from the YES/NO percentages. Multi-outcome prices may arrive as 0-1 or
/// 0-100 values; anything above 1 is read as a percentage.
pub fn normalize_outcomes(
    outcomes: Option<&[RawOutcome]>,
    yes_percentage: f64,
    no_percentage: f64,
    market_id: &str,
) -> Vec<MarketOutcome> {
    match outcomes {
        Some(raw) if raw.len() >= 2 => normalize_multi(raw, market_id),
        _ => normalize_binary(yes_percentage, no_percentage, market_id),
    }
}

fn normalize_binary(yes_percentage: f64, no_percentage: f64, market_id: &str) -> Vec<MarketOutcome> {
    let yes = if yes_percentage.is_finite() {
        (yes_percentage / 100.0).clamp(0.0, 1.0)
    } else if no_percentage.is_finite() {
        (1.0 - no_percentage / 100.0).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let no = 1.0 - yes;

    vec![
        MarketOutcome {
            label: "Yes".to_string(),
            yes_price: yes,
            no_price: no,
            market_id: market_id.to_string(),
        },
        MarketOutcome {
            label: "No".to_string(),
            yes_price: no,
            no_price: yes,
            market_id: market_id.to_string(),
        },
    ]
}

fn normalize_multi(raw: &[RawOutcome], market_id: &str) -> Vec<MarketOutcome> {
    let n = raw.len() as f64;
    let equal_share = 1.0 / n;

    // Only NO prices the caller left out are derived from YES
    let derived_no: Vec<bool> = raw
        .iter()
        .map(|o| o.no_price.and_then(to_unit).is_none())
        .collect();

    let mut outcomes: Vec<MarketOutcome> = raw
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let yes = o
                .yes_price
                .or(o.implied_probability)
                .and_then(to_unit)
                .unwrap_or(equal_share);
            let no = o.no_price.and_then(to_unit).unwrap_or(1.0 - yes);
            let label = if o.label.trim().is_empty() {
                format!("Outcome {}", i + 1)
            } else {
                o.label.trim().to_string()
            };
            MarketOutcome {
                label,
                yes_price: yes,
                no_price: no,
                market_id: o.market_id.clone().unwrap_or_else(|| market_id.to_string()),
            }
        })
        .collect();

    let sum: f64 = outcomes.iter().map(|o| o.yes_price).sum();
    if sum > 0.0 && (sum - 1.0).abs() > f64::EPSILON * n {
        if (sum - 1.0).abs() > SUM_WARN_TOLERANCE {
            warn!("Outcome prices sum to {:.3}, renormalizing {} outcomes", sum, outcomes.len());
        } else {
            debug!("Outcome prices sum to {:.3}, renormalizing", sum);
        }
        for (o, derived) in outcomes.iter_mut().zip(&derived_no) {
            o.yes_price = (o.yes_price / sum).clamp(0.0, 1.0);
            if *derived {
                o.no_price = 1.0 - o.yes_price;
            }
        }
    }

    outcomes
}

/// Accept 0-1 or 0-100 input; reject NaN and negatives
fn to_unit(v: f64) -> Option<f64> {
    if !v.is_finite() || v < 0.0 {
        return None;
    }
    let unit = if v > 1.0 { v / 100.0 } else { v };
    Some(unit.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(label: &str, yes: Option<f64>, no: Option<f64>) -> RawOutcome {
        RawOutcome {
            label: label.to_string(),
            yes_price: yes,
            no_price: no,
            ..Default::default()
        }
    }

    #[test]
    fn test_binary_path_complements() {
        let out = normalize_outcomes(None, 65.0, 35.0, "m1");
        assert_eq!(out.len(), 2);
        assert!((out[0].yes_price - 0.65).abs() < 1e-9);
        assert!((out[0].no_price - 0.35).abs() < 1e-9);
        assert!((out[0].yes_price + out[0].no_price - 1.0).abs() < 1e-12);
        assert_eq!(out[1].label, "No");
        assert!((out[1].yes_price - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_single_outcome_uses_binary_path() {
        let single = vec![raw("Only", Some(0.9), None)];
        let out = normalize_outcomes(Some(&single), 40.0, 60.0, "m1");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "Yes");
        assert!((out[0].yes_price - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_percent_inputs_rescaled_to_one() {
        let input: Vec<RawOutcome> = ["A", "B", "C", "D"]
            .iter()
            .map(|l| raw(l, Some(20.0), None))
            .collect();
        let out = normalize_outcomes(Some(&input), 0.0, 0.0, "m1");
        for o in &out {
            assert!((o.yes_price - 0.25).abs() < 1e-9, "got {}", o.yes_price);
        }
        let sum: f64 = out.iter().map(|o| o.yes_price).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_formats_and_missing_values() {
        let input = vec![
            raw("A", Some(0.5), Some(0.5)),
            raw("B", Some(30.0), None),
            raw("C", None, None),
        ];
        let out = normalize_outcomes(Some(&input), 0.0, 0.0, "m1");
        for o in &out {
            assert!((0.0..=1.0).contains(&o.yes_price));
            assert!((0.0..=1.0).contains(&o.no_price));
            assert!(!o.yes_price.is_nan() && !o.no_price.is_nan());
        }
        let sum: f64 = out.iter().map(|o| o.yes_price).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_near_one_sums_are_tightened() {
        let input = vec![
            raw("A", Some(0.40), None),
            raw("B", Some(0.30), None),
            raw("C", Some(0.20), None),
        ];
        let out = normalize_outcomes(Some(&input), 0.0, 0.0, "m1");
        let sum: f64 = out.iter().map(|o| o.yes_price).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        // proportions are preserved
        assert!((out[0].yes_price / out[2].yes_price - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_supplied_no_price_survives_rescale() {
        let input = vec![
            raw("A", Some(60.0), Some(45.0)),
            raw("B", Some(30.0), None),
            raw("C", Some(30.0), Some(1.5)),
        ];
        let out = normalize_outcomes(Some(&input), 0.0, 0.0, "m1");
        assert!((out[0].yes_price - 0.5).abs() < 1e-9);
        assert!((out[0].no_price - 0.45).abs() < 1e-9);
        assert!((out[1].no_price - 0.75).abs() < 1e-9);
        assert!((out[2].no_price - 0.015).abs() < 1e-9);
    }

    #[test]
    fn test_garbage_values_fall_back() {
        let input = vec![
            raw("A", Some(f64::NAN), Some(f64::INFINITY)),
            raw("B", Some(-3.0), None),
            raw("", Some(250.0), None),
        ];
        let out = normalize_outcomes(Some(&input), f64::NAN, f64::NAN, "m1");
        assert_eq!(out[2].label, "Outcome 3");
        for o in &out {
            assert!((0.0..=1.0).contains(&o.yes_price));
            assert!((0.0..=1.0).contains(&o.no_price));
        }
    }

    #[test]
    fn test_nan_binary_defaults_to_even() {
        let out = normalize_outcomes(None, f64::NAN, f64::NAN, "m1");
        assert!((out[0].yes_price - 0.5).abs() < 1e-9);
    }
}
