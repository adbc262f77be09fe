use crate::config::EvidenceWeights;
use crate::types::Confidence;

/// Inputs to the evidence-density score for one model's output
#[derive(Debug, Clone, Copy)]
pub struct EvidenceInput {
    pub data_points: usize,
    pub assumptions: usize,
    pub risks: usize,
    /// Highest AI probability across the model's outcomes, 0-100
    pub top_probability: f64,
    pub confidence: Confidence,
    pub used_fallback: bool,
}

/// Score how well a model backs its numbers, 0-100.
///
/// Rewards cited data, disclosed assumptions and named risks; penalizes
/// high probabilities without supporting data, extreme probabilities, and
/// self-reported low confidence paired with a confident number.
pub fn evidence_density(input: &EvidenceInput, w: &EvidenceWeights) -> f64 {
    let mut score = w.base;

    score += (input.data_points.min(w.max_data_points) as f64 * w.per_data_point).min(w.data_point_cap);
    score += input.assumptions.min(w.max_assumptions) as f64 * w.per_assumption;
    score += input.risks.min(w.max_risks) as f64 * w.per_risk;

    if input.top_probability > w.overconfidence_probability
        && input.data_points < w.overconfidence_min_data_points
        && input.confidence != Confidence::Low
    {
        score -= w.overconfidence_penalty;
    }
    if input.top_probability > w.extreme_probability {
        score -= w.extreme_penalty;
    }
    if input.confidence == Confidence::Low
        && input.top_probability > w.inconsistent_low_confidence_probability
    {
        score -= w.inconsistent_confidence_penalty;
    }

    score = score.clamp(0.0, 100.0);
    if input.used_fallback {
        score = (score - w.fallback_penalty).clamp(0.0, 100.0);
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(data_points: usize, top: f64, confidence: Confidence) -> EvidenceInput {
        EvidenceInput {
            data_points,
            assumptions: 0,
            risks: 0,
            top_probability: top,
            confidence,
            used_fallback: false,
        }
    }

    #[test]
    fn test_baseline() {
        let w = EvidenceWeights::default();
        assert_eq!(evidence_density(&input(0, 60.0, Confidence::Medium), &w), 50.0);
    }

    #[test]
    fn test_rewards_are_capped() {
        let w = EvidenceWeights::default();
        let i = EvidenceInput {
            data_points: 20,
            assumptions: 10,
            risks: 10,
            top_probability: 60.0,
            confidence: Confidence::High,
            used_fallback: false,
        };
        // 50 + 24 + 12 + 8
        assert_eq!(evidence_density(&i, &w), 94.0);
    }

    #[test]
    fn test_always_within_bounds() {
        let w = EvidenceWeights::default();
        let extreme = EvidenceInput {
            data_points: 20,
            assumptions: 10,
            risks: 10,
            top_probability: 100.0,
            confidence: Confidence::High,
            used_fallback: false,
        };
        let s = evidence_density(&extreme, &w);
        assert!((0.0..=100.0).contains(&s));
        assert_eq!(s, 84.0);

        let harsh = EvidenceWeights {
            base: 5.0,
            fallback_penalty: 50.0,
            ..EvidenceWeights::default()
        };
        let worst = EvidenceInput {
            used_fallback: true,
            ..input(0, 100.0, Confidence::High)
        };
        assert_eq!(evidence_density(&worst, &harsh), 0.0);

        let generous = EvidenceWeights {
            base: 99.0,
            ..EvidenceWeights::default()
        };
        assert_eq!(evidence_density(&extreme, &generous), 100.0);
    }

    #[test]
    fn test_overconfidence_penalty() {
        let w = EvidenceWeights::default();
        // 86% with 2 data points: 50 + 6 - 15
        assert_eq!(evidence_density(&input(2, 86.0, Confidence::High), &w), 41.0);
        // Enough data points: no penalty
        assert_eq!(evidence_density(&input(3, 86.0, Confidence::High), &w), 59.0);
        // Self-reported low confidence skips the overconfidence rule but hits the inconsistency rule
        assert_eq!(evidence_density(&input(2, 86.0, Confidence::Low), &w), 48.0);
    }

    #[test]
    fn test_extreme_and_inconsistency_stack() {
        let w = EvidenceWeights::default();
        // 95% with no data, high confidence: 50 - 15 - 10
        assert_eq!(evidence_density(&input(0, 95.0, Confidence::High), &w), 25.0);
        // 75% with low confidence: 50 - 8
        assert_eq!(evidence_density(&input(0, 75.0, Confidence::Low), &w), 42.0);
    }

    #[test]
    fn test_fallback_penalty() {
        let w = EvidenceWeights::default();
        let i = EvidenceInput {
            used_fallback: true,
            ..input(0, 60.0, Confidence::Medium)
        };
        assert_eq!(evidence_density(&i, &w), 45.0);
    }
}
