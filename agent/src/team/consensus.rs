use crate::team::probability::{
    clamp_pct, population_std_dev, rescale_to_hundred, round1, sort_rankings, trimmed_mean,
};
use crate::types::{
    labels_match, Agreement, Confidence, Consensus, DisagreementMetrics, MarketOutcome,
    ModelAnalysis, OutcomeAnalysis, ProbabilityRange, Sentiment,
};
use tracing::{debug, info};

const HIGH_AGREEMENT_RANGE: f64 = 10.0;
const HIGH_AGREEMENT_STD_DEV: f64 = 5.0;
const LOW_AGREEMENT_RANGE: f64 = 25.0;
const LOW_AGREEMENT_STD_DEV: f64 = 12.0;
const DIVERGENCE_WARNING_RANGE: f64 = 20.0;
/// Edge, in points, past which the summary calls out the market gap
const NOTABLE_EDGE: f64 = 5.0;

pub const NO_MODELS_WARNING: &str = "No models responded; showing market prices only";

/// Combine every successful model into one judgment.
///
/// Probabilities come from a trimmed mean per outcome; the top pick comes from
/// an evidence-weighted vote and can differ from the highest-probability entry.
pub fn build_consensus(analyses: &[ModelAnalysis], outcomes: &[MarketOutcome]) -> Consensus {
    if analyses.is_empty() {
        return market_only(outcomes);
    }

    let mut rankings: Vec<OutcomeAnalysis> = outcomes
        .iter()
        .map(|market| consensus_outcome(analyses, market))
        .collect();
    if rescale_to_hundred(&mut rankings) {
        debug!("Rescaled consensus probabilities to 100");
    }
    sort_rankings(&mut rankings);

    let top_pick = resolve_top_pick(analyses, &rankings);
    let top = rankings.iter().find(|r| r.outcome_label == top_pick);
    let top_pick_probability = top.map(|r| r.ai_probability).unwrap_or(0.0);
    let top_market = top.map(|r| r.market_probability).unwrap_or(0.0);

    let estimates: Vec<f64> = analyses
        .iter()
        .filter_map(|a| a.probability_for(&top_pick))
        .collect();
    let disagreement = disagreement(&estimates, &top_pick);

    let evidence_density =
        round1(analyses.iter().map(|a| a.evidence_density).sum::<f64>() / analyses.len() as f64);

    let summary = summarize(
        analyses.len(),
        &top_pick,
        top_pick_probability,
        top_market,
        &disagreement,
    );

    info!(
        "Consensus: {top_pick} {top_pick_probability:.1}% from {} models ({:?} agreement)",
        analyses.len(),
        disagreement.model_agreement
    );

    Consensus {
        reasoning: lead_reasoning(analyses, &top_pick),
        top_pick,
        top_pick_probability,
        outcome_rankings: rankings,
        sentiment: weighted_sentiment(analyses),
        confidence: disagreement.model_agreement.into(),
        summary,
        evidence_density,
        disagreement,
    }
}

fn consensus_outcome(analyses: &[ModelAnalysis], market: &MarketOutcome) -> OutcomeAnalysis {
    let market_probability = round1(market.probability_pct());
    let estimates: Vec<f64> = analyses
        .iter()
        .filter_map(|a| a.probability_for(&market.label))
        .collect();
    let ai_probability = trimmed_mean(&estimates)
        .map(|m| round1(clamp_pct(m)))
        .unwrap_or(market_probability);

    // Reasoning from the best-evidenced model, data points pooled across all
    let lead = analyses
        .iter()
        .filter_map(|a| {
            let entry = a
                .outcome_rankings
                .iter()
                .find(|o| labels_match(&o.outcome_label, &market.label))?;
            Some((a.evidence_density, entry))
        })
        .max_by(|x, y| x.0.total_cmp(&y.0))
        .map(|(_, entry)| entry);

    let mut data_points: Vec<String> = Vec::new();
    for a in analyses {
        for o in a.outcome_rankings.iter().filter(|o| labels_match(&o.outcome_label, &market.label)) {
            for d in &o.data_points {
                if !data_points.contains(d) {
                    data_points.push(d.clone());
                }
            }
        }
    }

    OutcomeAnalysis {
        outcome_label: market.label.clone(),
        ai_probability,
        market_probability,
        edge: ai_probability - market_probability,
        reasoning: lead.map(|e| e.reasoning.clone()).unwrap_or_default(),
        data_points,
    }
}

/// Evidence-weighted vote over each model's declared top pick.
/// Ties go to the label ranked higher by consensus probability.
fn resolve_top_pick(analyses: &[ModelAnalysis], rankings: &[OutcomeAnalysis]) -> String {
    let Some(provisional) = rankings.first() else {
        return analyses.first().map(|a| a.top_pick.clone()).unwrap_or_default();
    };

    let votes: Vec<f64> = rankings
        .iter()
        .map(|r| {
            analyses
                .iter()
                .filter(|a| labels_match(&a.top_pick, &r.outcome_label))
                .map(|a| a.evidence_density)
                .sum()
        })
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (i, &weight) in votes.iter().enumerate() {
        if weight > 0.0 && best.map_or(true, |(_, w)| weight > w) {
            best = Some((i, weight));
        }
    }

    match best {
        Some((i, _)) => rankings[i].outcome_label.clone(),
        None => provisional.outcome_label.clone(),
    }
}

pub fn classify_agreement(range: f64, std_dev: f64) -> Agreement {
    if range <= HIGH_AGREEMENT_RANGE && std_dev <= HIGH_AGREEMENT_STD_DEV {
        Agreement::High
    } else if range >= LOW_AGREEMENT_RANGE || std_dev >= LOW_AGREEMENT_STD_DEV {
        Agreement::Low
    } else {
        Agreement::Medium
    }
}

/// Spread of the models' estimates for the resolved top pick
pub fn disagreement(estimates: &[f64], top_pick: &str) -> DisagreementMetrics {
    if estimates.is_empty() {
        return DisagreementMetrics {
            probability_range: ProbabilityRange { min: 0.0, max: 0.0 },
            standard_deviation: 0.0,
            model_agreement: Agreement::Low,
            divergence_warning: Some(format!("No model estimated {top_pick}")),
        };
    }

    let min = estimates.iter().copied().fold(f64::INFINITY, f64::min);
    let max = estimates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    let std_dev = population_std_dev(estimates);

    let divergence_warning = (range >= DIVERGENCE_WARNING_RANGE).then(|| {
        format!(
            "Models disagree significantly on {top_pick}: estimates span {min:.0}% to {max:.0}%"
        )
    });

    DisagreementMetrics {
        probability_range: ProbabilityRange {
            min: round1(min),
            max: round1(max),
        },
        standard_deviation: round1(std_dev),
        model_agreement: classify_agreement(range, std_dev),
        divergence_warning,
    }
}

/// Evidence-weighted sentiment vote; neutral wins ties
pub fn weighted_sentiment(analyses: &[ModelAnalysis]) -> Sentiment {
    let weight = |s: Sentiment| -> f64 {
        analyses
            .iter()
            .filter(|a| a.sentiment == s)
            .map(|a| a.evidence_density)
            .sum()
    };

    let bullish = weight(Sentiment::Bullish);
    let bearish = weight(Sentiment::Bearish);
    let neutral = weight(Sentiment::Neutral);

    if bullish > bearish && bullish > neutral {
        Sentiment::Bullish
    } else if bearish > bullish && bearish > neutral {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}

fn lead_reasoning(analyses: &[ModelAnalysis], top_pick: &str) -> String {
    let Some(lead) = analyses
        .iter()
        .max_by(|a, b| a.evidence_density.total_cmp(&b.evidence_density))
    else {
        return String::new();
    };
    lead.outcome_rankings
        .iter()
        .find(|o| labels_match(&o.outcome_label, top_pick))
        .map(|o| o.reasoning.clone())
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| lead.analysis.clone())
}

fn summarize(
    models: usize,
    top_pick: &str,
    probability: f64,
    market_probability: f64,
    disagreement: &DisagreementMetrics,
) -> String {
    let plural = if models == 1 { "model" } else { "models" };
    let mut summary = format!("{models} AI {plural} estimate {top_pick} at {probability:.1}%.");

    if let Some(warning) = &disagreement.divergence_warning {
        summary.push(' ');
        summary.push_str(warning);
    } else if disagreement.model_agreement == Agreement::High {
        summary.push_str(" Models show strong consensus.");
    }

    let edge = probability - market_probability;
    if edge > NOTABLE_EDGE {
        summary.push_str(" The models are more optimistic than the market on this outcome.");
    } else if edge < -NOTABLE_EDGE {
        summary.push_str(" The models are less optimistic than the market on this outcome.");
    }
    summary
}

/// Consensus when no model responded: market prices stand in for estimates
fn market_only(outcomes: &[MarketOutcome]) -> Consensus {
    let mut rankings: Vec<OutcomeAnalysis> = outcomes
        .iter()
        .map(|m| {
            let p = round1(m.probability_pct());
            OutcomeAnalysis {
                outcome_label: m.label.clone(),
                ai_probability: p,
                market_probability: p,
                edge: 0.0,
                reasoning: "Market price only; no model analysis available.".to_string(),
                data_points: Vec::new(),
            }
        })
        .collect();
    sort_rankings(&mut rankings);

    let (top_pick, top_pick_probability) = rankings
        .first()
        .map(|r| (r.outcome_label.clone(), r.ai_probability))
        .unwrap_or_default();

    Consensus {
        top_pick,
        top_pick_probability,
        outcome_rankings: rankings,
        sentiment: Sentiment::Neutral,
        confidence: Confidence::Low,
        summary: "No AI analysis could be generated for this market. Market prices are shown instead."
            .to_string(),
        reasoning: String::new(),
        evidence_density: 0.0,
        disagreement: DisagreementMetrics {
            probability_range: ProbabilityRange {
                min: top_pick_probability,
                max: top_pick_probability,
            },
            standard_deviation: 0.0,
            model_agreement: Agreement::Low,
            divergence_warning: Some(NO_MODELS_WARNING.to_string()),
        },
    }
}
