use crate::analyzer::gateway::{truncate, ChatCompletion, ChatMessage, ChatRequest};
use crate::config::{EvidenceWeights, ModelSpec};
use crate::error::AnalystError;
use crate::prompt::ANALYST_SYSTEM;
use crate::team::evidence::{evidence_density, EvidenceInput};
use crate::team::lenient;
use crate::team::probability::{clamp_pct, rescale_to_hundred, round1, sort_rankings};
use crate::types::{
    labels_match, Confidence, MarketOutcome, ModelAnalysis, OutcomeAnalysis, Sentiment,
    StructuredAnalysis, StructuredOutcome,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const TOOL_NAME: &str = "submit_analysis";

/// Summed probability may drift this far from 100 before a warning is logged
const MASS_WARN_TOLERANCE: f64 = 15.0;

/// Tool-call arguments as the model sends them
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolArgs {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub outcomes: Vec<ToolOutcome>,
    #[serde(default)]
    pub top_pick: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub key_risks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolOutcome {
    pub label: String,
    pub probability: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub data_points: Vec<String>,
}

/// Result of one model's attempt chain
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// A schema-valid tool call from the primary or a substitute model
    Success {
        analysis: StructuredAnalysis,
        model_id: String,
        used_fallback: bool,
    },
    /// Recovered from free text; always low confidence
    Degraded {
        analysis: StructuredAnalysis,
        model_id: String,
        used_fallback: bool,
        reason: String,
    },
    Failure { reason: String },
}

/// Position in a model's attempt chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Primary,
    Fallback(usize),
    Lenient,
}

impl Stage {
    fn next(self, fallbacks: usize) -> Stage {
        match self {
            Stage::Primary if fallbacks > 0 => Stage::Fallback(0),
            Stage::Fallback(i) if i + 1 < fallbacks => Stage::Fallback(i + 1),
            _ => Stage::Lenient,
        }
    }
}

/// JSON schema for the single function every model must call
pub fn submit_analysis_tool(labels: &[String]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Submit a structured probability analysis for every outcome of this market",
            "parameters": {
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "2-4 sentence analysis summary"
                    },
                    "outcomes": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "label": { "type": "string", "enum": labels },
                                "probability": { "type": "number", "minimum": 0, "maximum": 100 },
                                "reasoning": { "type": "string" },
                                "dataPoints": {
                                    "type": "array",
                                    "items": { "type": "string" },
                                    "description": "Verifiable facts with figures and dates"
                                }
                            },
                            "required": ["label", "probability", "reasoning", "dataPoints"]
                        }
                    },
                    "topPick": { "type": "string", "enum": labels },
                    "sentiment": { "type": "string", "enum": ["bullish", "bearish", "neutral"] },
                    "confidence": { "type": "string", "enum": ["high", "medium", "low"] },
                    "assumptions": { "type": "array", "items": { "type": "string" } },
                    "keyRisks": { "type": "array", "items": { "type": "string" } }
                },
                "required": [
                    "summary", "outcomes", "topPick", "sentiment",
                    "confidence", "assumptions", "keyRisks"
                ]
            }
        }
    })
}

pub fn build_request(model: &str, prompt: &str, labels: &[String]) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(ANALYST_SYSTEM), ChatMessage::user(prompt)],
        tools: vec![submit_analysis_tool(labels)],
        tool_choice: json!({ "type": "function", "function": { "name": TOOL_NAME } }),
    }
}

/// Check tool arguments against the valid labels.
///
/// Hard failures: unknown topPick, probability outside [0, 100], no usable
/// outcome entries. Unknown outcome labels are dropped with a warning.
pub(crate) fn validate(
    args: ToolArgs,
    labels: &[String],
    model: &str,
) -> Result<StructuredAnalysis, AnalystError> {
    let malformed = |reason: String| AnalystError::Malformed {
        model: model.to_string(),
        reason,
    };

    let top_pick = labels
        .iter()
        .find(|l| labels_match(l, &args.top_pick))
        .cloned()
        .ok_or_else(|| malformed(format!("topPick {:?} is not a valid outcome", args.top_pick)))?;

    let mut outcomes: Vec<StructuredOutcome> = Vec::with_capacity(args.outcomes.len());
    for o in args.outcomes {
        if !o.probability.is_finite() || !(0.0..=100.0).contains(&o.probability) {
            return Err(malformed(format!(
                "probability {} for {:?} outside [0, 100]",
                o.probability, o.label
            )));
        }
        let Some(label) = labels.iter().find(|l| labels_match(l, &o.label)) else {
            warn!("{model}: dropping unknown outcome label {:?}", o.label);
            continue;
        };
        if outcomes.iter().any(|existing| existing.label == *label) {
            warn!("{model}: duplicate outcome {:?}, keeping the first", label);
            continue;
        }
        outcomes.push(StructuredOutcome {
            label: label.clone(),
            probability: o.probability,
            reasoning: o.reasoning,
            data_points: o.data_points.into_iter().filter(|d| !d.trim().is_empty()).collect(),
        });
    }

    if outcomes.is_empty() {
        return Err(malformed("no outcome matched a valid label".to_string()));
    }

    if labels.len() > 2 {
        let mass: f64 = outcomes.iter().map(|o| o.probability).sum();
        if (mass - 100.0).abs() > MASS_WARN_TOLERANCE {
            warn!("{model}: outcome probabilities sum to {mass:.1}, expected ~100");
        }
    }

    let sentiment = Sentiment::parse(&args.sentiment).unwrap_or_else(|| {
        warn!("{model}: unknown sentiment {:?}, using neutral", args.sentiment);
        Sentiment::Neutral
    });
    let confidence = Confidence::parse(&args.confidence).unwrap_or_else(|| {
        warn!("{model}: unknown confidence {:?}, using low", args.confidence);
        Confidence::Low
    });

    Ok(StructuredAnalysis {
        summary: args.summary,
        outcomes,
        top_pick,
        sentiment,
        confidence,
        assumptions: args.assumptions,
        key_risks: args.key_risks,
    })
}

/// One structured call against one model id
async fn attempt_structured(
    gateway: &dyn ChatCompletion,
    model_id: &str,
    prompt: &str,
    labels: &[String],
) -> Result<StructuredAnalysis, AnalystError> {
    let request = build_request(model_id, prompt, labels);
    let reply = gateway
        .complete(&request)
        .await
        .map_err(|e| AnalystError::Unavailable {
            model: model_id.to_string(),
            reason: format!("{e:#}"),
        })?;

    let Some(arguments) = reply.tool_arguments else {
        return Err(AnalystError::NoToolCall {
            model: model_id.to_string(),
            text: reply.content,
        });
    };

    let args: ToolArgs = serde_json::from_str(&arguments).map_err(|e| AnalystError::Malformed {
        model: model_id.to_string(),
        reason: format!("tool arguments: {e} | {}", truncate(&arguments, 200)),
    })?;

    validate(args, labels, model_id)
}

/// Run a model's full attempt chain: primary, each substitute in order,
/// then a lenient parse of the first free-text reply seen.
pub async fn analyze_model(
    gateway: &dyn ChatCompletion,
    spec: &ModelSpec,
    prompt: &str,
    labels: &[String],
) -> AttemptOutcome {
    let mut stage = Stage::Primary;
    let mut free_text: Option<(String, bool, String)> = None;
    let mut failures: Vec<String> = Vec::new();

    loop {
        let (model_id, used_fallback) = match stage {
            Stage::Primary => (spec.id.as_str(), false),
            Stage::Fallback(i) => (spec.fallbacks[i].as_str(), true),
            Stage::Lenient => break,
        };

        match attempt_structured(gateway, model_id, prompt, labels).await {
            Ok(analysis) => {
                if used_fallback {
                    info!("{}: substitute {model_id} succeeded", spec.display_name);
                }
                return AttemptOutcome::Success {
                    analysis,
                    model_id: model_id.to_string(),
                    used_fallback,
                };
            }
            Err(AnalystError::NoToolCall { model, text }) => {
                warn!("{}: {model} returned no tool call", spec.display_name);
                if let Some(text) = text {
                    free_text.get_or_insert((model.clone(), used_fallback, text));
                }
                failures.push(format!("{model}: no tool call"));
            }
            Err(e) => {
                warn!("{}: {e}", spec.display_name);
                failures.push(e.to_string());
            }
        }

        stage = stage.next(spec.fallbacks.len());
    }

    if let Some((model_id, used_fallback, text)) = free_text {
        if let Some(analysis) = lenient::parse_free_text(&text, labels, &model_id) {
            warn!("{}: using lenient parse of {model_id} free text", spec.display_name);
            return AttemptOutcome::Degraded {
                analysis,
                model_id,
                used_fallback,
                reason: failures.join("; "),
            };
        }
        failures.push(format!("{model_id}: free text unparseable"));
    }

    AttemptOutcome::Failure {
        reason: failures.join("; "),
    }
}

/// Reconcile a structured judgment with market prices into ranked outcomes.
///
/// Outcomes the model skipped take the market's own probability. Multi-outcome
/// sets are rescaled to 100 when they drift.
pub fn reconcile(analysis: &StructuredAnalysis, outcomes: &[MarketOutcome], model: &str) -> Vec<OutcomeAnalysis> {
    let mut rankings: Vec<OutcomeAnalysis> = outcomes
        .iter()
        .map(|market| {
            let market_probability = round1(market.probability_pct());
            match analysis.outcomes.iter().find(|o| labels_match(&o.label, &market.label)) {
                Some(entry) => {
                    let ai = clamp_pct(entry.probability);
                    OutcomeAnalysis {
                        outcome_label: market.label.clone(),
                        ai_probability: ai,
                        market_probability,
                        edge: ai - market_probability,
                        reasoning: entry.reasoning.clone(),
                        data_points: entry.data_points.clone(),
                    }
                }
                None => {
                    warn!("{model}: no estimate for {:?}, using market probability", market.label);
                    OutcomeAnalysis {
                        outcome_label: market.label.clone(),
                        ai_probability: market_probability,
                        market_probability,
                        edge: 0.0,
                        reasoning: "No model estimate; market probability shown.".to_string(),
                        data_points: Vec::new(),
                    }
                }
            }
        })
        .collect();

    if rescale_to_hundred(&mut rankings) {
        info!("{model}: rescaled outcome probabilities to 100");
    }
    sort_rankings(&mut rankings);
    rankings
}

/// Build the final per-model record from a successful or degraded attempt
pub fn build_model_analysis(
    spec: &ModelSpec,
    model_id: &str,
    analysis: &StructuredAnalysis,
    outcomes: &[MarketOutcome],
    used_fallback: bool,
    weights: &EvidenceWeights,
) -> ModelAnalysis {
    let rankings = reconcile(analysis, outcomes, model_id);

    let data_points_cited: usize = rankings.iter().map(|r| r.data_points.len()).sum();
    let top_probability = rankings.first().map(|r| r.ai_probability).unwrap_or(0.0);
    let top_pick_probability = rankings
        .iter()
        .find(|r| labels_match(&r.outcome_label, &analysis.top_pick))
        .map(|r| r.ai_probability)
        .unwrap_or(0.0);

    let evidence = evidence_density(
        &EvidenceInput {
            data_points: data_points_cited,
            assumptions: analysis.assumptions.len(),
            risks: analysis.key_risks.len(),
            top_probability,
            confidence: analysis.confidence,
            used_fallback,
        },
        weights,
    );

    let model = if used_fallback {
        format!("{} (Fallback)", spec.display_name)
    } else {
        spec.display_name.clone()
    };

    ModelAnalysis {
        model,
        model_id: model_id.to_string(),
        provider: spec.provider.clone(),
        analysis: analysis.summary.clone(),
        outcome_rankings: rankings,
        top_pick: analysis.top_pick.clone(),
        top_pick_probability,
        sentiment: analysis.sentiment,
        confidence: analysis.confidence,
        evidence_density: round1(evidence),
        data_points_cited,
        assumptions: analysis.assumptions.clone(),
        key_risks: analysis.key_risks.clone(),
        used_fallback,
    }
}
