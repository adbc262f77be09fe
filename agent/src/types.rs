use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Inbound analysis request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(default)]
    pub market_title: Option<String>,
    #[serde(default)]
    pub market_id: String,
    #[serde(default)]
    pub yes_percentage: f64,
    #[serde(default)]
    pub no_percentage: f64,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub outcomes: Option<Vec<RawOutcome>>,
}

/// Caller-supplied outcome, prices in either 0-1 or 0-100 form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOutcome {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub yes_price: Option<f64>,
    #[serde(default)]
    pub implied_probability: Option<f64>,
    #[serde(default)]
    pub no_price: Option<f64>,
    #[serde(default)]
    pub market_id: Option<String>,
}

/// Outcome labels compare case-insensitively, ignoring surrounding whitespace
pub fn labels_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// One tradable outcome, prices in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOutcome {
    pub label: String,
    pub yes_price: f64,
    pub no_price: f64,
    pub market_id: String,
}

impl MarketOutcome {
    /// Market-implied probability on the 0-100 scale
    pub fn probability_pct(&self) -> f64 {
        (self.yes_price * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Crypto,
    Politics,
    Sports,
    Finance,
    Technology,
    General,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Crypto => write!(f, "crypto"),
            Category::Politics => write!(f, "politics"),
            Category::Sports => write!(f, "sports"),
            Category::Finance => write!(f, "finance"),
            Category::Technology => write!(f, "technology"),
            Category::General => write!(f, "general"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bullish" => Some(Sentiment::Bullish),
            "bearish" => Some(Sentiment::Bearish),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Bullish => write!(f, "bullish"),
            Sentiment::Bearish => write!(f, "bearish"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// One outcome entry inside a model's structured judgment
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutcome {
    pub label: String,
    pub probability: f64,
    pub reasoning: String,
    pub data_points: Vec<String>,
}

/// A model's raw structured judgment after label validation
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredAnalysis {
    pub summary: String,
    pub outcomes: Vec<StructuredOutcome>,
    pub top_pick: String,
    pub sentiment: Sentiment,
    pub confidence: Confidence,
    pub assumptions: Vec<String>,
    pub key_risks: Vec<String>,
}

/// Single outcome after reconciliation with market data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeAnalysis {
    pub outcome_label: String,
    pub ai_probability: f64,
    pub market_probability: f64,
    pub edge: f64,
    pub reasoning: String,
    pub data_points: Vec<String>,
}

/// One model's full contribution to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnalysis {
    pub model: String,
    pub model_id: String,
    pub provider: String,
    pub analysis: String,
    pub outcome_rankings: Vec<OutcomeAnalysis>,
    pub top_pick: String,
    pub top_pick_probability: f64,
    pub sentiment: Sentiment,
    pub confidence: Confidence,
    pub evidence_density: f64,
    pub data_points_cited: usize,
    pub assumptions: Vec<String>,
    pub key_risks: Vec<String>,
    pub used_fallback: bool,
}

impl ModelAnalysis {
    /// This model's AI probability for a label, case-insensitive
    pub fn probability_for(&self, label: &str) -> Option<f64> {
        self.outcome_rankings
            .iter()
            .find(|o| labels_match(&o.outcome_label, label))
            .map(|o| o.ai_probability)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agreement {
    High,
    Medium,
    Low,
}

impl From<Agreement> for Confidence {
    fn from(a: Agreement) -> Self {
        match a {
            Agreement::High => Confidence::High,
            Agreement::Medium => Confidence::Medium,
            Agreement::Low => Confidence::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisagreementMetrics {
    pub probability_range: ProbabilityRange,
    pub standard_deviation: f64,
    pub model_agreement: Agreement,
    pub divergence_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consensus {
    pub top_pick: String,
    pub top_pick_probability: f64,
    pub outcome_rankings: Vec<OutcomeAnalysis>,
    pub sentiment: Sentiment,
    pub confidence: Confidence,
    pub summary: String,
    pub reasoning: String,
    pub evidence_density: f64,
    pub disagreement: DisagreementMetrics,
}

/// Single OHLC candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Live price enrichment for a detected crypto symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoData {
    pub symbol: String,
    pub price: f64,
    pub change_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candles: Vec<Candle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub request_id: String,
    pub models_used: usize,
    pub models: Vec<String>,
    pub failed_models: Vec<String>,
    pub timestamp: String,
    pub category: Category,
    pub is_multi_outcome: bool,
}

/// Top-level response of one analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedResponse {
    pub consensus: Consensus,
    pub model_analyses: Vec<ModelAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_data: Option<CryptoData>,
    pub model_accuracy: HashMap<String, serde_json::Value>,
    pub metadata: ResponseMetadata,
}
