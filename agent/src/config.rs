use anyhow::{Context, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// One configured analyst model and its ordered substitutes
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub fallbacks: Vec<String>,
}

/// Product-tuned evidence-density constants. Defaults match the scoring
/// rules; every field can be overridden from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceWeights {
    pub base: f64,
    pub per_data_point: f64,
    pub max_data_points: usize,
    pub data_point_cap: f64,
    pub per_assumption: f64,
    pub max_assumptions: usize,
    pub per_risk: f64,
    pub max_risks: usize,
    pub overconfidence_probability: f64,
    pub overconfidence_min_data_points: usize,
    pub overconfidence_penalty: f64,
    pub extreme_probability: f64,
    pub extreme_penalty: f64,
    pub inconsistent_low_confidence_probability: f64,
    pub inconsistent_confidence_penalty: f64,
    pub fallback_penalty: f64,
}

impl Default for EvidenceWeights {
    fn default() -> Self {
        Self {
            base: 50.0,
            per_data_point: 3.0,
            max_data_points: 8,
            data_point_cap: 25.0,
            per_assumption: 3.0,
            max_assumptions: 4,
            per_risk: 2.0,
            max_risks: 4,
            overconfidence_probability: 85.0,
            overconfidence_min_data_points: 3,
            overconfidence_penalty: 15.0,
            extreme_probability: 90.0,
            extreme_penalty: 10.0,
            inconsistent_low_confidence_probability: 70.0,
            inconsistent_confidence_penalty: 8.0,
            fallback_penalty: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub gateway_url: String,
    pub gateway_api_key: String,
    pub models: Vec<ModelSpec>,
    pub request_timeout_secs: u64,
    pub model_chain_timeout_secs: u64,
    pub market_data_url: String,
    pub enrichment_timeout_secs: u64,
    pub candle_interval: String,
    pub candle_limit: u32,
    pub evidence: EvidenceWeights,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gateway_url: "https://ai.gateway.lovable.dev/v1/chat/completions".to_string(),
            gateway_api_key: String::new(),
            models: default_models(),
            request_timeout_secs: 60,
            model_chain_timeout_secs: 120,
            market_data_url: "https://api.binance.com".to_string(),
            enrichment_timeout_secs: 5,
            candle_interval: "1h".to_string(),
            candle_limit: 24,
            evidence: EvidenceWeights::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load config from a specific .env file, or the default `.env` if None.
    pub fn from_env_file(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => {
                dotenvy::from_filename(p).ok();
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::build_from_env()
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::build_from_env()
    }

    fn build_from_env() -> Result<Self> {
        let defaults = Self::default();
        let d = &defaults.evidence;

        let mut models = match std::env::var("LLM_MODELS") {
            Ok(v) if !v.trim().is_empty() => parse_models(&v)?,
            _ => defaults.models.clone(),
        };
        if let Ok(v) = std::env::var("LLM_FALLBACKS") {
            apply_fallbacks(&mut models, &parse_fallbacks(&v)?);
        }

        Ok(Self {
            gateway_url: env("LLM_GATEWAY_URL", &defaults.gateway_url),
            gateway_api_key: env("LLM_GATEWAY_API_KEY", ""),
            models,
            request_timeout_secs: env_parse("LLM_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            model_chain_timeout_secs: env_parse("MODEL_CHAIN_TIMEOUT_SECS", defaults.model_chain_timeout_secs)?,
            market_data_url: env("MARKET_DATA_URL", &defaults.market_data_url),
            enrichment_timeout_secs: env_parse("ENRICHMENT_TIMEOUT_SECS", defaults.enrichment_timeout_secs)?,
            candle_interval: env("CANDLE_INTERVAL", &defaults.candle_interval),
            candle_limit: env_parse("CANDLE_LIMIT", defaults.candle_limit)?,
            evidence: EvidenceWeights {
                base: env_parse("EVIDENCE_BASE", d.base)?,
                overconfidence_probability: env_parse("OVERCONFIDENCE_PROBABILITY", d.overconfidence_probability)?,
                overconfidence_min_data_points: env_parse(
                    "OVERCONFIDENCE_MIN_DATA_POINTS",
                    d.overconfidence_min_data_points,
                )?,
                overconfidence_penalty: env_parse("OVERCONFIDENCE_PENALTY", d.overconfidence_penalty)?,
                extreme_probability: env_parse("EXTREME_PROBABILITY", d.extreme_probability)?,
                extreme_penalty: env_parse("EXTREME_PENALTY", d.extreme_penalty)?,
                inconsistent_low_confidence_probability: env_parse(
                    "INCONSISTENT_LOW_CONFIDENCE_PROBABILITY",
                    d.inconsistent_low_confidence_probability,
                )?,
                inconsistent_confidence_penalty: env_parse(
                    "INCONSISTENT_CONFIDENCE_PENALTY",
                    d.inconsistent_confidence_penalty,
                )?,
                fallback_penalty: env_parse("FALLBACK_PENALTY", d.fallback_penalty)?,
                ..d.clone()
            },
        })
    }
}

pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec {
            id: "google/gemini-2.5-pro".to_string(),
            display_name: "Gemini 2.5 Pro".to_string(),
            provider: "Google".to_string(),
            fallbacks: vec!["google/gemini-2.5-flash".to_string()],
        },
        ModelSpec {
            id: "openai/gpt-5-mini".to_string(),
            display_name: "GPT-5 Mini".to_string(),
            provider: "OpenAI".to_string(),
            fallbacks: vec![
                "openai/gpt-5-nano".to_string(),
                "google/gemini-2.5-flash".to_string(),
            ],
        },
        ModelSpec {
            id: "google/gemini-2.5-flash".to_string(),
            display_name: "Gemini 2.5 Flash".to_string(),
            provider: "Google".to_string(),
            fallbacks: vec!["google/gemini-2.5-flash-lite".to_string()],
        },
    ]
}

/// Parse `id=Display Name@provider,id2=...`. Display name and provider are optional.
fn parse_models(s: &str) -> Result<Vec<ModelSpec>> {
    let mut models = Vec::new();
    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, rest) = match entry.split_once('=') {
            Some((id, rest)) => (id.trim(), Some(rest.trim())),
            None => (entry, None),
        };
        if id.is_empty() {
            anyhow::bail!("Invalid LLM_MODELS entry: {entry}");
        }
        let (display_name, provider) = match rest.and_then(|r| r.split_once('@')) {
            Some((name, provider)) => (name.trim().to_string(), provider.trim().to_string()),
            None => (
                rest.map(str::to_string).unwrap_or_else(|| id.to_string()),
                id.split('/').next().unwrap_or(id).to_string(),
            ),
        };
        models.push(ModelSpec {
            id: id.to_string(),
            display_name,
            provider,
            fallbacks: Vec::new(),
        });
    }
    if models.is_empty() {
        anyhow::bail!("LLM_MODELS is set but lists no models");
    }
    Ok(models)
}

/// Parse `primary=alt1|alt2;primary2=alt3`
fn parse_fallbacks(s: &str) -> Result<HashMap<String, Vec<String>>> {
    let mut map = HashMap::new();
    for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (primary, alts) = entry
            .split_once('=')
            .with_context(|| format!("Invalid LLM_FALLBACKS entry: {entry}"))?;
        let alts = alts
            .split('|')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        map.insert(primary.trim().to_string(), alts);
    }
    Ok(map)
}

fn apply_fallbacks(models: &mut [ModelSpec], chains: &HashMap<String, Vec<String>>) {
    for m in models.iter_mut() {
        if let Some(chain) = chains.get(&m.id) {
            m.fallbacks = chain.clone();
        }
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + ToString,
{
    let val = env(key, &default.to_string());
    val.trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid value for {key}: {val}"))
}
