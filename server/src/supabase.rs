use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use market_analysis::types::{ConsolidatedResponse, Confidence, Sentiment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ServerConfig;

/// One `ai_predictions` row: a single model's call on a single market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub market_id: String,
    pub model_name: String,
    pub sentiment: Sentiment,
    pub ai_probability: f64,
    pub market_probability: f64,
    pub confidence: Confidence,
    pub evidence_density: f64,
    pub data_points_cited: usize,
}

impl PredictionRow {
    /// Rows for every model that contributed to `response`, keyed to each model's top pick.
    pub fn from_response(market_id: &str, response: &ConsolidatedResponse) -> Vec<Self> {
        response
            .model_analyses
            .iter()
            .map(|m| {
                let market_probability = m
                    .outcome_rankings
                    .iter()
                    .find(|o| o.outcome_label == m.top_pick)
                    .map(|o| o.market_probability)
                    .unwrap_or(0.0);
                Self {
                    market_id: market_id.to_string(),
                    model_name: m.model.clone(),
                    sentiment: m.sentiment,
                    ai_probability: m.top_pick_probability,
                    market_probability,
                    confidence: m.confidence,
                    evidence_density: m.evidence_density,
                    data_points_cited: m.data_points_cited,
                }
            })
            .collect()
    }
}

/// Durable side of the analysis endpoint: prediction log plus accuracy stats.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Append one row per model. Callers treat failure as non-fatal.
    async fn record_predictions(&self, rows: &[PredictionRow]) -> Result<()>;

    /// Historical accuracy stats keyed by model name, passed through untouched.
    async fn model_accuracy(&self) -> Result<HashMap<String, Value>>;
}

/// Supabase REST API client using the service role key.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &ServerConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_service_key.clone(),
        }
    }

    /// Build the REST URL for a given table.
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Common headers for Supabase REST calls.
    fn auth_headers(&self) -> Vec<(&str, String)> {
        vec![
            ("apikey", self.api_key.clone()),
            ("Authorization", format!("Bearer {}", self.api_key)),
        ]
    }
}

#[async_trait]
impl PredictionStore for SupabaseClient {
    async fn record_predictions(&self, rows: &[PredictionRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut req = self
            .http
            .post(self.table_url("ai_predictions"))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal");
        for (key, val) in self.auth_headers() {
            req = req.header(key, val);
        }

        let resp = req
            .json(rows)
            .send()
            .await
            .context("Supabase insert ai_predictions request")?;
        let status = resp.status();

        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Supabase insert ai_predictions failed ({}): {}", status, err_text);
        }

        info!(
            "Stored {} predictions for market {}",
            rows.len(),
            rows.first().map(|r| r.market_id.as_str()).unwrap_or("?")
        );
        Ok(())
    }

    async fn model_accuracy(&self) -> Result<HashMap<String, Value>> {
        let url = format!("{}?select=*", self.table_url("model_accuracy"));

        let mut req = self.http.get(&url);
        for (key, val) in self.auth_headers() {
            req = req.header(key, val);
        }

        let resp = req.send().await.context("Supabase model_accuracy request")?;
        let status = resp.status();

        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Supabase model_accuracy failed ({}): {}", status, err_text);
        }

        let rows: Vec<Value> = resp.json().await.context("Parse model_accuracy response")?;
        let stats = accuracy_by_model(rows);
        debug!("Loaded accuracy stats for {} models", stats.len());
        Ok(stats)
    }
}

/// Key accuracy rows by `model_name`; rows without one are skipped.
pub fn accuracy_by_model(rows: Vec<Value>) -> HashMap<String, Value> {
    rows.into_iter()
        .filter_map(|row| {
            let name = row.get("model_name")?.as_str()?.to_string();
            Some((name, row))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accuracy_keyed_by_model_name() {
        let rows = vec![
            json!({"model_name": "Gemini 2.5 Pro", "accuracy": 0.61, "total_predictions": 120}),
            json!({"model_name": "GPT-5 Mini", "accuracy": 0.58}),
            json!({"accuracy": 0.9}),
        ];
        let map = accuracy_by_model(rows);
        assert_eq!(map.len(), 2);
        assert_eq!(map["Gemini 2.5 Pro"]["total_predictions"], 120);
    }

    #[test]
    fn test_prediction_row_serializes_snake_case() {
        let row = PredictionRow {
            market_id: "m-1".into(),
            model_name: "GPT-5 Mini".into(),
            sentiment: Sentiment::Bullish,
            ai_probability: 70.0,
            market_probability: 65.0,
            confidence: Confidence::Medium,
            evidence_density: 64.0,
            data_points_cited: 3,
        };
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["model_name"], "GPT-5 Mini");
        assert_eq!(v["sentiment"], "bullish");
        assert_eq!(v["confidence"], "medium");
        assert_eq!(v["data_points_cited"], 3);
    }
}
