pub mod analyst;
pub mod consensus;
pub mod evidence;
pub mod lenient;
pub mod probability;

use crate::analyzer::gateway::truncate;
use crate::analyzer::{ChatCompletion, GatewayClient};
use crate::category::{detect_category, detect_crypto_symbol};
use crate::config::{AnalysisConfig, ModelSpec};
use crate::data::{CryptoDataClient, MarketDataSource};
use crate::error::{AnalystError, PipelineError};
use crate::normalizer::normalize_outcomes;
use crate::prompt::{build_prompt, PromptContext};
use crate::types::{
    AnalysisRequest, ConsolidatedResponse, MarketOutcome, ModelAnalysis, ResponseMetadata,
};
use analyst::{analyze_model, build_model_analysis, AttemptOutcome};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

/// One request through detection, enrichment, fan-out and consensus
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    gateway: Arc<dyn ChatCompletion>,
    market_data: Arc<dyn MarketDataSource>,
}

impl AnalysisPipeline {
    pub fn new(
        config: AnalysisConfig,
        gateway: Arc<dyn ChatCompletion>,
        market_data: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self {
            config,
            gateway,
            market_data,
        }
    }

    /// Wire the real gateway and market-data clients from config
    pub fn from_config(config: AnalysisConfig) -> Self {
        let gateway = GatewayClient::new(
            &config.gateway_url,
            &config.gateway_api_key,
            config.request_timeout_secs,
        );
        if !gateway.is_configured() {
            warn!("LLM_GATEWAY_API_KEY is not set; every model call will fail");
        }
        let market_data = CryptoDataClient::new(
            &config.market_data_url,
            config.enrichment_timeout_secs,
            &config.candle_interval,
            config.candle_limit,
        );
        Self::new(config, Arc::new(gateway), Arc::new(market_data))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one market. Fails only on a missing title or when no model
    /// produced anything usable; every other failure degrades in place.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<ConsolidatedResponse, PipelineError> {
        let title = request
            .market_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(PipelineError::MissingTitle)?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("analysis", request_id = %request_id, market_id = %request.market_id);
        self.run(title, request, request_id).instrument(span).await
    }

    async fn run(
        &self,
        title: &str,
        request: &AnalysisRequest,
        request_id: String,
    ) -> Result<ConsolidatedResponse, PipelineError> {
        let category = detect_category(title);
        let symbol = detect_crypto_symbol(title);
        let outcomes = normalize_outcomes(
            request.outcomes.as_deref(),
            request.yes_percentage,
            request.no_percentage,
            &request.market_id,
        );
        let is_multi_outcome = outcomes.len() > 2;
        info!(
            "Analyzing \"{}\" ({category}, {} outcomes{})",
            truncate(title, 80),
            outcomes.len(),
            symbol.map(|s| format!(", symbol {s}")).unwrap_or_default()
        );

        let crypto_data = match symbol {
            Some(sym) => {
                let data = self.market_data.crypto_data(sym).await;
                if data.is_none() {
                    warn!("No price data for {sym}; continuing without enrichment");
                }
                data
            }
            None => None,
        };

        let prompt = build_prompt(&PromptContext {
            title,
            outcomes: &outcomes,
            volume: &request.volume,
            category,
            crypto: crypto_data.as_ref(),
            today: chrono::Utc::now().date_naive(),
        });
        let labels: Vec<String> = outcomes.iter().map(|o| o.label.clone()).collect();

        let chain_timeout = Duration::from_secs(self.config.model_chain_timeout_secs);
        let tasks = self.config.models.iter().map(|spec| {
            let prompt = &prompt;
            let labels = &labels;
            async move {
                let attempt = tokio::time::timeout(
                    chain_timeout,
                    analyze_model(self.gateway.as_ref(), spec, prompt, labels),
                )
                .await
                .unwrap_or_else(|_| AttemptOutcome::Failure {
                    reason: AnalystError::Timeout {
                        model: spec.id.clone(),
                        secs: chain_timeout.as_secs(),
                    }
                    .to_string(),
                });
                (spec, attempt)
            }
        });
        let results = join_all(tasks).await;

        let mut analyses: Vec<ModelAnalysis> = Vec::new();
        let mut failed_models: Vec<String> = Vec::new();
        for (spec, attempt) in results {
            match self.collect(spec, attempt, &outcomes) {
                Some(analysis) => analyses.push(analysis),
                None => failed_models.push(spec.display_name.clone()),
            }
        }

        if analyses.is_empty() {
            error!("All {} models failed", self.config.models.len());
            return Err(PipelineError::AllModelsFailed { failed: failed_models });
        }

        let consensus = consensus::build_consensus(&analyses, &outcomes);

        Ok(ConsolidatedResponse {
            consensus,
            metadata: ResponseMetadata {
                request_id,
                models_used: analyses.len(),
                models: analyses.iter().map(|a| a.model.clone()).collect(),
                failed_models,
                timestamp: chrono::Utc::now().to_rfc3339(),
                category,
                is_multi_outcome,
            },
            model_analyses: analyses,
            crypto_data,
            model_accuracy: HashMap::new(),
        })
    }

    fn collect(
        &self,
        spec: &ModelSpec,
        attempt: AttemptOutcome,
        outcomes: &[MarketOutcome],
    ) -> Option<ModelAnalysis> {
        match attempt {
            AttemptOutcome::Success {
                analysis,
                model_id,
                used_fallback,
            } => Some(build_model_analysis(
                spec,
                &model_id,
                &analysis,
                outcomes,
                used_fallback,
                &self.config.evidence,
            )),
            AttemptOutcome::Degraded {
                analysis,
                model_id,
                used_fallback,
                reason,
            } => {
                warn!("{} degraded to text parse after: {reason}", spec.display_name);
                Some(build_model_analysis(
                    spec,
                    &model_id,
                    &analysis,
                    outcomes,
                    used_fallback,
                    &self.config.evidence,
                ))
            }
            AttemptOutcome::Failure { reason } => {
                error!("{} failed: {reason}", spec.display_name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{ChatReply, ChatRequest};
    use crate::types::{Category, Confidence, CryptoData, RawOutcome};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every model with the same YES estimate, or fails them all
    struct FixedGateway {
        yes: Option<f64>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatCompletion for FixedGateway {
        async fn complete(&self, request: &ChatRequest) -> anyhow::Result<ChatReply> {
            let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            let Some(yes) = self.yes else {
                anyhow::bail!("Gateway 500: upstream error");
            };
            let top_pick = if yes >= 50.0 { "Yes" } else { "No" };
            let args = json!({
                "summary": "Test view.",
                "outcomes": [
                    {"label": "Yes", "probability": yes, "reasoning": "r", "dataPoints": ["d1", "d2", "d3"]},
                    {"label": "No", "probability": 100.0 - yes, "reasoning": "r", "dataPoints": []}
                ],
                "topPick": top_pick,
                "sentiment": "bullish",
                "confidence": "medium",
                "assumptions": ["a"],
                "keyRisks": ["k"]
            });
            Ok(ChatReply {
                tool_arguments: Some(args.to_string()),
                content: None,
            })
        }
    }

    struct FixedMarketData(Option<CryptoData>);

    #[async_trait]
    impl MarketDataSource for FixedMarketData {
        async fn crypto_data(&self, _symbol: &str) -> Option<CryptoData> {
            self.0.clone()
        }
    }

    fn pipeline(yes: Option<f64>, crypto: Option<CryptoData>) -> (AnalysisPipeline, Arc<FixedGateway>) {
        let gateway = Arc::new(FixedGateway {
            yes,
            prompts: Mutex::new(Vec::new()),
        });
        let p = AnalysisPipeline::new(
            AnalysisConfig::default(),
            gateway.clone(),
            Arc::new(FixedMarketData(crypto)),
        );
        (p, gateway)
    }

    fn btc_request() -> AnalysisRequest {
        AnalysisRequest {
            market_title: Some("Will BTC hit $100k?".to_string()),
            market_id: "m-1".to_string(),
            yes_percentage: 65.0,
            no_percentage: 35.0,
            volume: "45230".to_string(),
            outcomes: None,
        }
    }

    #[tokio::test]
    async fn test_missing_title_is_rejected() {
        let (p, _) = pipeline(Some(70.0), None);
        let mut req = btc_request();
        req.market_title = Some("   ".to_string());
        assert!(matches!(p.analyze(&req).await, Err(PipelineError::MissingTitle)));
    }

    #[tokio::test]
    async fn test_all_models_failing_is_an_error() {
        let (p, _) = pipeline(None, None);
        match p.analyze(&btc_request()).await {
            Err(PipelineError::AllModelsFailed { failed }) => assert_eq!(failed.len(), 3),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_binary_request_end_to_end() {
        let crypto = CryptoData {
            symbol: "BTC".to_string(),
            price: 97_000.0,
            change_24h: 1.5,
            high_24h: 98_000.0,
            low_24h: 95_000.0,
            volume_24h: 12_000.0,
            candles: vec![],
            technical_summary: None,
        };
        let (p, gateway) = pipeline(Some(70.0), Some(crypto));
        let resp = p.analyze(&btc_request()).await.unwrap();

        assert_eq!(resp.metadata.models_used, 3);
        assert!(resp.metadata.failed_models.is_empty());
        assert_eq!(resp.metadata.category, Category::Crypto);
        assert!(!resp.metadata.is_multi_outcome);
        assert_eq!(resp.consensus.top_pick, "Yes");
        assert_eq!(resp.consensus.top_pick_probability, 70.0);
        assert_eq!(resp.consensus.confidence, Confidence::High);
        assert_eq!(resp.crypto_data.as_ref().map(|c| c.symbol.as_str()), Some("BTC"));

        let prompts = gateway.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("$45,230"));
        assert!(prompts[0].contains("BTC"));
    }

    /// Fast model answers, broken model errors, slow model never returns in time
    struct MixedGateway;

    #[async_trait]
    impl ChatCompletion for MixedGateway {
        async fn complete(&self, request: &ChatRequest) -> anyhow::Result<ChatReply> {
            match request.model.as_str() {
                "test/slow" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    anyhow::bail!("unreachable");
                }
                "test/broken" => anyhow::bail!("Gateway 500: upstream error"),
                _ => {
                    let args = json!({
                        "summary": "Fast view.",
                        "outcomes": [
                            {"label": "Yes", "probability": 70, "reasoning": "r", "dataPoints": ["d1"]},
                            {"label": "No", "probability": 30, "reasoning": "r", "dataPoints": []}
                        ],
                        "topPick": "Yes",
                        "sentiment": "bullish",
                        "confidence": "medium",
                        "assumptions": [],
                        "keyRisks": []
                    });
                    Ok(ChatReply {
                        tool_arguments: Some(args.to_string()),
                        content: None,
                    })
                }
            }
        }
    }

    fn spec(id: &str, name: &str) -> ModelSpec {
        ModelSpec {
            id: id.to_string(),
            display_name: name.to_string(),
            provider: "Test".to_string(),
            fallbacks: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_slow_and_broken_models_are_excluded() {
        let config = AnalysisConfig {
            models: vec![
                spec("test/fast", "Fast"),
                spec("test/broken", "Broken"),
                spec("test/slow", "Slow"),
            ],
            model_chain_timeout_secs: 1,
            ..AnalysisConfig::default()
        };
        let p = AnalysisPipeline::new(config, Arc::new(MixedGateway), Arc::new(FixedMarketData(None)));

        let started = std::time::Instant::now();
        let resp = p.analyze(&btc_request()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));

        assert_eq!(resp.metadata.models_used, 1);
        assert_eq!(resp.metadata.models, vec!["Fast".to_string()]);
        assert_eq!(resp.metadata.failed_models, vec!["Broken".to_string(), "Slow".to_string()]);
        assert_eq!(resp.model_analyses.len(), 1);
        assert_eq!(resp.consensus.top_pick, "Yes");
        assert_eq!(resp.consensus.top_pick_probability, 70.0);
    }

    #[tokio::test]
    async fn test_multi_outcome_prices_rescaled() {
        let (p, _) = pipeline(None, None);
        let mut req = btc_request();
        req.market_title = Some("Who wins the league?".to_string());
        req.outcomes = Some(
            ["A", "B", "C", "D"]
                .iter()
                .map(|l| RawOutcome {
                    label: l.to_string(),
                    yes_price: Some(20.0),
                    ..RawOutcome::default()
                })
                .collect(),
        );
        // Gateway is down; normalization still runs before the fan-out
        assert!(p.analyze(&req).await.is_err());

        let outcomes = normalize_outcomes(req.outcomes.as_deref(), 0.0, 0.0, "m-1");
        for o in &outcomes {
            assert!((o.yes_price - 0.25).abs() < 1e-9);
        }
    }
}
