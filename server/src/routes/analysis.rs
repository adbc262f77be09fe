use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use market_analysis::types::AnalysisRequest;
use market_analysis::PipelineError;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::middleware::rate_limit::client_ip;
use crate::supabase::PredictionRow;
use crate::AppState;

const ALL_FAILED_MESSAGE: &str =
    "All AI models failed to produce an analysis. Please try again in a moment.";

/// POST /api/market-analysis
///
/// Runs the multi-model pipeline for one market. Accuracy stats are read
/// while the models run; predictions are stored after, and neither store
/// call can fail the request.
pub async fn analyze_market(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let ip = client_ip(&headers, peer);
    if let Err(msg) = state.rate_limiter.check_ip_limit(&ip) {
        warn!("Rate limited {}: {}", ip, msg);
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": msg })));
    }

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected request body from {}: {}", ip, rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Invalid request body: {}", rejection.body_text()) })),
            );
        }
    };

    if request
        .market_title
        .as_deref()
        .map_or(true, |t| t.trim().is_empty())
    {
        return bad_request(&PipelineError::MissingTitle);
    }

    let (result, accuracy) = tokio::join!(
        state.pipeline.analyze(&request),
        state.store.model_accuracy()
    );

    let mut response = match result {
        Ok(response) => response,
        Err(e @ PipelineError::MissingTitle) => return bad_request(&e),
        Err(PipelineError::AllModelsFailed { failed }) => {
            error!("Analysis failed for market {:?}: all models down", request.market_id);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": ALL_FAILED_MESSAGE,
                    "failedModels": failed
                })),
            );
        }
    };

    response.model_accuracy = accuracy.unwrap_or_else(|e| {
        warn!("Model accuracy unavailable: {e:#}");
        Default::default()
    });

    if request.market_id.is_empty() {
        debug!("No marketId; skipping prediction storage");
    } else {
        let rows = PredictionRow::from_response(&request.market_id, &response);
        if let Err(e) = state.store.record_predictions(&rows).await {
            warn!("Failed to store predictions: {e:#}");
        }
    }

    info!(
        "Served analysis {} ({} models, top pick {})",
        response.metadata.request_id, response.metadata.models_used, response.consensus.top_pick
    );

    match serde_json::to_value(&response) {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => {
            error!("Failed to serialize analysis: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to build analysis response" })),
            )
        }
    }
}

fn bad_request(e: &PipelineError) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::rate_limit::RateLimiter;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};
    use crate::supabase::PredictionStore;
    use async_trait::async_trait;
    use market_analysis::analyzer::{ChatCompletion, ChatReply, ChatRequest};
    use market_analysis::data::MarketDataSource;
    use market_analysis::types::CryptoData;
    use market_analysis::{AnalysisConfig, AnalysisPipeline};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct FakeGateway {
        up: bool,
    }

    #[async_trait]
    impl ChatCompletion for FakeGateway {
        async fn complete(&self, _request: &ChatRequest) -> anyhow::Result<ChatReply> {
            if !self.up {
                anyhow::bail!("Gateway 503: unavailable");
            }
            let args = json!({
                "summary": "Spot ETF flows remain strong.",
                "outcomes": [
                    {"label": "Yes", "probability": 68, "reasoning": "Inflows", "dataPoints": ["$1.1B weekly inflows"]},
                    {"label": "No", "probability": 32, "reasoning": "Macro", "dataPoints": []}
                ],
                "topPick": "Yes",
                "sentiment": "bullish",
                "confidence": "medium",
                "assumptions": ["No exchange failures"],
                "keyRisks": ["Rate hike"]
            });
            Ok(ChatReply {
                tool_arguments: Some(args.to_string()),
                content: None,
            })
        }
    }

    struct NoMarketData;

    #[async_trait]
    impl MarketDataSource for NoMarketData {
        async fn crypto_data(&self, _symbol: &str) -> Option<CryptoData> {
            None
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<PredictionRow>>,
        fail: bool,
    }

    #[async_trait]
    impl PredictionStore for MemoryStore {
        async fn record_predictions(&self, rows: &[PredictionRow]) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("Supabase down");
            }
            self.rows.lock().unwrap().extend_from_slice(rows);
            Ok(())
        }

        async fn model_accuracy(&self) -> anyhow::Result<HashMap<String, Value>> {
            if self.fail {
                anyhow::bail!("Supabase down");
            }
            Ok(HashMap::from([(
                "GPT-5 Mini".to_string(),
                json!({"model_name": "GPT-5 Mini", "accuracy": 0.6}),
            )]))
        }
    }

    fn state(gateway_up: bool, store: Arc<MemoryStore>, per_minute: u32) -> AppState {
        let pipeline = AnalysisPipeline::new(
            AnalysisConfig::default(),
            Arc::new(FakeGateway { up: gateway_up }),
            Arc::new(NoMarketData),
        );
        AppState {
            pipeline: Arc::new(pipeline),
            store,
            rate_limiter: RateLimiter::new(per_minute),
        }
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("127.0.0.1:40000".parse().unwrap())
    }

    fn btc_request() -> AnalysisRequest {
        serde_json::from_value(json!({
            "marketTitle": "Will BTC hit $100k?",
            "marketId": "m-btc",
            "yesPercentage": 65,
            "noPercentage": 35,
            "volume": "45230"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_title_is_400() {
        let store = Arc::new(MemoryStore::default());
        let mut req = btc_request();
        req.market_title = None;
        let (status, Json(body)) =
            analyze_market(State(state(true, store, 10)), peer(), HeaderMap::new(), Ok(Json(req))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("marketTitle"));
    }

    #[tokio::test]
    async fn test_all_models_failing_is_500() {
        let store = Arc::new(MemoryStore::default());
        let (status, Json(body)) = analyze_market(
            State(state(false, store.clone(), 10)),
            peer(),
            HeaderMap::new(),
            Ok(Json(btc_request())),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert!(body.get("consensus").is_none());
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_stores_predictions_and_attaches_accuracy() {
        let store = Arc::new(MemoryStore::default());
        let (status, Json(body)) = analyze_market(
            State(state(true, store.clone(), 10)),
            peer(),
            HeaderMap::new(),
            Ok(Json(btc_request())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consensus"]["topPick"], "Yes");
        assert_eq!(body["metadata"]["modelsUsed"], 3);
        assert_eq!(body["metadata"]["category"], "crypto");
        assert_eq!(body["modelAccuracy"]["GPT-5 Mini"]["accuracy"], 0.6);
        assert!(body.get("cryptoData").is_none());

        let rows = store.rows.lock().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.market_id == "m-btc" && r.ai_probability == 68.0));
        assert!(rows.iter().all(|r| r.market_probability == 65.0));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..MemoryStore::default()
        });
        let (status, Json(body)) =
            analyze_market(State(state(true, store, 10)), peer(), HeaderMap::new(), Ok(Json(btc_request()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modelAccuracy"], json!({}));
    }

    async fn parse_body(raw: &str) -> Result<Json<AnalysisRequest>, JsonRejection> {
        let req = Request::builder()
            .method("POST")
            .uri("/api/market-analysis")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw.to_string()))
            .unwrap();
        Json::<AnalysisRequest>::from_request(req, &()).await
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_400() {
        let bodies = [
            r#"{"marketTitle":"x","yesPercentage":"65"}"#,
            r#"{"marketTitle":"x","yesPercentage":null}"#,
            "not json",
        ];
        for raw in bodies {
            let store = Arc::new(MemoryStore::default());
            let parsed = parse_body(raw).await;
            assert!(parsed.is_err(), "{raw} should be rejected");
            let (status, Json(body)) =
                analyze_market(State(state(true, store.clone(), 10)), peer(), HeaderMap::new(), parsed).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
            assert!(store.rows.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_rate_limited_is_429() {
        let store = Arc::new(MemoryStore::default());
        let app = state(true, store, 1);
        let (first, _) =
            analyze_market(State(app.clone()), peer(), HeaderMap::new(), Ok(Json(btc_request()))).await;
        assert_eq!(first, StatusCode::OK);
        let (second, Json(body)) =
            analyze_market(State(app), peer(), HeaderMap::new(), Ok(Json(btc_request()))).await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].as_str().is_some());
    }
}
