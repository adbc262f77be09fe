mod config;
mod middleware;
mod routes;
mod supabase;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use market_analysis::{AnalysisConfig, AnalysisPipeline};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::middleware::rate_limit::RateLimiter;
use crate::supabase::{PredictionStore, SupabaseClient};

/// Shared application state passed to all route handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub store: Arc<dyn PredictionStore>,
    pub rate_limiter: RateLimiter,
}

#[derive(Parser)]
#[command(name = "analysis-server", about = "HTTP endpoint for multi-model prediction market analysis")]
struct Cli {
    /// Load config from a specific .env file
    #[arg(long)]
    config_file: Option<String>,

    /// Override PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.config_file.as_deref() {
        Some(path) => {
            dotenvy::from_filename(path).with_context(|| format!("Loading {path}"))?;
        }
        None => {
            // Ignored in production where env vars are set externally
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let analysis = AnalysisConfig::from_env()?;
    anyhow::ensure!(
        !analysis.gateway_api_key.is_empty(),
        "LLM_GATEWAY_API_KEY is required"
    );
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    info!(
        "Configuration loaded (port={}, models={})",
        config.port,
        analysis.models.len()
    );

    let rate_limiter = RateLimiter::new(config.max_requests_per_ip_per_minute);
    let state = AppState {
        pipeline: Arc::new(AnalysisPipeline::from_config(analysis)),
        store: Arc::new(SupabaseClient::new(&config)),
        rate_limiter: rate_limiter.clone(),
    };

    // Public API: any origin, pre-flight answered by the layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/market-analysis", post(routes::analysis::analyze_market))
        .route(
            "/functions/v1/market-analysis",
            post(routes::analysis::analyze_market),
        )
        .layer(cors)
        .with_state(state);

    // Sweep stale rate-limit windows
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            rate_limiter.cleanup_stale_entries();
            debug!("Rate limiter tracking {} IPs", rate_limiter.tracked_ips());
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Market analysis server v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    info!("Routes:");
    info!("  GET  /api/health");
    info!("  POST /api/market-analysis");
    info!("  POST /functions/v1/market-analysis");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
