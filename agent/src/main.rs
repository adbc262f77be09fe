use anyhow::{Context, Result};
use clap::Parser;
use market_analysis::types::{AnalysisRequest, RawOutcome};
use market_analysis::{AnalysisConfig, AnalysisPipeline};
use tracing::info;

#[derive(Parser)]
#[command(name = "market-analysis", about = "Run one multi-model market analysis and print the JSON result")]
struct Cli {
    /// Market question, e.g. "Will BTC hit $100k by June?"
    #[arg(long)]
    title: String,

    /// YES price as a percentage (binary markets)
    #[arg(long, default_value_t = 50.0)]
    yes: f64,

    /// NO price as a percentage; defaults to 100 - yes
    #[arg(long)]
    no: Option<f64>,

    /// Traded volume in dollars
    #[arg(long, default_value = "")]
    volume: String,

    #[arg(long, default_value = "")]
    market_id: String,

    /// Multi-outcome entry as LABEL=PRICE; repeat for each outcome
    #[arg(long = "outcome", value_parser = parse_outcome)]
    outcomes: Vec<RawOutcome>,

    /// Load config from a specific .env file
    #[arg(long)]
    config_file: Option<String>,
}

fn parse_outcome(s: &str) -> Result<RawOutcome, String> {
    let (label, price) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected LABEL=PRICE, got {s:?}"))?;
    let price: f64 = price
        .trim()
        .parse()
        .map_err(|_| format!("invalid price in {s:?}"))?;
    Ok(RawOutcome {
        label: label.trim().to_string(),
        yes_price: Some(price),
        ..RawOutcome::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AnalysisConfig::from_env_file(cli.config_file.as_deref())?;
    info!(
        "Models: {}",
        cfg.models.iter().map(|m| m.id.as_str()).collect::<Vec<_>>().join(", ")
    );

    let request = AnalysisRequest {
        market_title: Some(cli.title),
        market_id: cli.market_id,
        yes_percentage: cli.yes,
        no_percentage: cli.no.unwrap_or(100.0 - cli.yes),
        volume: cli.volume,
        outcomes: (!cli.outcomes.is_empty()).then_some(cli.outcomes),
    };

    let pipeline = AnalysisPipeline::from_config(cfg);
    let response = pipeline.analyze(&request).await.context("Analysis failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
