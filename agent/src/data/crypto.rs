use crate::types::{Candle, CryptoData};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Relative deviation from the window's average volume that counts as a trend
const VOLUME_TREND_THRESHOLD: f64 = 0.20;

/// Percent change below which the window is reported as sideways
const SIDEWAYS_THRESHOLD_PCT: f64 = 0.5;

/// Best-effort source of live crypto prices. Implementations fail closed:
/// any fetch problem yields `None`, never an error.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn crypto_data(&self, symbol: &str) -> Option<CryptoData>;
}

/// Binance-style REST client (24h ticker + klines)
pub struct CryptoDataClient {
    base_url: String,
    interval: String,
    limit: u32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change_percent: String,
    high_price: String,
    low_price: String,
    volume: String,
}

impl CryptoDataClient {
    pub fn new(base_url: &str, timeout_secs: u64, interval: &str, limit: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            interval: interval.to_string(),
            limit,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .expect("HTTP client"),
        }
    }

    fn pair(symbol: &str) -> String {
        format!("{}USDT", symbol.to_uppercase())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker24h> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, Self::pair(symbol));
        let resp = self.client.get(&url).send().await.context("Ticker request")?;
        if !resp.status().is_success() {
            anyhow::bail!("Ticker {} for {symbol}", resp.status());
        }
        resp.json().await.context("Parse ticker")
    }

    async fn fetch_candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            Self::pair(symbol),
            self.interval,
            self.limit
        );
        let resp = self.client.get(&url).send().await.context("Candle request")?;
        if !resp.status().is_success() {
            anyhow::bail!("Candles {} for {symbol}", resp.status());
        }
        let rows: Vec<Vec<Value>> = resp.json().await.context("Parse candles")?;
        Ok(rows.iter().map(Vec::as_slice).filter_map(parse_candle).collect())
    }
}

#[async_trait]
impl MarketDataSource for CryptoDataClient {
    async fn crypto_data(&self, symbol: &str) -> Option<CryptoData> {
        let (ticker, candles) = tokio::join!(self.fetch_ticker(symbol), self.fetch_candles(symbol));

        let ticker = match ticker {
            Ok(t) => t,
            Err(e) => {
                warn!("Crypto ticker unavailable for {symbol}: {e:#}");
                return None;
            }
        };
        let candles = candles.unwrap_or_else(|e| {
            warn!("Candles unavailable for {symbol}: {e:#}");
            Vec::new()
        });

        let price = num(&ticker.last_price)?;
        debug!("{symbol}: ${price:.2} with {} candles", candles.len());

        Some(CryptoData {
            symbol: symbol.to_uppercase(),
            price,
            change_24h: num(&ticker.price_change_percent).unwrap_or(0.0),
            high_24h: num(&ticker.high_price).unwrap_or(price),
            low_24h: num(&ticker.low_price).unwrap_or(price),
            volume_24h: num(&ticker.volume).unwrap_or(0.0),
            technical_summary: technical_summary(&candles),
            candles,
        })
    }
}

fn num(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Kline rows are `[openTime, "open", "high", "low", "close", "volume", ...]`
fn parse_candle(row: &[Value]) -> Option<Candle> {
    let field = |i: usize| -> Option<f64> {
        match row.get(i)? {
            Value::String(s) => num(s),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };
    Some(Candle {
        open_time: row.first()?.as_i64()?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for VolumeTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeTrend::Increasing => write!(f, "increasing"),
            VolumeTrend::Decreasing => write!(f, "decreasing"),
            VolumeTrend::Stable => write!(f, "stable"),
        }
    }
}

/// Compare the most recent quarter of the window against the whole window's average volume
pub fn volume_trend(candles: &[Candle]) -> VolumeTrend {
    if candles.is_empty() {
        return VolumeTrend::Stable;
    }
    let avg = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;
    if avg <= 0.0 {
        return VolumeTrend::Stable;
    }
    let recent_n = (candles.len() / 4).max(1);
    let recent = &candles[candles.len() - recent_n..];
    let recent_avg = recent.iter().map(|c| c.volume).sum::<f64>() / recent_n as f64;

    if recent_avg > avg * (1.0 + VOLUME_TREND_THRESHOLD) {
        VolumeTrend::Increasing
    } else if recent_avg < avg * (1.0 - VOLUME_TREND_THRESHOLD) {
        VolumeTrend::Decreasing
    } else {
        VolumeTrend::Stable
    }
}

/// Human-readable trend, volume and range-position summary; `None` without candles
pub fn technical_summary(candles: &[Candle]) -> Option<String> {
    let first = candles.first()?;
    let last = candles.last()?;

    let change_pct = if first.open > 0.0 {
        (last.close - first.open) / first.open * 100.0
    } else {
        0.0
    };
    let trend = if change_pct > SIDEWAYS_THRESHOLD_PCT {
        "uptrend"
    } else if change_pct < -SIDEWAYS_THRESHOLD_PCT {
        "downtrend"
    } else {
        "sideways"
    };

    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let position = if high > low {
        ((last.close - low) / (high - low) * 100.0).clamp(0.0, 100.0)
    } else {
        50.0
    };

    Some(format!(
        "{n}-candle trend: {trend} ({change_pct:+.2}%). Volume: {volume}. \
        Latest close ${close:.2} sits at {position:.0}% of the ${low:.2}-${high:.2} range.",
        n = candles.len(),
        volume = volume_trend(candles),
        close = last.close,
    ))
}
