use crate::types::{Category, CryptoData, MarketOutcome};
use chrono::NaiveDate;
use rust_decimal::prelude::*;

pub const ANALYST_SYSTEM: &str = r#"You are a calibrated prediction market analyst. You estimate the probability of each outcome of a market and submit your judgment by calling the submit_analysis function exactly once.

RULES:
- Only use data you can verify. Cite concrete figures (prices, dates, counts, polls) as dataPoints.
- Anything you cannot verify is an ASSUMPTION: list it under assumptions, never present it as fact.
- Probabilities are 0-100 and should sum to roughly 100 across mutually exclusive outcomes.
- topPick must be exactly one of the listed outcome labels.
- Do not overstate certainty. Probabilities above 85% require at least three cited data points.
- Name the key risks that could make your estimate wrong."#;

/// Everything the prompt needs for one market
pub struct PromptContext<'a> {
    pub title: &'a str,
    pub outcomes: &'a [MarketOutcome],
    pub volume: &'a str,
    pub category: Category,
    pub crypto: Option<&'a CryptoData>,
    pub today: NaiveDate,
}

/// Data each category's analysis is expected to rest on
pub fn category_requirements(category: Category) -> &'static str {
    match category {
        Category::Crypto => {
            "REQUIRED DATA (crypto):\n\
            - Current spot price and distance to any price target in the question\n\
            - Recent trend and volatility from the price data provided\n\
            - Scheduled catalysts (ETF decisions, upgrades, macro releases) with dates\n\
            - Do not invent on-chain metrics or exchange flows you were not given"
        }
        Category::Politics => {
            "REQUIRED DATA (politics):\n\
            - Latest polling averages with source and date\n\
            - Historical base rates for comparable races or votes\n\
            - Key scheduled events (debates, primaries, deadlines)\n\
            - Label any insider or rumor-based reasoning as an assumption"
        }
        Category::Sports => {
            "REQUIRED DATA (sports):\n\
            - Current standings, records and recent form\n\
            - Injury reports and lineup news with dates\n\
            - Head-to-head history and home/away splits\n\
            - Label any unconfirmed roster news as an assumption"
        }
        Category::Finance => {
            "REQUIRED DATA (finance):\n\
            - Latest official releases (CPI, jobs, GDP, rate decisions) with dates\n\
            - Market-implied expectations such as futures pricing\n\
            - Scheduled announcements before resolution\n\
            - Label forecasts that are not from an identified source as assumptions"
        }
        Category::Technology => {
            "REQUIRED DATA (technology):\n\
            - Official announcements, roadmaps and release history\n\
            - Regulatory or legal events with dates\n\
            - Company track record on similar timelines\n\
            - Label leaks and rumors as assumptions"
        }
        Category::General => {
            "REQUIRED DATA (general):\n\
            - Verifiable facts directly related to the resolution criteria\n\
            - Historical base rates for similar events\n\
            - Time remaining and any scheduled events before resolution\n\
            - Label anything you cannot verify as an assumption"
        }
    }
}

/// Render a raw volume string as a whole-dollar amount with thousands separators.
/// Unparseable input is passed through unchanged.
pub fn format_volume(volume: &str) -> String {
    let cleaned: String = volume.chars().filter(|c| *c != ',' && *c != '$').collect();
    let Ok(v) = Decimal::from_str(cleaned.trim()) else {
        return if volume.trim().is_empty() {
            "unknown".to_string()
        } else {
            volume.trim().to_string()
        };
    };

    let whole = v.round().abs().to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v.is_sign_negative() && !v.round().is_zero() { "-" } else { "" };
    format!("{sign}${grouped}")
}

pub fn format_crypto_block(data: &CryptoData) -> String {
    let mut s = format!(
        "LIVE PRICE DATA ({symbol}):\n\
        - Price: ${price:.2}\n\
        - 24h change: {change:+.2}%\n\
        - 24h range: ${low:.2} - ${high:.2}\n\
        - 24h volume: {volume:.2} {symbol}",
        symbol = data.symbol,
        price = data.price,
        change = data.change_24h,
        low = data.low_24h,
        high = data.high_24h,
        volume = data.volume_24h,
    );
    if let Some(ref summary) = data.technical_summary {
        s.push_str(&format!("\n- Technicals: {summary}"));
    }
    s
}

/// Assemble the user prompt. Pure; no I/O.
pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let labels = ctx
        .outcomes
        .iter()
        .map(|o| format!("\"{}\"", o.label))
        .collect::<Vec<_>>()
        .join(", ");

    let prices = ctx
        .outcomes
        .iter()
        .map(|o| format!("- {}: {:.1}%", o.label, o.probability_pct()))
        .collect::<Vec<_>>()
        .join("\n");

    let crypto = ctx
        .crypto
        .map(|c| format!("\n{}\n", format_crypto_block(c)))
        .unwrap_or_default();

    format!(
        "TODAY: {today}\n\
        \n\
        MARKET: {title}\n\
        CATEGORY: {category}\n\
        VALID OUTCOMES (use these labels exactly): {labels}\n\
        \n\
        CURRENT MARKET PROBABILITIES:\n\
        {prices}\n\
        \n\
        TRADING VOLUME: {volume}\n\
        {crypto}\n\
        {requirements}\n\
        \n\
        Estimate the probability of every valid outcome, pick the most likely one, \
        and submit your analysis with the submit_analysis function.",
        today = ctx.today.format("%Y-%m-%d"),
        title = ctx.title,
        category = ctx.category,
        volume = format_volume(ctx.volume),
        requirements = category_requirements(ctx.category),
    )
}
