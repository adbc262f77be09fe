use crate::types::Category;

const CRYPTO_KEYWORDS: &[&str] = &[
    "bitcoin", "btc", "ethereum", "crypto", "solana", "token", "defi", "blockchain",
    "dogecoin", "xrp", "altcoin", "stablecoin", "nft", "coinbase", "binance", "halving",
];

const POLITICS_KEYWORDS: &[&str] = &[
    "election", "president", "senate", "congress", "governor", "parliament", "vote",
    "democrat", "republican", "prime minister", "trump", "biden", "poll", "nominee",
    "impeach", "supreme court", "primary",
];

const SPORTS_KEYWORDS: &[&str] = &[
    "nfl", "nba", "mlb", "nhl", "soccer", "football", "basketball", "baseball", "tennis",
    "super bowl", "world cup", "championship", "playoffs", "finals", "mvp", "premier league",
    "olympics", "ufc", "f1", "grand prix",
];

const FINANCE_KEYWORDS: &[&str] = &[
    "stock", "s&p", "nasdaq", "dow jones", "fed ", "federal reserve", "interest rate",
    "inflation", "cpi", "gdp", "recession", "earnings", "ipo", "treasury", "unemployment",
];

const TECHNOLOGY_KEYWORDS: &[&str] = &[
    "ai ", "artificial intelligence", "openai", "gpt", "apple", "google", "microsoft",
    "tesla", "spacex", "iphone", "launch", "chip", "nvidia", "software", "agi",
];

/// Detection order; first match wins
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Crypto, CRYPTO_KEYWORDS),
    (Category::Politics, POLITICS_KEYWORDS),
    (Category::Sports, SPORTS_KEYWORDS),
    (Category::Finance, FINANCE_KEYWORDS),
    (Category::Technology, TECHNOLOGY_KEYWORDS),
];

/// (alias, ticker) pairs, matched against whole words of the upper-cased title
const SYMBOL_ALIASES: &[(&str, &str)] = &[
    ("BTC", "BTC"),
    ("BITCOIN", "BTC"),
    ("ETH", "ETH"),
    ("ETHEREUM", "ETH"),
    ("ETHER", "ETH"),
    ("SOL", "SOL"),
    ("SOLANA", "SOL"),
    ("XRP", "XRP"),
    ("RIPPLE", "XRP"),
    ("DOGE", "DOGE"),
    ("DOGECOIN", "DOGE"),
    ("ADA", "ADA"),
    ("CARDANO", "ADA"),
    ("BNB", "BNB"),
    ("AVAX", "AVAX"),
    ("AVALANCHE", "AVAX"),
    ("DOT", "DOT"),
    ("POLKADOT", "DOT"),
    ("LINK", "LINK"),
    ("CHAINLINK", "LINK"),
    ("LTC", "LTC"),
    ("LITECOIN", "LTC"),
    ("MATIC", "MATIC"),
    ("PEPE", "PEPE"),
    ("SHIB", "SHIB"),
];

/// Classify a market question by keyword. Never fails; falls back to `General`.
pub fn detect_category(title: &str) -> Category {
    // Padding lets trailing-space keywords like "fed " match at the end of a title
    let t = format!("{} ", title.to_lowercase());

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| t.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::General)
}

/// Extract a crypto ticker from the title, e.g. "Will Bitcoin hit $100k?" -> "BTC".
/// Aliases like DOT or LINK are only honoured when the title is about crypto,
/// so "connect the dots" or "link" in prose do not produce a ticker.
pub fn detect_crypto_symbol(title: &str) -> Option<&'static str> {
    let upper = title.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let is_crypto = detect_category(title) == Category::Crypto;

    // Walk the title left to right so the first mentioned asset wins
    for word in &words {
        if let Some((alias, ticker)) = SYMBOL_ALIASES.iter().find(|(alias, _)| alias == word) {
            if is_crypto || alias.len() >= 4 || *alias == "BTC" || *alias == "ETH" {
                return Some(ticker);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_detection() {
        assert_eq!(detect_category("Will BTC hit $100k?"), Category::Crypto);
        assert_eq!(detect_category("Who will win the 2028 presidential ELECTION?"), Category::Politics);
        assert_eq!(detect_category("Will the Chiefs win the Super Bowl?"), Category::Sports);
        assert_eq!(detect_category("Will the Fed cut interest rates in June?"), Category::Finance);
        assert_eq!(detect_category("Will OpenAI release GPT-6 this year?"), Category::Technology);
        assert_eq!(detect_category("Will it snow in Paris on Christmas?"), Category::General);
    }

    #[test]
    fn test_first_matching_category_wins() {
        // Mentions both crypto and politics; crypto is checked first
        assert_eq!(detect_category("Will the president sign a bitcoin reserve bill?"), Category::Crypto);
    }

    #[test]
    fn test_symbol_detection() {
        assert_eq!(detect_crypto_symbol("Will Bitcoin hit $100k?"), Some("BTC"));
        assert_eq!(detect_crypto_symbol("ETH above $5,000 by June?"), Some("ETH"));
        assert_eq!(detect_crypto_symbol("Will Solana flip Ethereum?"), Some("SOL"));
        assert_eq!(detect_crypto_symbol("Will the senate vote on whether to adjourn?"), None);
    }

    #[test]
    fn test_symbol_requires_whole_word() {
        // "whether" contains ETH but is not a word match
        assert_eq!(detect_crypto_symbol("Whether rates rise"), None);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let title = "Will Dogecoin reach $1 in 2026?";
        let first = (detect_category(title), detect_crypto_symbol(title));
        let second = (detect_category(title), detect_crypto_symbol(title));
        assert_eq!(first, second);
        assert_eq!(first, (Category::Crypto, Some("DOGE")));
    }
}
