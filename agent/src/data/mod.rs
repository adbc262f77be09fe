pub mod crypto;

pub use crypto::{CryptoDataClient, MarketDataSource};
