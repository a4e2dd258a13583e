//! Market data collaborators.
//!
//! Defines the `MarketDataProvider` trait the scanner pulls bars and
//! tickers through, and provides:
//! - Binance USDT-M futures: public REST endpoints, no key required

pub mod binance;

use async_trait::async_trait;

use crate::types::{Bar, ScanError, Ticker};

/// Abstraction over a source of OHLCV bars and tickers.
///
/// Failures surface as `ScanError::DataFetch` / `ScanError::Timeout` so the
/// scanner can count them without treating them as analytics errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Ordered (oldest first) bars for `symbol` at `interval`, at most `limit`.
    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, ScanError>;

    /// Current bid/ask/last and 24h quote volume for one symbol.
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ScanError>;

    /// 24h statistics for every listed symbol, used for universe discovery.
    /// Bid/ask may be zero when the endpoint does not carry them.
    async fn fetch_tickers(&self) -> Result<Vec<Ticker>, ScanError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}
