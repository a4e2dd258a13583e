//! Per-symbol scanner.
//!
//! Fetches one symbol's bars and ticker (each under a timeout), runs the
//! profile pipeline and hands back an owned result. `scan_all` fans this
//! out over a bounded number of concurrent tasks; nothing shared is
//! written during the fan-out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::config::ScannerConfig;
use crate::market_data::MarketDataProvider;
use crate::types::{Bar, ScanError, Ticker, VolatilityProfile};
use crate::volatility::history::{HistoryBuffer, HistoryStore};
use crate::volatility::ProfileEngine;

// ---------------------------------------------------------------------------
// Scan result
// ---------------------------------------------------------------------------

/// What happened to one symbol in one cycle.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// A fresh profile was produced.
    Profiled(Box<VolatilityProfile>),
    /// Market data could not be fetched (network, API or timeout).
    FetchFailed(ScanError),
    /// Data arrived but could not be profiled (too few bars, malformed).
    Skipped(ScanError),
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub symbol: String,
    pub outcome: ScanOutcome,
}

impl ScanResult {
    pub fn profile(&self) -> Option<&VolatilityProfile> {
        match &self.outcome {
            ScanOutcome::Profiled(p) => Some(p.as_ref()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct PairScanner {
    provider: Arc<dyn MarketDataProvider>,
    engine: ProfileEngine,
    bar_interval: String,
    bar_limit: usize,
    fetch_timeout: Duration,
    worker_pool_size: usize,
}

impl PairScanner {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        engine: ProfileEngine,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            provider,
            engine,
            bar_interval: config.bar_interval.clone(),
            bar_limit: config.bar_limit,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            worker_pool_size: config.worker_pool_size.max(1),
        }
    }

    pub fn engine(&self) -> &ProfileEngine {
        &self.engine
    }

    /// Scan every symbol with at most `worker_pool_size` in flight.
    /// Results come back in completion order.
    pub async fn scan_all(
        &self,
        symbols: &[String],
        history: &HistoryStore,
        now: DateTime<Utc>,
    ) -> Vec<ScanResult> {
        stream::iter(symbols)
            .map(|symbol| self.scan_symbol(symbol, history.get(symbol), now))
            .buffer_unordered(self.worker_pool_size)
            .collect()
            .await
    }

    /// Fetch and profile a single symbol.
    pub async fn scan_symbol(
        &self,
        symbol: &str,
        history: &HistoryBuffer,
        now: DateTime<Utc>,
    ) -> ScanResult {
        let outcome = match self.fetch(symbol).await {
            Err(e) => ScanOutcome::FetchFailed(e),
            Ok((bars, ticker)) => {
                match self.engine.build_profile(symbol, &bars, &ticker, history, now) {
                    Ok(profile) => {
                        debug!(symbol, score = profile.opportunity_score, "Profile built");
                        ScanOutcome::Profiled(Box::new(profile))
                    }
                    Err(e) => ScanOutcome::Skipped(e),
                }
            }
        };
        ScanResult {
            symbol: symbol.to_string(),
            outcome,
        }
    }

    async fn fetch(&self, symbol: &str) -> Result<(Vec<Bar>, Ticker), ScanError> {
        let timed_out = || ScanError::Timeout {
            symbol: symbol.to_string(),
            secs: self.fetch_timeout.as_secs(),
        };

        let (bars, ticker) = tokio::join!(
            tokio::time::timeout(
                self.fetch_timeout,
                self.provider
                    .fetch_bars(symbol, &self.bar_interval, self.bar_limit),
            ),
            tokio::time::timeout(self.fetch_timeout, self.provider.fetch_ticker(symbol)),
        );

        let bars = bars.map_err(|_| timed_out())??;
        let ticker = ticker.map_err(|_| timed_out())??;
        Ok((bars, ticker))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
