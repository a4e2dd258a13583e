//! Mock market data provider for integration testing.
//!
//! Provides a deterministic `MarketDataProvider` whose bar series per
//! symbol are generated from a small set of shapes. Everything is
//! in-memory and controllable from test code, including forced outages.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use volscan::market_data::MarketDataProvider;
use volscan::types::{Bar, ScanError, Ticker};

/// Shape of the bar series served for a symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Series {
    /// Constant price and volume
    Flat,
    /// Tiny alternating wiggle around 100
    Calm,
    /// Calm series whose last bar jumps +3% on 4x volume
    Breakout,
    /// Seeded pseudo-random walk
    Walk(u64),
}

#[derive(Debug, Clone)]
struct Listing {
    series: Series,
    quote_volume: f64,
}

/// A mock market data provider for deterministic testing.
pub struct MockProvider {
    listings: Arc<Mutex<BTreeMap<String, Listing>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    /// If set, every call returns this error.
    force_error: Arc<Mutex<Option<String>>>,
    bar_calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            listings: Arc::new(Mutex::new(BTreeMap::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            force_error: Arc::new(Mutex::new(None)),
            bar_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Builder-style listing of a symbol.
    pub fn with_symbol(self, symbol: &str, series: Series, quote_volume: f64) -> Self {
        self.listings.lock().unwrap().insert(
            symbol.to_string(),
            Listing {
                series,
                quote_volume,
            },
        );
        self
    }

    /// Change the series served for an already listed symbol.
    pub fn set_series(&self, symbol: &str, series: Series) {
        if let Some(listing) = self.listings.lock().unwrap().get_mut(symbol) {
            listing.series = series;
        }
    }

    /// Make fetches for one symbol fail until `recover_symbol`.
    pub fn fail_symbol(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }

    pub fn recover_symbol(&self, symbol: &str) {
        self.failing.lock().unwrap().remove(symbol);
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Number of `fetch_bars` calls served so far (including failures).
    pub fn bar_calls(&self) -> usize {
        self.bar_calls.load(Ordering::SeqCst)
    }

    fn check(&self, symbol: &str) -> Result<Listing, ScanError> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(ScanError::fetch(symbol, err.clone()));
        }
        if self.failing.lock().unwrap().contains(symbol) {
            return Err(ScanError::fetch(symbol, "simulated 503"));
        }
        self.listings
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ScanError::fetch(symbol, "unknown symbol"))
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch_bars(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, ScanError> {
        self.bar_calls.fetch_add(1, Ordering::SeqCst);
        let listing = self.check(symbol)?;
        Ok(generate(listing.series, limit))
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ScanError> {
        let listing = self.check(symbol)?;
        let last = generate(listing.series, 2)
            .last()
            .map(|b| b.close)
            .unwrap_or(100.0);
        Ok(ticker(symbol, last, listing.quote_volume))
    }

    async fn fetch_tickers(&self) -> Result<Vec<Ticker>, ScanError> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(ScanError::fetch("*", err.clone()));
        }
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .map(|(symbol, l)| ticker(symbol, 100.0, l.quote_volume))
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Series generation
// ---------------------------------------------------------------------------

pub fn ticker(symbol: &str, last: f64, quote_volume: f64) -> Ticker {
    Ticker {
        symbol: symbol.to_string(),
        bid: last * 0.9999,
        ask: last * 1.0001,
        last,
        quote_volume,
    }
}

fn bar_time(i: usize) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(5 * i as i64)
}

/// `n` bars of the requested shape, oldest first.
pub fn generate(series: Series, n: usize) -> Vec<Bar> {
    match series {
        Series::Flat => (0..n)
            .map(|i| Bar {
                open_time: bar_time(i),
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0,
                volume: 10.0,
            })
            .collect(),
        Series::Calm => calm(n),
        Series::Breakout => {
            let mut bars = calm(n.saturating_sub(1));
            let prev = bars.last().map(|b| b.close).unwrap_or(100.0);
            bars.push(Bar {
                open_time: bar_time(bars.len()),
                open: prev,
                high: prev * 1.032,
                low: prev * 0.999,
                close: prev * 1.03,
                volume: 400.0,
            });
            bars
        }
        Series::Walk(seed) => walk(n, seed),
    }
}

fn calm(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| Bar {
            open_time: bar_time(i),
            open: 100.0,
            high: 100.1,
            low: 99.95,
            close: if i % 2 == 0 { 100.0 } else { 100.05 },
            volume: 100.0,
        })
        .collect()
}

fn walk(n: usize, seed: u64) -> Vec<Bar> {
    let mut state = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    let mut price = 100.0;
    (0..n)
        .map(|i| {
            let open = price;
            let close = open * (1.0 + (next() - 0.5) * 0.01);
            let high = open.max(close) * (1.0 + next() * 0.003);
            let low = open.min(close) * (1.0 - next() * 0.003);
            price = close;
            Bar {
                open_time: bar_time(i),
                open,
                high,
                low,
                close,
                volume: 50.0 + next() * 100.0,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_requested_limit() {
        let provider = MockProvider::new().with_symbol("AUSDT", Series::Walk(1), 1e8);
        let bars = provider.fetch_bars("AUSDT", "5m", 120).await.unwrap();
        assert_eq!(bars.len(), 120);
        assert!(bars.iter().all(|b| b.is_well_formed()));
        assert_eq!(provider.bar_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_breakout_shape() {
        let bars = generate(Series::Breakout, 300);
        assert_eq!(bars.len(), 300);
        let last = &bars[299];
        assert!(last.close > bars[298].close * 1.02);
        assert_eq!(last.volume, 400.0);
    }

    #[tokio::test]
    async fn test_mock_forced_error_and_failing_symbol() {
        let provider = MockProvider::new()
            .with_symbol("AUSDT", Series::Calm, 1e8)
            .with_symbol("BUSDT", Series::Calm, 1e8);

        provider.fail_symbol("BUSDT");
        assert!(provider.fetch_ticker("AUSDT").await.is_ok());
        assert!(provider.fetch_ticker("BUSDT").await.is_err());
        provider.recover_symbol("BUSDT");
        assert!(provider.fetch_ticker("BUSDT").await.is_ok());

        provider.set_error("exchange unreachable");
        assert!(provider.fetch_tickers().await.is_err());
        assert!(provider.fetch_bars("AUSDT", "5m", 50).await.is_err());
        provider.clear_error();
        assert_eq!(provider.fetch_tickers().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_unknown_symbol() {
        let provider = MockProvider::new();
        let err = provider.fetch_ticker("NOPEUSDT").await.unwrap_err();
        assert!(err.is_fetch_failure());
    }
}
