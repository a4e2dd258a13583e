//! Binance USDT-M futures market data.
//!
//! Read-only, public endpoints only.
//!
//! API docs: https://developers.binance.com/docs/derivatives/usds-margined-futures
//! Base URL: https://fapi.binance.com
//! Rate limit: 2400 request weight/minute per IP
//! Auth: Not required for market data.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::MarketDataProvider;
use crate::config::MarketDataConfig;
use crate::types::{Bar, ScanError, Ticker};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PROVIDER_NAME: &str = "binance-futures";

/// Binance caps a single klines request at 1500 bars.
const MAX_KLINES: usize = 1500;

/// Symbol placeholder for errors not tied to one symbol.
const ALL_SYMBOLS: &str = "*";

// ---------------------------------------------------------------------------
// API response types (Binance JSON → Rust)
// ---------------------------------------------------------------------------

/// `/fapi/v1/ticker/24hr` entry. Numbers arrive as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    last_price: String,
    #[serde(default)]
    quote_volume: String,
}

/// `/fapi/v1/ticker/bookTicker` entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    bid_price: String,
    ask_price: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Binance USDT-M futures REST client.
pub struct BinanceFuturesClient {
    http: Client,
    base_url: String,
    timeout_secs: u64,
}

impl BinanceFuturesClient {
    pub fn new(config: &MarketDataConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client for Binance")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    // -- Internal helpers ------------------------------------------------

    async fn get_json<T: DeserializeOwned>(&self, symbol: &str, url: &str) -> Result<T, ScanError> {
        debug!(url = %url, "Fetching Binance data");

        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ScanError::Timeout {
                    symbol: symbol.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                ScanError::fetch(symbol, format!("request failed: {e}"))
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::fetch(symbol, format!("Binance API error {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ScanError::fetch(symbol, format!("failed to parse response: {e}")))
    }
}

/// Parse a Binance string-encoded number.
fn num(symbol: &str, field: &str, raw: &str) -> Result<f64, ScanError> {
    raw.parse::<f64>()
        .map_err(|_| ScanError::fetch(symbol, format!("bad {field} value {raw:?}")))
}

/// Parse one kline row: `[openTime, open, high, low, close, volume, ...]`.
fn parse_kline(symbol: &str, row: &[serde_json::Value]) -> Result<Bar, ScanError> {
    if row.len() < 6 {
        return Err(ScanError::fetch(symbol, format!("short kline row ({} fields)", row.len())));
    }
    let field = |i: usize, name: &str| -> Result<f64, ScanError> {
        match &row[i] {
            serde_json::Value::String(s) => num(symbol, name, s),
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ScanError::fetch(symbol, format!("bad {name} value"))),
            other => Err(ScanError::fetch(symbol, format!("bad {name} value {other}"))),
        }
    };
    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| ScanError::fetch(symbol, "bad kline open time"))?;

    Ok(Bar {
        open_time: ms_to_datetime(open_ms),
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn to_ticker(t: Ticker24h, book: Option<BookTicker>) -> Result<Ticker, ScanError> {
    let (bid, ask) = match book {
        Some(b) => (
            num(&t.symbol, "bid", &b.bid_price)?,
            num(&t.symbol, "ask", &b.ask_price)?,
        ),
        None => (0.0, 0.0),
    };
    Ok(Ticker {
        last: num(&t.symbol, "last", &t.last_price)?,
        quote_volume: num(&t.symbol, "quote volume", &t.quote_volume).unwrap_or(0.0),
        bid,
        ask,
        symbol: t.symbol,
    })
}

#[async_trait]
impl MarketDataProvider for BinanceFuturesClient {
    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, ScanError> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            urlencoding::encode(symbol),
            urlencoding::encode(interval),
            limit.clamp(1, MAX_KLINES),
        );
        let rows: Vec<Vec<serde_json::Value>> = self.get_json(symbol, &url).await?;
        rows.iter().map(|row| parse_kline(symbol, row)).collect()
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ScanError> {
        let encoded = urlencoding::encode(symbol);
        let stats_url = format!("{}/fapi/v1/ticker/24hr?symbol={encoded}", self.base_url);
        let book_url = format!("{}/fapi/v1/ticker/bookTicker?symbol={encoded}", self.base_url);

        let (stats, book) = tokio::try_join!(
            self.get_json::<Ticker24h>(symbol, &stats_url),
            self.get_json::<BookTicker>(symbol, &book_url),
        )?;
        to_ticker(stats, Some(book))
    }

    async fn fetch_tickers(&self) -> Result<Vec<Ticker>, ScanError> {
        let url = format!("{}/fapi/v1/ticker/24hr", self.base_url);
        let all: Vec<Ticker24h> = self.get_json(ALL_SYMBOLS, &url).await?;
        // Delisted contracts can carry unparsable fields; skip them
        Ok(all
            .into_iter()
            .filter_map(|t| to_ticker(t, None).ok())
            .collect())
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kline_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1700000000000, "36500.10", "36620.00", "36480.50", "36600.00", "1234.567",
                1700000299999, "45000000.0", 5000, "600.0", "22000000.0", "0"]"#,
        )
        .unwrap();
        let bar = parse_kline("BTCUSDT", &row).unwrap();
        assert_eq!(bar.open, 36500.10);
        assert_eq!(bar.high, 36620.00);
        assert_eq!(bar.low, 36480.50);
        assert_eq!(bar.close, 36600.00);
        assert_eq!(bar.volume, 1234.567);
        assert_eq!(bar.open_time.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_kline_rejects_garbage() {
        let short: Vec<serde_json::Value> = serde_json::from_str(r#"[1700000000000, "1"]"#).unwrap();
        assert!(parse_kline("X", &short).unwrap_err().is_fetch_failure());

        let bad: Vec<serde_json::Value> =
            serde_json::from_str(r#"[1700000000000, "abc", "1", "1", "1", "1"]"#).unwrap();
        assert!(matches!(
            parse_kline("X", &bad),
            Err(ScanError::DataFetch { .. })
        ));
    }

    #[test]
    fn test_ticker_conversion() {
        let stats: Ticker24h = serde_json::from_str(
            r#"{"symbol":"ETHUSDT","lastPrice":"2000.5","quoteVolume":"123456789.0","priceChange":"1"}"#,
        )
        .unwrap();
        let book: BookTicker = serde_json::from_str(
            r#"{"symbol":"ETHUSDT","bidPrice":"2000.4","bidQty":"3","askPrice":"2000.6","askQty":"4"}"#,
        )
        .unwrap();
        let t = to_ticker(stats, Some(book)).unwrap();
        assert_eq!(t.symbol, "ETHUSDT");
        assert_eq!(t.last, 2000.5);
        assert_eq!(t.quote_volume, 123_456_789.0);
        assert!(t.spread_pct() > 0.0);
    }

    #[test]
    fn test_client_creation() {
        let client = BinanceFuturesClient::new(&MarketDataConfig::default()).unwrap();
        assert_eq!(client.name(), "binance-futures");
        assert_eq!(client.base_url, "https://fapi.binance.com");
    }
}
