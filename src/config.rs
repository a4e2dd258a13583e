//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a minimal (or empty) file is a valid config.
//! Values are validated once at startup; a bad config is fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::types::ScanError;
use crate::volatility::classifier::ClassifierConfig;
use crate::volatility::metrics::MetricsConfig;
use crate::volatility::regime::RegimeConfig;
use crate::volatility::scorer::{OpportunityConfig, ScoringConfig};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub universe: UniverseConfig,
    pub market_data: MarketDataConfig,
    pub metrics: MetricsConfig,
    pub classifier: ClassifierConfig,
    pub regime: RegimeConfig,
    pub scoring: ScoringConfig,
    pub opportunity: OpportunityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    /// Bar interval in exchange notation: `1m`, `5m`, `15m`, `1h`, ...
    pub bar_interval: String,
    pub bar_limit: usize,
    /// Maximum concurrent per-symbol fetch + compute tasks
    pub worker_pool_size: usize,
    pub fetch_timeout_secs: u64,
    /// Candidates scanned per cycle (rotating slice)
    pub candidate_slice: usize,
    /// Dormant symbols scanned per dormant pass (rotating slice)
    pub dormant_slice: usize,
    /// Dormant symbols are scanned every N cycles
    pub dormant_scan_every: u64,
    /// Consecutive all-failed cycles before the scanner reports unhealthy
    pub failure_escalation_cycles: usize,
    /// 1h-volatility samples kept per symbol
    pub history_capacity: usize,
    /// JSON export written after every cycle when set
    pub export_path: Option<String>,
    /// SQLite URL for cycle performance records, e.g. `sqlite://volscan.db`
    pub metrics_db: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            name: "VOLSCAN-001".to_string(),
            scan_interval_secs: 60,
            bar_interval: "5m".to_string(),
            bar_limit: 500,
            worker_pool_size: 10,
            fetch_timeout_secs: 10,
            candidate_slice: 10,
            dormant_slice: 5,
            dormant_scan_every: 10,
            failure_escalation_cycles: 3,
            history_capacity: 288,
            export_path: None,
            metrics_db: None,
        }
    }
}

impl ScannerConfig {
    /// Bar interval in minutes.
    pub fn interval_minutes(&self) -> Result<u32, ScanError> {
        parse_interval(&self.bar_interval)
    }
}

/// Parse `<n>m`, `<n>h` or `<n>d` into minutes.
pub fn parse_interval(s: &str) -> Result<u32, ScanError> {
    let s = s.trim();
    let bad = || ScanError::Config(format!("Unparsable bar interval: {s:?}"));
    let unit = s.chars().last().ok_or_else(bad)?;
    let num = &s[..s.len() - unit.len_utf8()];
    let n: u32 = num.parse().map_err(|_| bad())?;
    let minutes = match unit {
        'm' => n,
        'h' => n.checked_mul(60).ok_or_else(bad)?,
        'd' => n.checked_mul(1_440).ok_or_else(bad)?,
        _ => return Err(bad()),
    };
    if minutes == 0 {
        return Err(bad());
    }
    Ok(minutes)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Only symbols quoted in this asset are discovered
    pub quote_asset: String,
    /// Maximum number of symbols tracked across all tiers
    pub max_universe: usize,
    pub initial_active: usize,
    pub max_active: usize,
    /// Minimum 24h quote volume (USD) for discovery
    pub min_volume_usd: f64,
    /// Candidate -> active watermark
    pub promote_score: f64,
    /// Active -> dormant watermark, sustained over `demote_window` readings
    pub demote_score: f64,
    pub demote_window: usize,
    /// Candidate -> dormant watermark, sustained over `dormant_window` readings
    pub dormant_score: f64,
    pub dormant_window: usize,
    /// Dormant -> candidate watermark
    pub revive_score: f64,
    /// Readings a challenger must sustain before it can displace a member
    /// of a full active set
    pub displace_window: usize,
    /// Static symbol list; bypasses discovery when non-empty
    pub symbols: Vec<String>,
    pub blacklist: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            max_universe: 50,
            initial_active: 20,
            max_active: 15,
            min_volume_usd: 10_000_000.0,
            promote_score: 50.0,
            demote_score: 30.0,
            demote_window: 12,
            dormant_score: 20.0,
            dormant_window: 3,
            revive_score: 35.0,
            displace_window: 3,
            symbols: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fapi.binance.com".to_string(),
            request_timeout_secs: 10,
            user_agent: "volscan/0.1".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {path}"))?;
        Ok(config)
    }

    /// Reject values that would make the scanner misbehave.
    pub fn validate(&self) -> Result<(), ScanError> {
        let fail = |msg: &str| Err(ScanError::Config(msg.to_string()));

        let s = &self.scanner;
        s.interval_minutes()?;
        if s.scan_interval_secs == 0 || s.fetch_timeout_secs == 0 {
            return fail("scan interval and fetch timeout must be positive");
        }
        if s.worker_pool_size == 0 || s.bar_limit == 0 || s.history_capacity == 0 {
            return fail("worker pool, bar limit and history capacity must be positive");
        }
        if s.dormant_scan_every == 0 || s.failure_escalation_cycles == 0 {
            return fail("dormant_scan_every and failure_escalation_cycles must be positive");
        }
        if s.bar_limit < self.metrics.min_bars {
            return fail("bar_limit is below the minimum bar window");
        }

        let u = &self.universe;
        if u.max_active == 0 || u.max_universe == 0 {
            return fail("universe capacities must be positive");
        }
        if u.demote_score > u.promote_score {
            return fail("demote_score must not exceed promote_score");
        }
        if u.dormant_score > u.revive_score {
            return fail("dormant_score must not exceed revive_score");
        }
        if u.demote_window == 0 || u.dormant_window == 0 || u.displace_window == 0 {
            return fail("membership windows must be positive");
        }

        if self.metrics.min_bars < 3 || self.metrics.atr_period == 0 {
            return fail("metrics windows too small");
        }

        let c = &self.classifier;
        if !increasing(&c.cold_start_bands) || !increasing(&c.percentile_bands) {
            return fail("classifier band edges must be strictly increasing");
        }
        if c.breakout_multiplier <= 0.0 {
            return fail("breakout_multiplier must be positive");
        }

        let r = &self.regime;
        if r.fast_period == 0 || r.slow_period <= r.fast_period || r.rsi_period == 0 {
            return fail("regime periods must be positive with slow > fast");
        }
        if r.breakout_ratio <= 0.0 || r.accumulation_window == 0 || r.volume_period == 0 {
            return fail("regime ratios and windows must be positive");
        }

        let sc = &self.scoring;
        if (sc.total_weight() - 100.0).abs() > 1e-6
            || [sc.state_weight, sc.volume_weight, sc.regime_weight, sc.signal_weight]
                .iter()
                .any(|w| *w < 0.0)
        {
            return fail("scoring weights must be non-negative and sum to 100");
        }

        let o = &self.opportunity;
        if o.ttl_minutes <= 0 || o.max_confidence <= 0.0 || o.max_confidence > 1.0 {
            return fail("opportunity ttl must be positive and max_confidence in (0, 1]");
        }
        if o.extreme_boost <= 0.0 || o.breakout_boost <= 0.0 {
            return fail("confidence boosts must be positive");
        }

        Ok(())
    }
}

fn increasing(edges: &[f64]) -> bool {
    edges.windows(2).all(|w| w[0] < w[1])
}
