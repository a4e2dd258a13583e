//! Shared types for the VOLSCAN scanner.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the market-data, volatility
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Intrabar range (high − low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Whether all prices are finite and strictly positive.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.high >= self.low
    }
}

/// Current top-of-book and 24h statistics for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    /// 24-hour volume in quote currency (USDT for USDT-margined pairs)
    pub quote_volume: f64,
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} last={} bid={} ask={} vol24h=${:.0}",
            self.symbol, self.last, self.bid, self.ask, self.quote_volume,
        )
    }
}

impl Ticker {
    /// Bid/ask spread as a percentage of the bid. Zero if the bid or ask is missing.
    pub fn spread_pct(&self) -> f64 {
        if self.bid > 0.0 && self.ask >= self.bid {
            (self.ask - self.bid) / self.bid * 100.0
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Horizons
// ---------------------------------------------------------------------------

/// Fixed short horizons over which volatility and price change are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Horizon {
    pub const ALL: &'static [Horizon] = &[
        Horizon::M5,
        Horizon::M15,
        Horizon::H1,
        Horizon::H4,
        Horizon::D1,
    ];

    /// Horizon length in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Horizon::M5 => 5,
            Horizon::M15 => 15,
            Horizon::H1 => 60,
            Horizon::H4 => 240,
            Horizon::D1 => 1440,
        }
    }

    /// Number of bars covering this horizon at the given bar interval.
    /// Always at least one bar.
    pub fn bars(&self, interval_minutes: u32) -> usize {
        (self.minutes() / interval_minutes.max(1)).max(1) as usize
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::M5 => write!(f, "5m"),
            Horizon::M15 => write!(f, "15m"),
            Horizon::H1 => write!(f, "1h"),
            Horizon::H4 => write!(f, "4h"),
            Horizon::D1 => write!(f, "1d"),
        }
    }
}

/// One value per short horizon.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HorizonSet {
    pub m5: f64,
    pub m15: f64,
    pub h1: f64,
    pub h4: f64,
    pub d1: f64,
}

impl HorizonSet {
    /// Build a set by evaluating `f` for every horizon.
    pub fn from_fn(mut f: impl FnMut(Horizon) -> f64) -> Self {
        Self {
            m5: f(Horizon::M5),
            m15: f(Horizon::M15),
            h1: f(Horizon::H1),
            h4: f(Horizon::H4),
            d1: f(Horizon::D1),
        }
    }

    pub fn get(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::M5 => self.m5,
            Horizon::M15 => self.m15,
            Horizon::H1 => self.h1,
            Horizon::H4 => self.h4,
            Horizon::D1 => self.d1,
        }
    }
}

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

/// Volatility regime of a symbol relative to its own history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityState {
    Dormant,
    Normal,
    Elevated,
    High,
    Extreme,
    Breakout,
}

impl VolatilityState {
    /// Ordinal rank of the percentile-driven states. `Breakout` is an
    /// override and ranks above everything.
    pub fn rank(&self) -> u8 {
        match self {
            VolatilityState::Dormant => 0,
            VolatilityState::Normal => 1,
            VolatilityState::Elevated => 2,
            VolatilityState::High => 3,
            VolatilityState::Extreme => 4,
            VolatilityState::Breakout => 5,
        }
    }
}

impl fmt::Display for VolatilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityState::Dormant => write!(f, "dormant"),
            VolatilityState::Normal => write!(f, "normal"),
            VolatilityState::Elevated => write!(f, "elevated"),
            VolatilityState::High => write!(f, "high"),
            VolatilityState::Extreme => write!(f, "extreme"),
            VolatilityState::Breakout => write!(f, "breakout"),
        }
    }
}

/// Directional / structural market condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    TrendingUp,
    TrendingDown,
    Ranging,
    Breakout,
    Exhaustion,
    Accumulation,
    Distribution,
}

impl fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketCondition::TrendingUp => write!(f, "trending_up"),
            MarketCondition::TrendingDown => write!(f, "trending_down"),
            MarketCondition::Ranging => write!(f, "ranging"),
            MarketCondition::Breakout => write!(f, "breakout"),
            MarketCondition::Exhaustion => write!(f, "exhaustion"),
            MarketCondition::Accumulation => write!(f, "accumulation"),
            MarketCondition::Distribution => write!(f, "distribution"),
        }
    }
}

/// Entry direction of a trading opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Scan-frequency tier of a symbol in the universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Active,
    Candidate,
    Dormant,
    Blacklisted,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Active => write!(f, "active"),
            Tier::Candidate => write!(f, "candidate"),
            Tier::Dormant => write!(f, "dormant"),
            Tier::Blacklisted => write!(f, "blacklisted"),
        }
    }
}

/// Scanner health as seen by the external status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanHealth {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for ScanHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanHealth::Healthy => write!(f, "healthy"),
            ScanHealth::Degraded => write!(f, "degraded"),
            ScanHealth::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

impl std::str::FromStr for ScanHealth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(ScanHealth::Healthy),
            "degraded" => Ok(ScanHealth::Degraded),
            "unhealthy" => Ok(ScanHealth::Unhealthy),
            _ => Err(anyhow::anyhow!("Unknown scan health: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Volatility profile
// ---------------------------------------------------------------------------

/// Complete volatility profile for one symbol at one scan.
///
/// Created fresh every cycle and superseded (never mutated) by the next
/// cycle's profile for the same symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityProfile {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub last_price: f64,

    // Volatility estimators
    pub atr: f64,
    pub atr_percent: f64,
    pub historical_vol: f64,
    pub parkinson_vol: f64,
    pub garman_klass_vol: f64,
    pub yang_zhang_vol: f64,

    /// Daily-equivalent realised volatility per short horizon
    pub short_vol: HorizonSet,
    /// Signed price change (%) per short horizon
    pub price_change: HorizonSet,
    /// Percentile rank (0–100) of the 1h volatility against its own history
    pub percentile: f64,

    // Volume
    pub volume_24h: f64,
    pub volume_spike_ratio: f64,
    pub volume_volatility_correlation: f64,

    // Market
    pub day_range_pct: f64,
    pub bid_ask_spread_pct: f64,

    // Classification
    pub volatility_state: VolatilityState,
    pub market_condition: MarketCondition,
    pub breakout_detected: bool,
    pub breakout_strength: f64,

    // Scores
    pub volatility_score: f64,
    pub opportunity_score: f64,
    pub risk_score: f64,
}

impl fmt::Display for VolatilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} / {}] vol1h={:.3} pct={:.0} atr%={:.2} spike={:.2}x score={:.0}",
            self.symbol,
            self.volatility_state,
            self.market_condition,
            self.short_vol.h1,
            self.percentile,
            self.atr_percent,
            self.volume_spike_ratio,
            self.opportunity_score,
        )
    }
}

// ---------------------------------------------------------------------------
// Trading opportunity
// ---------------------------------------------------------------------------

/// An opportunity detected from a profile that crossed the thresholds.
/// Immutable once created; readers drop it after `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingOpportunity {
    pub id: Uuid,
    pub symbol: String,
    pub detected_at: DateTime<Utc>,
    pub profile: VolatilityProfile,
    pub direction: Direction,
    /// Confidence in [0, 0.95]
    pub confidence: f64,
    /// Expected move in percent
    pub expected_move: f64,
    pub risk_reward_ratio: f64,
    pub priority: i32,
    pub expires_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl fmt::Display for TradingOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} conf={:.2} move={:.2}% rr={:.1} prio={} score={:.1}",
            self.symbol,
            self.direction,
            self.confidence,
            self.expected_move,
            self.risk_reward_ratio,
            self.priority,
            self.profile.opportunity_score,
        )
    }
}

impl TradingOpportunity {
    /// Whether the opportunity is still live at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for VOLSCAN.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("Data fetch failed ({symbol}): {message}")]
    DataFetch { symbol: String, message: String },

    #[error("Data fetch timed out ({symbol}) after {secs}s")]
    Timeout { symbol: String, secs: u64 },

    #[error("Insufficient data: need {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScanError {
    /// Construct a fetch error for a symbol.
    pub fn fetch(symbol: &str, message: impl Into<String>) -> Self {
        ScanError::DataFetch {
            symbol: symbol.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error came from the market-data collaborator
    /// (network, API or timeout) rather than from the calculators.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, ScanError::DataFetch { .. } | ScanError::Timeout { .. })
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

#[cfg(test)]
impl VolatilityProfile {
    /// Helper to build a test profile with neutral defaults.
    pub fn sample(symbol: &str, score: f64) -> Self {
        VolatilityProfile {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            last_price: 100.0,
            atr: 0.5,
            atr_percent: 0.5,
            historical_vol: 0.6,
            parkinson_vol: 0.55,
            garman_klass_vol: 0.52,
            yang_zhang_vol: 0.58,
            short_vol: HorizonSet {
                m5: 0.02,
                m15: 0.03,
                h1: 0.04,
                h4: 0.035,
                d1: 0.03,
            },
            price_change: HorizonSet {
                m5: 0.1,
                m15: 0.2,
                h1: 0.5,
                h4: -0.4,
                d1: 1.2,
            },
            percentile: 50.0,
            volume_24h: 50_000_000.0,
            volume_spike_ratio: 1.0,
            volume_volatility_correlation: 0.1,
            day_range_pct: 3.0,
            bid_ask_spread_pct: 0.01,
            volatility_state: VolatilityState::Normal,
            market_condition: MarketCondition::Ranging,
            breakout_detected: false,
            breakout_strength: 1.0,
            volatility_score: 40.0,
            opportunity_score: score,
            risk_score: 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
