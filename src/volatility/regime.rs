//! Market regime detector.
//!
//! Labels the window with a directional / structural condition from the
//! moving-average trend, RSI, relative volume and the short-versus-long
//! volatility ratio. Rules are evaluated in a fixed order and the first
//! match wins:
//!
//! 1. BREAKOUT: 1h volatility above `breakout_ratio` × 1d volatility
//! 2. EXHAUSTION: RSI outside the extremes on fading volume
//! 3. ACCUMULATION / DISTRIBUTION: no trend, volume surge
//! 4. TRENDING_UP / TRENDING_DOWN: trend stronger than `trend_strength`
//! 5. RANGING: everything else

use serde::{Deserialize, Serialize};
use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::types::{Bar, HorizonSet, MarketCondition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Fast SMA must clear the slow SMA by this fraction to count as a trend
    pub trend_margin: f64,
    /// Minimum (fast − slow) / slow for a TRENDING label
    pub trend_strength: f64,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// Relative volume below which an RSI extreme reads as exhaustion
    pub exhaustion_volume_ratio: f64,
    /// Relative volume above which a trendless market reads as
    /// accumulation or distribution
    pub accumulation_volume_ratio: f64,
    pub volume_period: usize,
    /// Closes compared (last N vs the N before) for accumulation/distribution
    pub accumulation_window: usize,
    /// 1h / 1d volatility ratio for a BREAKOUT label
    pub breakout_ratio: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
            trend_margin: 0.02,
            trend_strength: 0.03,
            rsi_period: 14,
            rsi_overbought: 80.0,
            rsi_oversold: 20.0,
            exhaustion_volume_ratio: 0.7,
            accumulation_volume_ratio: 1.5,
            volume_period: 20,
            accumulation_window: 5,
            breakout_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trend {
    Up(f64),
    Down(f64),
    Neutral,
}

pub struct RegimeDetector {
    config: RegimeConfig,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Bars required before anything other than RANGING can be reported.
    pub fn min_bars(&self) -> usize {
        self.config
            .slow_period
            .max(self.config.fast_period)
            .max(self.config.rsi_period + 1)
            .max(self.config.accumulation_window * 2)
    }

    pub fn detect(&self, bars: &[Bar], short_vol: &HorizonSet) -> MarketCondition {
        if bars.len() < self.min_bars() {
            return MarketCondition::Ranging;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        if short_vol.d1 > 0.0 && short_vol.h1 > short_vol.d1 * self.config.breakout_ratio {
            return MarketCondition::Breakout;
        }

        let rsi = rsi(&closes, self.config.rsi_period);
        let volume_ratio = relative_volume(&volumes, self.config.volume_period);

        if (rsi > self.config.rsi_overbought || rsi < self.config.rsi_oversold)
            && volume_ratio < self.config.exhaustion_volume_ratio
        {
            return MarketCondition::Exhaustion;
        }

        let trend = self.trend(&closes);

        if trend == Trend::Neutral && volume_ratio > self.config.accumulation_volume_ratio {
            let n = self.config.accumulation_window;
            let recent = mean(&closes[closes.len() - n..]);
            let prior = mean(&closes[closes.len() - 2 * n..closes.len() - n]);
            return if recent > prior {
                MarketCondition::Accumulation
            } else {
                MarketCondition::Distribution
            };
        }

        match trend {
            Trend::Up(strength) if strength > self.config.trend_strength => {
                MarketCondition::TrendingUp
            }
            Trend::Down(strength) if strength > self.config.trend_strength => {
                MarketCondition::TrendingDown
            }
            _ => MarketCondition::Ranging,
        }
    }

    fn trend(&self, closes: &[f64]) -> Trend {
        let (Some(fast), Some(slow)) = (
            last_sma(closes, self.config.fast_period),
            last_sma(closes, self.config.slow_period),
        ) else {
            return Trend::Neutral;
        };
        if slow <= 0.0 {
            return Trend::Neutral;
        }
        if fast > slow * (1.0 + self.config.trend_margin) {
            Trend::Up((fast - slow) / slow)
        } else if fast < slow * (1.0 - self.config.trend_margin) {
            Trend::Down((slow - fast) / slow)
        } else {
            Trend::Neutral
        }
    }
}

/// Latest value of a simple moving average, `None` until `period` values exist.
fn last_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut sma = SimpleMovingAverage::new(period).ok()?;
    let mut last = None;
    for &v in &values[values.len() - period..] {
        last = Some(sma.next(v));
    }
    last
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// RSI over the last `period` close-to-close changes, using simple means
/// of gains and losses. 100 when there are only gains, 50 when flat.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }
    let deltas: Vec<f64> = closes[closes.len() - period - 1..]
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let gain = deltas.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let loss = -deltas.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;
    if loss <= 0.0 {
        return if gain > 0.0 { 100.0 } else { 50.0 };
    }
    100.0 - 100.0 / (1.0 + gain / loss)
}

/// Latest volume over its trailing simple average; 1.0 when the average is zero.
fn relative_volume(volumes: &[f64], period: usize) -> f64 {
    match (last_sma(volumes, period), volumes.last()) {
        (Some(avg), Some(&current)) if avg > 0.0 => current / avg,
        _ => 1.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
