//! Volatility metrics calculator.
//!
//! Given a window of OHLCV bars, computes several volatility estimators
//! (ATR, close-to-close, Parkinson, Garman-Klass, Yang-Zhang), short-horizon
//! realised volatility and price change, and volume statistics.
//!
//! Every output is a pure function of the input window.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::types::{Bar, Horizon, HorizonSet, ScanError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const MINUTES_PER_DAY: f64 = 1_440.0;
const MINUTES_PER_YEAR: f64 = 525_600.0;

/// Below this standard deviation a series is treated as constant.
const DEGENERATE_STD: f64 = 1e-12;

/// Minimum aligned samples for a meaningful correlation.
const MIN_CORRELATION_SAMPLES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Fewer bars than this yields `InsufficientData`.
    pub min_bars: usize,
    pub atr_period: usize,
    /// Trailing window for the volume moving average.
    pub volume_ma_period: usize,
    /// Window (in returns) of the rolling volatility series.
    pub rolling_vol_window: usize,
    /// Trailing bars used for the volume/volatility correlation.
    pub correlation_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            min_bars: 30,
            atr_period: 14,
            volume_ma_period: 50,
            rolling_vol_window: 12,
            correlation_window: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics bundle
// ---------------------------------------------------------------------------

/// Output of [`VolatilityMetricsCalculator::compute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityMetrics {
    pub atr: f64,
    /// ATR as a percentage of the latest close
    pub atr_percent: f64,
    /// Annualised close-to-close volatility
    pub historical_vol: f64,
    pub parkinson_vol: f64,
    pub garman_klass_vol: f64,
    pub yang_zhang_vol: f64,
    pub short_vol: HorizonSet,
    pub price_change: HorizonSet,
    /// (max high − min low) / min low over the last day, in percent
    pub day_range_pct: f64,
    pub volume_spike_ratio: f64,
    pub volume_volatility_correlation: f64,
    pub current_price: f64,
    pub current_volume: f64,
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

pub struct VolatilityMetricsCalculator {
    config: MetricsConfig,
    interval_minutes: u32,
}

impl VolatilityMetricsCalculator {
    pub fn new(config: MetricsConfig, interval_minutes: u32) -> Self {
        Self {
            config,
            interval_minutes: interval_minutes.max(1),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    /// sqrt(bars per year) for the configured bar interval.
    pub fn annualisation_factor(&self) -> f64 {
        (MINUTES_PER_YEAR / self.interval_minutes as f64).sqrt()
    }

    /// sqrt(bars per day), used to express short-horizon volatility
    /// as a daily-equivalent figure.
    fn daily_factor(&self) -> f64 {
        (MINUTES_PER_DAY / self.interval_minutes as f64).max(1.0).sqrt()
    }

    /// Compute the full metrics bundle for an ordered (oldest first) window.
    pub fn compute(&self, bars: &[Bar]) -> Result<VolatilityMetrics, ScanError> {
        let needed = self.config.min_bars.max(2);
        if bars.len() < needed {
            return Err(ScanError::InsufficientData {
                needed,
                got: bars.len(),
            });
        }
        if let Some(idx) = bars.iter().position(|b| !b.is_well_formed()) {
            return Err(ScanError::DegenerateInput(format!(
                "malformed bar at index {idx}"
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let returns = log_returns(&closes);

        let current_price = closes[closes.len() - 1];
        let current_volume = volumes[volumes.len() - 1];

        let atr = average_true_range(bars, self.config.atr_period);
        let annual = self.annualisation_factor();

        let short_vol = HorizonSet::from_fn(|h| {
            realised_volatility(&returns, h.bars(self.interval_minutes)) * self.daily_factor()
        });
        let price_change =
            HorizonSet::from_fn(|h| price_change_pct(&closes, h.bars(self.interval_minutes)));

        let rolling = rolling_std(&returns, self.config.rolling_vol_window);

        Ok(VolatilityMetrics {
            atr,
            atr_percent: finite_or_zero(atr / current_price * 100.0),
            historical_vol: sample_std(&returns) * annual,
            parkinson_vol: parkinson(bars) * annual,
            garman_klass_vol: garman_klass(bars) * annual,
            yang_zhang_vol: yang_zhang(bars) * annual,
            short_vol,
            price_change,
            day_range_pct: day_range_pct(bars, Horizon::D1.bars(self.interval_minutes)),
            volume_spike_ratio: volume_spike_ratio(&volumes, self.config.volume_ma_period),
            volume_volatility_correlation: volume_volatility_correlation(
                &volumes,
                &rolling,
                self.config.correlation_window,
            ),
            current_price,
            current_volume,
        })
    }
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// ln(c[i] / c[i-1]) for each consecutive pair.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| finite_or_zero((w[1] / w[0]).ln()))
        .collect()
}

/// Sample standard deviation; zero for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    finite_or_zero(values.iter().std_dev())
}

/// True range series. The first bar has no previous close and uses high − low.
pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let hl = bar.high - bar.low;
            if i == 0 {
                hl
            } else {
                let prev_close = bars[i - 1].close;
                hl.max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs())
            }
        })
        .collect()
}

/// Simple mean of the last `period` true ranges.
pub fn average_true_range(bars: &[Bar], period: usize) -> f64 {
    let tr = true_ranges(bars);
    if tr.is_empty() || period == 0 {
        return 0.0;
    }
    let window = &tr[tr.len().saturating_sub(period)..];
    finite_or_zero(window.iter().sum::<f64>() / window.len() as f64)
}

/// Per-bar Parkinson volatility: sqrt(mean(ln(H/L)²) / (4 ln 2)).
fn parkinson(bars: &[Bar]) -> f64 {
    let mean_sq = bars
        .iter()
        .map(|b| (b.high / b.low).ln().powi(2))
        .sum::<f64>()
        / bars.len() as f64;
    finite_or_zero((mean_sq / (4.0 * std::f64::consts::LN_2)).sqrt())
}

/// Per-bar Garman-Klass volatility.
fn garman_klass(bars: &[Bar]) -> f64 {
    let k = 2.0 * std::f64::consts::LN_2 - 1.0;
    let mean = bars
        .iter()
        .map(|b| 0.5 * (b.high / b.low).ln().powi(2) - k * (b.close / b.open).ln().powi(2))
        .sum::<f64>()
        / bars.len() as f64;
    finite_or_zero(mean.max(0.0).sqrt())
}

/// Per-bar Yang-Zhang volatility: overnight variance + k · open-to-close
/// variance + (1 − k) · Rogers-Satchell variance.
fn yang_zhang(bars: &[Bar]) -> f64 {
    if bars.len() < 3 {
        return 0.0;
    }
    let pairs = bars.windows(2);
    let overnight: Vec<f64> = pairs
        .clone()
        .map(|w| (w[1].open / w[0].close).ln())
        .collect();
    let open_close: Vec<f64> = pairs.clone().map(|w| (w[1].close / w[1].open).ln()).collect();
    let rogers_satchell = pairs
        .map(|w| {
            let b = &w[1];
            (b.high / b.close).ln() * (b.high / b.open).ln()
                + (b.low / b.close).ln() * (b.low / b.open).ln()
        })
        .sum::<f64>()
        / overnight.len() as f64;

    let n = overnight.len() as f64;
    let k = 0.34 / (1.34 + (n + 1.0) / (n - 1.0));
    let var_o = sample_std(&overnight).powi(2);
    let var_c = sample_std(&open_close).powi(2);
    let variance = var_o + k * var_c + (1.0 - k) * rogers_satchell;
    finite_or_zero(variance.max(0.0).sqrt())
}

/// Root mean square of the last `n` log returns; zero when fewer exist.
pub fn realised_volatility(returns: &[f64], n: usize) -> f64 {
    if n == 0 || returns.len() < n {
        return 0.0;
    }
    finite_or_zero(returns[returns.len() - n..].iter().quadratic_mean())
}

/// Percentage change of the latest close versus `n` bars earlier.
pub fn price_change_pct(closes: &[f64], n: usize) -> f64 {
    if n == 0 || closes.len() <= n {
        return 0.0;
    }
    let last = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - n];
    finite_or_zero((last - base) / base * 100.0)
}

fn day_range_pct(bars: &[Bar], day_bars: usize) -> f64 {
    let window = &bars[bars.len().saturating_sub(day_bars)..];
    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    finite_or_zero((high - low) / low * 100.0)
}

/// Latest volume over the trailing average (the average includes the
/// latest bar). 1.0 when the average is zero.
pub fn volume_spike_ratio(volumes: &[f64], period: usize) -> f64 {
    let Some(&current) = volumes.last() else {
        return 1.0;
    };
    let window = &volumes[volumes.len().saturating_sub(period.max(1))..];
    let avg = window.iter().sum::<f64>() / window.len() as f64;
    if avg > 0.0 {
        finite_or_zero(current / avg)
    } else {
        1.0
    }
}

/// Rolling sample standard deviation of returns, aligned to bars:
/// element `i` is the volatility ending at bar `i`, `None` until a full
/// window of returns exists.
fn rolling_std(returns: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(2);
    let bar_count = returns.len() + 1;
    (0..bar_count)
        .map(|i| {
            // Return k belongs to bar k + 1, so bar i closes returns [i-window, i)
            if i < window {
                None
            } else {
                Some(sample_std(&returns[i - window..i]))
            }
        })
        .collect()
}

/// Pearson correlation between volume and rolling volatility over the
/// trailing window. Zero for degenerate (near-constant) or short input.
fn volume_volatility_correlation(
    volumes: &[f64],
    rolling_vol: &[Option<f64>],
    window: usize,
) -> f64 {
    let start = volumes.len().saturating_sub(window);
    let (xs, ys): (Vec<f64>, Vec<f64>) = (start..volumes.len())
        .filter_map(|i| rolling_vol.get(i).copied().flatten().map(|v| (volumes[i], v)))
        .unzip();
    pearson(&xs, &ys)
}

/// Pearson correlation coefficient; 0 when either series has near-zero
/// variance or there are too few samples.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() < MIN_CORRELATION_SAMPLES {
        return 0.0;
    }
    let sx = sample_std(xs);
    let sy = sample_std(ys);
    if sx < DEGENERATE_STD || sy < DEGENERATE_STD {
        return 0.0;
    }
    let cov = xs.iter().covariance(ys.iter());
    finite_or_zero(cov / (sx * sy)).clamp(-1.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
