//! Volatility state classifier.
//!
//! Maps a symbol's current 1h volatility onto a discrete state using its
//! own history: percentile bands once enough samples exist, absolute
//! cold-start bands before that. A reading far above the historical mean
//! overrides everything as `Breakout`.

use serde::{Deserialize, Serialize};

use super::history::HistoryBuffer;
use crate::types::VolatilityState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// History samples required before percentile bands are used.
    pub min_history: usize,
    /// Current / historical mean above which the state is `Breakout`.
    pub breakout_multiplier: f64,
    /// Absolute 1h volatility lower bounds for NORMAL, ELEVATED, HIGH and
    /// EXTREME while history is short.
    pub cold_start_bands: [f64; 4],
    /// Percentile lower bounds for NORMAL, ELEVATED, HIGH and EXTREME.
    pub percentile_bands: [f64; 4],
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_history: 10,
            breakout_multiplier: 2.0,
            cold_start_bands: [0.02, 0.05, 0.10, 0.15],
            percentile_bands: [25.0, 75.0, 90.0, 95.0],
        }
    }
}

/// Classifier verdict for one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub state: VolatilityState,
    /// Percentile rank (0–100) against history, 50 when no history exists
    pub percentile: f64,
    pub breakout_detected: bool,
    /// Current reading relative to the daily baseline, 1.0 without one
    pub breakout_strength: f64,
}

pub struct VolatilityClassifier {
    config: ClassifierConfig,
}

impl VolatilityClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify `current` against `history`.
    ///
    /// `daily_baseline` is the 1d volatility; breakout strength is the
    /// current reading over it. The breakout override itself compares
    /// against the history mean.
    pub fn classify(
        &self,
        current: f64,
        history: &HistoryBuffer,
        daily_baseline: f64,
    ) -> Classification {
        let current = if current.is_finite() { current.max(0.0) } else { 0.0 };
        let percentile = history.percentile_rank(current).unwrap_or(50.0);

        let breakout_strength = if daily_baseline > 0.0 && daily_baseline.is_finite() {
            current / daily_baseline
        } else {
            1.0
        };

        if history.len() < self.config.min_history {
            return Classification {
                state: band(current, &self.config.cold_start_bands),
                percentile,
                breakout_detected: false,
                breakout_strength,
            };
        }

        let breakout = history.mean() > 0.0
            && current > history.mean() * self.config.breakout_multiplier;
        let state = if breakout {
            VolatilityState::Breakout
        } else {
            band(percentile, &self.config.percentile_bands)
        };

        Classification {
            state,
            percentile,
            breakout_detected: breakout,
            breakout_strength,
        }
    }
}

/// Highest band whose lower bound is <= `value`.
fn band(value: f64, bounds: &[f64; 4]) -> VolatilityState {
    if value >= bounds[3] {
        VolatilityState::Extreme
    } else if value >= bounds[2] {
        VolatilityState::High
    } else if value >= bounds[1] {
        VolatilityState::Elevated
    } else if value >= bounds[0] {
        VolatilityState::Normal
    } else {
        VolatilityState::Dormant
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
