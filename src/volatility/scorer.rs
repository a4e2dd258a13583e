//! Opportunity scorer.
//!
//! Turns a classified profile into a bounded 0–100 opportunity score and,
//! when the profile clears the gates, a directional [`TradingOpportunity`].
//!
//! The score is a weighted sum of four bounded contributions:
//!
//! | Component | Default weight | Driven by |
//! |-----------|----------------|-----------|
//! | state     | 40 | volatility state staircase |
//! | volume    | 20 | volume spike ratio staircase |
//! | regime    | 20 | market condition |
//! | signal    | 20 | volume/volatility correlation + percentile rank |
//!
//! The volatility and risk scores are plain scaled transforms used for
//! ranking only; they are not risk figures.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    Direction, MarketCondition, TradingOpportunity, VolatilityProfile, VolatilityState,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub state_weight: f64,
    pub volume_weight: f64,
    pub regime_weight: f64,
    pub signal_weight: f64,
    /// volatility_score = min(1h vol × scale, 100)
    pub volatility_score_scale: f64,
    /// risk_score = min(ATR% × scale, 100)
    pub risk_score_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            state_weight: 40.0,
            volume_weight: 20.0,
            regime_weight: 20.0,
            signal_weight: 20.0,
            volatility_score_scale: 1000.0,
            risk_score_scale: 10.0,
        }
    }
}

impl ScoringConfig {
    pub fn total_weight(&self) -> f64 {
        self.state_weight + self.volume_weight + self.regime_weight + self.signal_weight
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpportunityConfig {
    pub min_score: f64,
    /// A profile must reach either this 5m volatility...
    pub min_short_vol: f64,
    /// ...or this 1h volatility.
    pub min_hourly_vol: f64,
    /// Minimum 24h quote volume (USD)
    pub min_volume_usd: f64,
    pub ttl_minutes: i64,
    /// expected_move = ATR% × this multiple
    pub expected_move_atr_multiple: f64,
    pub risk_reward_ratio: f64,
    pub trend_confidence: f64,
    pub breakout_confidence: f64,
    /// Base confidence when only the volatility state (not the regime)
    /// signals a breakout
    pub state_breakout_confidence: f64,
    pub extreme_boost: f64,
    pub breakout_boost: f64,
    pub max_confidence: f64,
}

impl Default for OpportunityConfig {
    fn default() -> Self {
        Self {
            min_score: 60.0,
            min_short_vol: 0.01,
            min_hourly_vol: 0.05,
            min_volume_usd: 10_000_000.0,
            ttl_minutes: 60,
            expected_move_atr_multiple: 2.0,
            risk_reward_ratio: 2.5,
            trend_confidence: 0.7,
            breakout_confidence: 0.8,
            state_breakout_confidence: 0.6,
            extreme_boost: 1.1,
            breakout_boost: 1.2,
            max_confidence: 0.95,
        }
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Per-component contributions of an opportunity score.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreBreakdown {
    pub state: f64,
    pub volume: f64,
    pub regime: f64,
    pub signal: f64,
}

impl ScoreBreakdown {
    /// Sum of the contributions, clamped to [0, 100].
    pub fn total(&self) -> f64 {
        let sum = self.state + self.volume + self.regime + self.signal;
        if sum.is_finite() {
            sum.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

pub struct OpportunityScorer {
    scoring: ScoringConfig,
    opportunity: OpportunityConfig,
}

impl OpportunityScorer {
    pub fn new(scoring: ScoringConfig, opportunity: OpportunityConfig) -> Self {
        Self {
            scoring,
            opportunity,
        }
    }

    pub fn opportunity_config(&self) -> &OpportunityConfig {
        &self.opportunity
    }

    pub fn breakdown(&self, profile: &VolatilityProfile) -> ScoreBreakdown {
        let state = match profile.volatility_state {
            VolatilityState::Breakout => 1.0,
            VolatilityState::Extreme => 0.875,
            VolatilityState::High => 0.625,
            VolatilityState::Elevated => 0.375,
            VolatilityState::Normal | VolatilityState::Dormant => 0.0,
        };

        let spike = finite(profile.volume_spike_ratio);
        let volume = if spike >= 3.0 {
            1.0
        } else if spike >= 2.0 {
            0.75
        } else if spike >= 1.5 {
            0.5
        } else {
            0.0
        };

        let regime = match profile.market_condition {
            MarketCondition::Breakout => 1.0,
            MarketCondition::TrendingUp | MarketCondition::TrendingDown => 0.75,
            MarketCondition::Accumulation => 0.5,
            MarketCondition::Ranging
            | MarketCondition::Exhaustion
            | MarketCondition::Distribution => 0.0,
        };

        // Half the signal weight for correlation, half for percentile rank
        let corr = finite(profile.volume_volatility_correlation).abs();
        let corr_part = if corr > 0.7 {
            0.5
        } else if corr > 0.5 {
            0.25
        } else {
            0.0
        };
        let pct = finite(profile.percentile);
        let pct_part = if pct > 95.0 {
            0.5
        } else if pct > 90.0 {
            0.35
        } else if pct > 80.0 {
            0.2
        } else {
            0.0
        };

        ScoreBreakdown {
            state: bounded(state * self.scoring.state_weight, self.scoring.state_weight),
            volume: bounded(volume * self.scoring.volume_weight, self.scoring.volume_weight),
            regime: bounded(regime * self.scoring.regime_weight, self.scoring.regime_weight),
            signal: bounded(
                (corr_part + pct_part) * self.scoring.signal_weight,
                self.scoring.signal_weight,
            ),
        }
    }

    /// Opportunity score in [0, 100].
    pub fn score(&self, profile: &VolatilityProfile) -> f64 {
        self.breakdown(profile).total()
    }

    /// Scaled 1h volatility, capped at 100.
    pub fn volatility_score(&self, hourly_vol: f64) -> f64 {
        bounded(finite(hourly_vol) * self.scoring.volatility_score_scale, 100.0)
    }

    /// Scaled ATR percentage, capped at 100.
    pub fn risk_score(&self, atr_percent: f64) -> f64 {
        bounded(finite(atr_percent) * self.scoring.risk_score_scale, 100.0)
    }

    /// Form a trading opportunity from a scored profile, or `None` when the
    /// profile misses a gate or has no clear direction.
    pub fn opportunity_for(
        &self,
        profile: &VolatilityProfile,
        now: DateTime<Utc>,
    ) -> Option<TradingOpportunity> {
        let cfg = &self.opportunity;

        if profile.opportunity_score < cfg.min_score {
            return None;
        }
        if profile.short_vol.m5 < cfg.min_short_vol && profile.short_vol.h1 < cfg.min_hourly_vol {
            return None;
        }
        if profile.volume_24h < cfg.min_volume_usd {
            return None;
        }

        let (direction, base) = self.direction(profile)?;

        let boost = match profile.volatility_state {
            VolatilityState::Extreme => cfg.extreme_boost,
            VolatilityState::Breakout => cfg.breakout_boost,
            _ => 1.0,
        };
        let confidence = (base * boost).clamp(0.0, cfg.max_confidence);

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "volatility_state".to_string(),
            serde_json::json!(profile.volatility_state),
        );
        metadata.insert(
            "market_condition".to_string(),
            serde_json::json!(profile.market_condition),
        );
        metadata.insert(
            "volume_spike".to_string(),
            serde_json::json!(profile.volume_spike_ratio),
        );
        metadata.insert(
            "breakout_strength".to_string(),
            serde_json::json!(profile.breakout_strength),
        );

        Some(TradingOpportunity {
            id: Uuid::new_v4(),
            symbol: profile.symbol.clone(),
            detected_at: now,
            profile: profile.clone(),
            direction,
            confidence,
            expected_move: profile.atr_percent * cfg.expected_move_atr_multiple,
            risk_reward_ratio: cfg.risk_reward_ratio,
            priority: (profile.opportunity_score / 10.0).floor() as i32,
            expires_at: now + Duration::minutes(cfg.ttl_minutes),
            metadata,
        })
    }

    /// Entry direction and base confidence.
    ///
    /// Trending regimes follow the trend. A breakout (regime or state)
    /// follows the sign of the breakout bar's own move (the 5m change),
    /// falling back to the 1h change. Everything else has no clear direction.
    fn direction(&self, profile: &VolatilityProfile) -> Option<(Direction, f64)> {
        let cfg = &self.opportunity;
        match profile.market_condition {
            MarketCondition::TrendingUp => Some((Direction::Long, cfg.trend_confidence)),
            MarketCondition::TrendingDown => Some((Direction::Short, cfg.trend_confidence)),
            MarketCondition::Breakout => {
                breakout_direction(profile).map(|d| (d, cfg.breakout_confidence))
            }
            MarketCondition::Ranging
            | MarketCondition::Exhaustion
            | MarketCondition::Accumulation
            | MarketCondition::Distribution => {
                if profile.volatility_state == VolatilityState::Breakout {
                    breakout_direction(profile).map(|d| (d, cfg.state_breakout_confidence))
                } else {
                    None
                }
            }
        }
    }
}

fn breakout_direction(profile: &VolatilityProfile) -> Option<Direction> {
    let change = if profile.price_change.m5 != 0.0 {
        profile.price_change.m5
    } else {
        profile.price_change.h1
    };
    if change > 0.0 {
        Some(Direction::Long)
    } else if change < 0.0 {
        Some(Direction::Short)
    } else {
        None
    }
}

fn finite(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

fn bounded(x: f64, max: f64) -> f64 {
    finite(x).clamp(0.0, max.max(0.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
