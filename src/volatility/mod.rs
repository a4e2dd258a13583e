//! Volatility analytics.
//!
//! The [`ProfileEngine`] pipelines one symbol's bar window through the
//! metrics calculator, the state classifier, the regime detector and the
//! opportunity scorer, producing a complete [`VolatilityProfile`].

pub mod classifier;
pub mod history;
pub mod metrics;
pub mod regime;
pub mod scorer;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::types::{Bar, ScanError, Ticker, TradingOpportunity, VolatilityProfile};
use classifier::VolatilityClassifier;
use history::HistoryBuffer;
use metrics::VolatilityMetricsCalculator;
use regime::RegimeDetector;
use scorer::OpportunityScorer;

pub struct ProfileEngine {
    calculator: VolatilityMetricsCalculator,
    classifier: VolatilityClassifier,
    regime: RegimeDetector,
    scorer: OpportunityScorer,
}

impl ProfileEngine {
    pub fn new(
        calculator: VolatilityMetricsCalculator,
        classifier: VolatilityClassifier,
        regime: RegimeDetector,
        scorer: OpportunityScorer,
    ) -> Self {
        Self {
            calculator,
            classifier,
            regime,
            scorer,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ScanError> {
        let interval = config.scanner.interval_minutes()?;
        Ok(Self::new(
            VolatilityMetricsCalculator::new(config.metrics.clone(), interval),
            VolatilityClassifier::new(config.classifier.clone()),
            RegimeDetector::new(config.regime.clone()),
            OpportunityScorer::new(config.scoring.clone(), config.opportunity.clone()),
        ))
    }

    pub fn scorer(&self) -> &OpportunityScorer {
        &self.scorer
    }

    /// Build a profile for `symbol` from its bar window and ticker.
    ///
    /// `history` is the symbol's trailing 1h volatility history *before*
    /// this reading; the caller records `profile.short_vol.h1` afterwards.
    pub fn build_profile(
        &self,
        symbol: &str,
        bars: &[Bar],
        ticker: &Ticker,
        history: &HistoryBuffer,
        now: DateTime<Utc>,
    ) -> Result<VolatilityProfile, ScanError> {
        let m = self.calculator.compute(bars)?;
        let class = self.classifier.classify(m.short_vol.h1, history, m.short_vol.d1);
        let condition = self.regime.detect(bars, &m.short_vol);

        let last_price = if ticker.last > 0.0 && ticker.last.is_finite() {
            ticker.last
        } else {
            m.current_price
        };

        let mut profile = VolatilityProfile {
            symbol: symbol.to_string(),
            timestamp: now,
            last_price,
            atr: m.atr,
            atr_percent: m.atr_percent,
            historical_vol: m.historical_vol,
            parkinson_vol: m.parkinson_vol,
            garman_klass_vol: m.garman_klass_vol,
            yang_zhang_vol: m.yang_zhang_vol,
            short_vol: m.short_vol,
            price_change: m.price_change,
            percentile: class.percentile,
            volume_24h: ticker.quote_volume.max(0.0),
            volume_spike_ratio: m.volume_spike_ratio,
            volume_volatility_correlation: m.volume_volatility_correlation,
            day_range_pct: m.day_range_pct,
            bid_ask_spread_pct: ticker.spread_pct(),
            volatility_state: class.state,
            market_condition: condition,
            breakout_detected: class.breakout_detected,
            breakout_strength: class.breakout_strength,
            volatility_score: self.scorer.volatility_score(m.short_vol.h1),
            opportunity_score: 0.0,
            risk_score: self.scorer.risk_score(m.atr_percent),
        };
        profile.opportunity_score = self.scorer.score(&profile);
        Ok(profile)
    }

    pub fn identify_opportunity(
        &self,
        profile: &VolatilityProfile,
        now: DateTime<Utc>,
    ) -> Option<TradingOpportunity> {
        self.scorer.opportunity_for(profile, now)
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
