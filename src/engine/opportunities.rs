//! Live opportunity book.
//!
//! Holds the latest opportunity per symbol plus a bounded history of
//! everything detected. Expired entries are never deleted eagerly: readers
//! filter by expiry at query time, and stale entries are compacted away
//! only when a new opportunity is recorded.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::types::TradingOpportunity;

/// Detected opportunities kept in the history.
pub const OPPORTUNITY_HISTORY: usize = 1000;

#[derive(Debug, Default)]
pub struct OpportunityBook {
    live: HashMap<String, TradingOpportunity>,
    history: VecDeque<TradingOpportunity>,
    total_found: u64,
}

impl OpportunityBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new opportunity, superseding any earlier one for the same
    /// symbol.
    pub fn record(&mut self, opportunity: TradingOpportunity) {
        let now = opportunity.detected_at;
        self.live.retain(|_, o| o.is_live(now));

        if self.history.len() == OPPORTUNITY_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(opportunity.clone());
        self.total_found += 1;
        self.live.insert(opportunity.symbol.clone(), opportunity);
    }

    /// Live opportunities at `now`, highest priority first (ties by
    /// confidence, then symbol).
    pub fn live_at(&self, now: DateTime<Utc>) -> Vec<TradingOpportunity> {
        let mut live: Vec<TradingOpportunity> = self
            .live
            .values()
            .filter(|o| o.is_live(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        live
    }

    /// Top `limit` live opportunities at `now`.
    pub fn top_at(&self, now: DateTime<Utc>, limit: usize) -> Vec<TradingOpportunity> {
        let mut live = self.live_at(now);
        live.truncate(limit);
        live
    }

    pub fn history(&self) -> impl Iterator<Item = &TradingOpportunity> {
        self.history.iter()
    }

    pub fn total_found(&self) -> u64 {
        self.total_found
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
