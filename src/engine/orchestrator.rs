//! Scan orchestrator: drives one full cycle.
//!
//! Each cycle plans the symbols to scan (every active symbol, a rotating
//! slice of candidates, and occasionally a slice of dormant symbols), fans
//! the fetch-and-profile work out through the [`PairScanner`], then folds
//! the results back in a single-threaded step: history, latest profiles,
//! opportunities, universe membership and the cycle record.
//!
//! A symbol that fails keeps its last good profile until it scans again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, UniverseConfig};
use crate::engine::accountant::{CycleRecord, PerformanceSummary, ScanAccountant};
use crate::engine::opportunities::OpportunityBook;
use crate::engine::scanner::{PairScanner, ScanOutcome};
use crate::engine::universe::{PairUniverseManager, ScanPlan, UniverseSnapshot};
use crate::market_data::MarketDataProvider;
use crate::types::{ScanError, ScanHealth, TradingOpportunity, VolatilityProfile};
use crate::volatility::history::{HistoryBuffer, HistoryStore};
use crate::volatility::ProfileEngine;

// ---------------------------------------------------------------------------
// Status and export
// ---------------------------------------------------------------------------

/// Read-only status for dashboards and health checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanStatus {
    pub running: bool,
    pub scan_count: u64,
    pub last_scan: Option<DateTime<Utc>>,
    pub health: ScanHealth,
    pub active_pairs: Vec<String>,
    pub candidate_pairs: Vec<String>,
    pub dormant_pairs: Vec<String>,
    pub blacklisted_pairs: Vec<String>,
    /// Opportunities detected since startup
    pub opportunities_found: u64,
    /// Opportunities live at the time of the snapshot
    pub current_opportunities: usize,
    /// Symbols with a profile on record
    pub monitored_pairs: usize,
    pub performance: PerformanceSummary,
}

/// Full snapshot written to disk after each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanExport {
    pub timestamp: DateTime<Utc>,
    pub status: ScanStatus,
    /// Latest profile per symbol, best opportunity score first
    pub profiles: Vec<VolatilityProfile>,
    /// Live opportunities, highest priority first
    pub opportunities: Vec<TradingOpportunity>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ScanOrchestrator {
    provider: Arc<dyn MarketDataProvider>,
    scanner: PairScanner,
    universe: PairUniverseManager,
    universe_config: UniverseConfig,
    history: HistoryStore,
    profiles: HashMap<String, VolatilityProfile>,
    opportunities: OpportunityBook,
    accountant: ScanAccountant,
    cycle_count: u64,
    running: bool,
    last_scan: Option<DateTime<Utc>>,
    bootstrapped: bool,
}

impl ScanOrchestrator {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        config: &AppConfig,
    ) -> Result<Self, ScanError> {
        let engine = ProfileEngine::from_config(config)?;
        let scanner = PairScanner::new(provider.clone(), engine, &config.scanner);

        let mut universe =
            PairUniverseManager::new(config.universe.clone(), ScanPlan::from(&config.scanner));
        for symbol in &config.universe.blacklist {
            universe.blacklist(symbol);
        }

        Ok(Self {
            provider,
            scanner,
            universe,
            universe_config: config.universe.clone(),
            history: HistoryStore::new(config.scanner.history_capacity),
            profiles: HashMap::new(),
            opportunities: OpportunityBook::new(),
            accountant: ScanAccountant::new(config.scanner.failure_escalation_cycles),
            cycle_count: 0,
            running: false,
            last_scan: None,
            bootstrapped: false,
        })
    }

    // -- Bootstrap -----------------------------------------------------------

    /// Seed the universe from the static symbol list, or by ranking every
    /// listed ticker in the quote asset by 24h volume.
    pub async fn bootstrap(&mut self) -> Result<UniverseSnapshot, ScanError> {
        let ranked = if self.universe_config.symbols.is_empty() {
            self.discover().await?
        } else {
            self.universe_config.symbols.clone()
        };

        if ranked.is_empty() {
            return Err(ScanError::fetch(
                self.provider.name(),
                "no symbols passed the discovery filter",
            ));
        }

        let snapshot = self.universe.seed(&ranked);
        self.bootstrapped = true;
        Ok(snapshot)
    }

    async fn discover(&self) -> Result<Vec<String>, ScanError> {
        let quote = self.universe_config.quote_asset.as_str();
        let min_volume = self.universe_config.min_volume_usd;

        let mut tickers: Vec<_> = self
            .provider
            .fetch_tickers()
            .await?
            .into_iter()
            .filter(|t| t.symbol.ends_with(quote) && t.symbol.len() > quote.len())
            .filter(|t| t.quote_volume.is_finite() && t.quote_volume >= min_volume)
            .collect();
        tickers.sort_by(|a, b| {
            b.quote_volume
                .total_cmp(&a.quote_volume)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        info!(
            provider = self.provider.name(),
            eligible = tickers.len(),
            quote,
            min_volume,
            "Universe discovery complete"
        );

        Ok(tickers
            .into_iter()
            .take(self.universe_config.max_universe)
            .map(|t| t.symbol)
            .collect())
    }

    // -- Cycle ---------------------------------------------------------------

    /// Run one cycle stamped with the current time.
    pub async fn run_cycle(&mut self) -> CycleRecord {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle; every profile and opportunity produced is stamped `now`.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleRecord {
        let clock = Instant::now();
        self.cycle_count += 1;
        let cycle = self.cycle_count;
        self.last_scan = Some(now);

        if !self.bootstrapped {
            if let Err(e) = self.bootstrap().await {
                warn!(cycle, error = %e, "Universe bootstrap failed, retrying next cycle");
                let record = CycleRecord {
                    cycle_number: cycle,
                    started_at: now,
                    duration_ms: clock.elapsed().as_millis() as u64,
                    attempted: 0,
                    succeeded: 0,
                    failed: 0,
                    skipped: 0,
                    opportunities: 0,
                    error: Some(e.to_string()),
                };
                self.accountant.record(record.clone());
                return record;
            }
        }

        let plan = self.universe.plan_cycle(cycle);
        debug!(cycle, symbols = plan.len(), "Scan planned");

        let results = self.scanner.scan_all(&plan, &self.history, now).await;

        let mut fresh: Vec<VolatilityProfile> = Vec::with_capacity(results.len());
        let mut failed = 0;
        let mut skipped = 0;
        for result in results {
            match result.outcome {
                ScanOutcome::Profiled(profile) => {
                    self.history.record(&result.symbol, profile.short_vol.h1);
                    fresh.push(*profile);
                }
                ScanOutcome::FetchFailed(e) => {
                    failed += 1;
                    warn!(symbol = %result.symbol, error = %e, "Market data fetch failed");
                }
                ScanOutcome::Skipped(e) => {
                    skipped += 1;
                    debug!(symbol = %result.symbol, error = %e, "Symbol skipped");
                }
            }
        }
        fresh.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let mut found = 0;
        for profile in &fresh {
            if let Some(opportunity) = self.scanner.engine().identify_opportunity(profile, now) {
                info!(%opportunity, "Opportunity detected");
                self.opportunities.record(opportunity);
                found += 1;
            }
        }

        self.universe.update(&fresh);

        let succeeded = fresh.len();
        for profile in fresh {
            self.profiles.insert(profile.symbol.clone(), profile);
        }

        let record = CycleRecord {
            cycle_number: cycle,
            started_at: now,
            duration_ms: clock.elapsed().as_millis() as u64,
            attempted: plan.len(),
            succeeded,
            failed,
            skipped,
            opportunities: found,
            error: None,
        };
        self.accountant.record(record.clone());

        info!(
            cycle,
            scanned = record.attempted,
            succeeded,
            failed,
            skipped,
            opportunities = found,
            duration_ms = record.duration_ms,
            active = self.universe.active().len(),
            candidates = self.universe.candidates().len(),
            dormant = self.universe.dormant().len(),
            health = %self.accountant.health(),
            "Scan cycle complete"
        );

        record
    }

    // -- Manual overrides ------------------------------------------------------

    /// Stop scanning `symbol` and drop its profile.
    pub fn blacklist(&mut self, symbol: &str) {
        self.universe.blacklist(symbol);
        self.profiles.remove(symbol);
    }

    pub fn unblacklist(&mut self, symbol: &str) -> bool {
        self.universe.unblacklist(symbol)
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    // -- Accessors -------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn scan_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn health(&self) -> ScanHealth {
        self.accountant.health()
    }

    pub fn universe(&self) -> &PairUniverseManager {
        &self.universe
    }

    pub fn profile(&self, symbol: &str) -> Option<&VolatilityProfile> {
        self.profiles.get(symbol)
    }

    /// Latest profile per symbol, best opportunity score first.
    pub fn profiles(&self) -> Vec<VolatilityProfile> {
        let mut profiles: Vec<VolatilityProfile> = self.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| {
            b.opportunity_score
                .total_cmp(&a.opportunity_score)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        profiles
    }

    pub fn history(&self, symbol: &str) -> &HistoryBuffer {
        self.history.get(symbol)
    }

    pub fn live_opportunities_at(&self, now: DateTime<Utc>) -> Vec<TradingOpportunity> {
        self.opportunities.live_at(now)
    }

    /// Top `limit` opportunities still live now.
    pub fn top_opportunities(&self, limit: usize) -> Vec<TradingOpportunity> {
        self.opportunities.top_at(Utc::now(), limit)
    }

    pub fn opportunity_book(&self) -> &OpportunityBook {
        &self.opportunities
    }

    /// (symbol, volatility score) for every profiled symbol, most volatile first.
    pub fn volatility_rankings(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .profiles
            .values()
            .map(|p| (p.symbol.clone(), p.volatility_score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    pub fn status(&self) -> ScanStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> ScanStatus {
        let snapshot = self.universe.snapshot();
        ScanStatus {
            running: self.running,
            scan_count: self.cycle_count,
            last_scan: self.last_scan,
            health: self.accountant.health(),
            active_pairs: snapshot.active,
            candidate_pairs: snapshot.candidates,
            dormant_pairs: snapshot.dormant,
            blacklisted_pairs: snapshot.blacklisted,
            opportunities_found: self.opportunities.total_found(),
            current_opportunities: self.opportunities.live_at(now).len(),
            monitored_pairs: self.profiles.len(),
            performance: self.accountant.summary(),
        }
    }

    pub fn export(&self) -> ScanExport {
        self.export_at(Utc::now())
    }

    pub fn export_at(&self, now: DateTime<Utc>) -> ScanExport {
        ScanExport {
            timestamp: now,
            status: self.status_at(now),
            profiles: self.profiles(),
            opportunities: self.opportunities.live_at(now),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
