//! Pair universe manager.
//!
//! Partitions the tracked symbols into scan-frequency tiers:
//!
//! - **active**: scanned every cycle, capped at `max_active`
//! - **candidate**: scanned in a rotating slice each cycle
//! - **dormant**: scanned in a rotating slice every `dormant_scan_every` cycles
//! - **blacklisted**: never scanned, manual override only
//!
//! Membership changes are driven by each symbol's trailing score history,
//! not the latest reading alone, so single-cycle noise near a watermark
//! cannot flip a symbol in and out of the active set.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ScannerConfig, UniverseConfig};
use crate::types::{Tier, VolatilityProfile};

// ---------------------------------------------------------------------------
// Scan planning
// ---------------------------------------------------------------------------

/// How much of the non-active universe is scanned per cycle.
#[derive(Debug, Clone, Copy)]
pub struct ScanPlan {
    pub candidate_slice: usize,
    pub dormant_slice: usize,
    pub dormant_scan_every: u64,
}

impl From<&ScannerConfig> for ScanPlan {
    fn from(cfg: &ScannerConfig) -> Self {
        Self {
            candidate_slice: cfg.candidate_slice,
            dormant_slice: cfg.dormant_slice,
            dormant_scan_every: cfg.dormant_scan_every.max(1),
        }
    }
}

impl Default for ScanPlan {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Membership snapshot
// ---------------------------------------------------------------------------

/// Sorted membership of every tier at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    pub active: Vec<String>,
    pub candidates: Vec<String>,
    pub dormant: Vec<String>,
    pub blacklisted: Vec<String>,
}

// ---------------------------------------------------------------------------
// Score trail
// ---------------------------------------------------------------------------

/// Bounded per-symbol history of observed opportunity scores.
#[derive(Debug, Clone, Default)]
struct ScoreTrail {
    scores: VecDeque<f64>,
    last_seen: Option<DateTime<Utc>>,
}

impl ScoreTrail {
    /// Record a reading taken at `at`. Readings not newer than the last one
    /// are ignored; returns whether the reading was recorded.
    fn observe(&mut self, at: DateTime<Utc>, score: f64, capacity: usize) -> bool {
        if self.last_seen.is_some_and(|seen| at <= seen) {
            return false;
        }
        self.last_seen = Some(at);
        if self.scores.len() == capacity {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
        true
    }

    /// Whether the last `window` readings all sit below `threshold`.
    fn sustained_below(&self, threshold: f64, window: usize) -> bool {
        self.scores.len() >= window && self.scores.iter().rev().take(window).all(|s| *s < threshold)
    }

    /// Whether the last `window` readings all reach `threshold`.
    fn sustained_at_least(&self, threshold: f64, window: usize) -> bool {
        self.scores.len() >= window && self.scores.iter().rev().take(window).all(|s| *s >= threshold)
    }

    /// Mean of the last `window` readings (fewer if the trail is shorter).
    fn trailing_mean(&self, window: usize) -> f64 {
        let n = window.min(self.scores.len());
        if n == 0 {
            return 0.0;
        }
        self.scores.iter().rev().take(n).sum::<f64>() / n as f64
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct PairUniverseManager {
    config: UniverseConfig,
    plan: ScanPlan,
    active: BTreeSet<String>,
    candidates: BTreeSet<String>,
    dormant: BTreeSet<String>,
    blacklisted: BTreeSet<String>,
    trails: HashMap<String, ScoreTrail>,
    candidate_cursor: usize,
    dormant_cursor: usize,
}

impl PairUniverseManager {
    pub fn new(config: UniverseConfig, plan: ScanPlan) -> Self {
        let blacklisted = config.blacklist.iter().cloned().collect();
        Self {
            config,
            plan,
            active: BTreeSet::new(),
            candidates: BTreeSet::new(),
            dormant: BTreeSet::new(),
            blacklisted,
            trails: HashMap::new(),
            candidate_cursor: 0,
            dormant_cursor: 0,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn active(&self) -> &BTreeSet<String> {
        &self.active
    }

    pub fn candidates(&self) -> &BTreeSet<String> {
        &self.candidates
    }

    pub fn dormant(&self) -> &BTreeSet<String> {
        &self.dormant
    }

    pub fn blacklisted(&self) -> &BTreeSet<String> {
        &self.blacklisted
    }

    /// Number of tracked (non-blacklisted) symbols.
    pub fn tracked(&self) -> usize {
        self.active.len() + self.candidates.len() + self.dormant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked() == 0
    }

    pub fn tier_of(&self, symbol: &str) -> Option<Tier> {
        if self.blacklisted.contains(symbol) {
            Some(Tier::Blacklisted)
        } else if self.active.contains(symbol) {
            Some(Tier::Active)
        } else if self.candidates.contains(symbol) {
            Some(Tier::Candidate)
        } else if self.dormant.contains(symbol) {
            Some(Tier::Dormant)
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> UniverseSnapshot {
        UniverseSnapshot {
            active: self.active.iter().cloned().collect(),
            candidates: self.candidates.iter().cloned().collect(),
            dormant: self.dormant.iter().cloned().collect(),
            blacklisted: self.blacklisted.iter().cloned().collect(),
        }
    }

    // -- Seeding ------------------------------------------------------------

    /// Replace the universe with `ranked` (best first). The first
    /// `initial_active` symbols (capped at `max_active`) become active, the
    /// rest candidates, up to `max_universe` in total.
    pub fn seed(&mut self, ranked: &[String]) -> UniverseSnapshot {
        self.active.clear();
        self.candidates.clear();
        self.dormant.clear();
        self.candidate_cursor = 0;
        self.dormant_cursor = 0;

        let initial = self.config.initial_active.min(self.config.max_active);
        let mut seen = BTreeSet::new();
        for symbol in ranked
            .iter()
            .filter(|s| !self.blacklisted.contains(s.as_str()))
            .filter(|s| seen.insert(s.as_str()))
            .take(self.config.max_universe)
        {
            if self.active.len() < initial {
                self.active.insert(symbol.clone());
            } else {
                self.candidates.insert(symbol.clone());
            }
        }

        info!(
            active = self.active.len(),
            candidates = self.candidates.len(),
            "Pair universe seeded"
        );
        self.snapshot()
    }

    // -- Per-cycle update ----------------------------------------------------

    /// Apply this cycle's profiles and return the new membership.
    ///
    /// Each profile is recorded once per symbol and timestamp, so applying
    /// the same profiles again changes nothing.
    pub fn update(&mut self, profiles: &[VolatilityProfile]) -> UniverseSnapshot {
        let capacity = self
            .config
            .demote_window
            .max(self.config.dormant_window)
            .max(self.config.displace_window)
            .max(1);
        let mut promotions: Vec<(String, f64)> = Vec::new();

        for profile in profiles {
            let symbol = profile.symbol.as_str();
            if self.blacklisted.contains(symbol) {
                continue;
            }
            let score = profile.opportunity_score;
            let fresh = self
                .trails
                .entry(symbol.to_string())
                .or_default()
                .observe(profile.timestamp, score, capacity);
            if !fresh {
                continue;
            }

            match self.tier_of(symbol) {
                None => {
                    if self.tracked() < self.config.max_universe {
                        self.candidates.insert(symbol.to_string());
                        debug!(symbol, score, "New symbol added as candidate");
                        if score >= self.config.promote_score {
                            promotions.push((symbol.to_string(), score));
                        }
                    }
                }
                Some(Tier::Dormant) => {
                    if score >= self.config.revive_score {
                        self.dormant.remove(symbol);
                        self.candidates.insert(symbol.to_string());
                        info!(symbol, score, "Dormant symbol revived to candidate");
                    }
                }
                Some(Tier::Active) => {
                    if self.trail_below(symbol, self.config.demote_score, self.config.demote_window) {
                        self.active.remove(symbol);
                        self.dormant.insert(symbol.to_string());
                        info!(symbol, score, "Active symbol demoted to dormant");
                    }
                }
                Some(Tier::Candidate) => {
                    if score >= self.config.promote_score {
                        promotions.push((symbol.to_string(), score));
                    } else if self.trail_below(
                        symbol,
                        self.config.dormant_score,
                        self.config.dormant_window,
                    ) {
                        self.candidates.remove(symbol);
                        self.dormant.insert(symbol.to_string());
                        debug!(symbol, score, "Candidate parked as dormant");
                    }
                }
                Some(Tier::Blacklisted) => {}
            }
        }

        promotions.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (symbol, score) in promotions {
            self.promote(&symbol, score);
        }
        self.enforce_cap();

        self.snapshot()
    }

    fn trail_below(&self, symbol: &str, threshold: f64, window: usize) -> bool {
        self.trails
            .get(symbol)
            .is_some_and(|t| t.sustained_below(threshold, window))
    }

    /// Mean score over the displacement window.
    fn standing(&self, symbol: &str) -> f64 {
        self.trails
            .get(symbol)
            .map(|t| t.trailing_mean(self.config.displace_window))
            .unwrap_or(0.0)
    }

    /// Lowest-ranked active member: lowest standing, ties broken by the
    /// later symbol name.
    fn weakest_active(&self) -> Option<(String, f64)> {
        self.active
            .iter()
            .map(|s| (s.clone(), self.standing(s)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
    }

    fn promote(&mut self, symbol: &str, score: f64) {
        if !self.candidates.contains(symbol) {
            return;
        }
        if self.active.len() < self.config.max_active {
            self.candidates.remove(symbol);
            self.active.insert(symbol.to_string());
            info!(symbol, score, "Candidate promoted to active");
            return;
        }
        // A full set only changes hands on a sustained run above the watermark
        // and a better standing than the weakest member.
        let window = self.config.displace_window;
        let sustained = self
            .trails
            .get(symbol)
            .is_some_and(|t| t.sustained_at_least(self.config.promote_score, window));
        if !sustained {
            return;
        }
        let standing = self.standing(symbol);
        if let Some((weakest, weakest_score)) = self.weakest_active() {
            if standing > weakest_score {
                self.active.remove(&weakest);
                self.candidates.insert(weakest.clone());
                self.candidates.remove(symbol);
                self.active.insert(symbol.to_string());
                info!(
                    symbol,
                    score,
                    standing,
                    replaced = %weakest,
                    replaced_standing = weakest_score,
                    "Candidate promoted, displacing weakest active"
                );
            }
        }
    }

    /// Keep only the top `max_active` active symbols; the rest become candidates.
    fn enforce_cap(&mut self) {
        while self.active.len() > self.config.max_active {
            let Some((weakest, _)) = self.weakest_active() else {
                break;
            };
            self.active.remove(&weakest);
            self.candidates.insert(weakest);
        }
    }

    // -- Scan planning ---------------------------------------------------------

    /// Symbols to scan in `cycle`: every active symbol, the next slice of
    /// candidates, and on dormant cycles the next slice of dormant symbols.
    pub fn plan_cycle(&mut self, cycle: u64) -> Vec<String> {
        let mut plan: Vec<String> = self.active.iter().cloned().collect();

        let (slice, cursor) =
            rotate_slice(&self.candidates, self.candidate_cursor, self.plan.candidate_slice);
        self.candidate_cursor = cursor;
        plan.extend(slice);

        if cycle % self.plan.dormant_scan_every == 0 {
            let (slice, cursor) =
                rotate_slice(&self.dormant, self.dormant_cursor, self.plan.dormant_slice);
            self.dormant_cursor = cursor;
            plan.extend(slice);
        }

        plan
    }

    // -- Manual overrides ------------------------------------------------------

    /// Exclude a symbol from scanning until unblacklisted.
    pub fn blacklist(&mut self, symbol: &str) {
        self.active.remove(symbol);
        self.candidates.remove(symbol);
        self.dormant.remove(symbol);
        if self.blacklisted.insert(symbol.to_string()) {
            info!(symbol, "Symbol blacklisted");
        }
    }

    /// Return a blacklisted symbol to the candidate tier.
    pub fn unblacklist(&mut self, symbol: &str) -> bool {
        if self.blacklisted.remove(symbol) {
            self.candidates.insert(symbol.to_string());
            info!(symbol, "Symbol removed from blacklist");
            true
        } else {
            false
        }
    }
}

/// Take up to `n` items from `set` starting at `cursor` (wrapping), and
/// return them with the advanced cursor.
fn rotate_slice(set: &BTreeSet<String>, cursor: usize, n: usize) -> (Vec<String>, usize) {
    if set.is_empty() || n == 0 {
        return (Vec::new(), 0);
    }
    let n = n.min(set.len());
    let start = cursor % set.len();
    let slice = set.iter().cycle().skip(start).take(n).cloned().collect();
    (slice, (start + n) % set.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
