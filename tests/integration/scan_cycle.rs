//! End-to-end scan cycles against the in-memory provider.
//!
//! Drives the orchestrator through discovery, profiling, opportunity
//! detection, outages and export, and the universe manager through
//! the membership properties it must keep across cycles.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use volscan::config::AppConfig;
use volscan::engine::orchestrator::ScanOrchestrator;
use volscan::engine::universe::{PairUniverseManager, ScanPlan};
use volscan::storage;
use volscan::types::{Direction, MarketCondition, ScanHealth, VolatilityProfile, VolatilityState};
use volscan::volatility::history::HistoryBuffer;
use volscan::volatility::ProfileEngine;

use crate::mock_provider::{generate, ticker, MockProvider, Series};

fn orchestrator(provider: Arc<MockProvider>, config: &AppConfig) -> ScanOrchestrator {
    ScanOrchestrator::new(provider, config).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc::now()
}

/// A real profile for `symbol`, with its score overridden.
fn scored_profile(symbol: &str, score: f64, at: DateTime<Utc>) -> VolatilityProfile {
    let engine = ProfileEngine::from_config(&AppConfig::default()).unwrap();
    let mut profile = engine
        .build_profile(
            symbol,
            &generate(Series::Walk(5), 300),
            &ticker(symbol, 100.0, 5e7),
            &HistoryBuffer::new(16),
            at,
        )
        .unwrap();
    profile.opportunity_score = score;
    profile
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Orchestrator cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_cycle_discovers_and_profiles() {
    let provider = Arc::new(
        MockProvider::new()
            .with_symbol("BTCUSDT", Series::Walk(1), 5e9)
            .with_symbol("ETHUSDT", Series::Walk(2), 2e9)
            .with_symbol("SOLUSDT", Series::Walk(3), 6e8)
            .with_symbol("DUSTUSDT", Series::Walk(4), 2e5)
            .with_symbol("BTCBUSD", Series::Walk(5), 9e9),
    );
    let mut orch = orchestrator(provider.clone(), &AppConfig::default());

    let record = orch.run_cycle_at(t0()).await;
    assert!(record.error.is_none());
    assert_eq!(record.attempted, 3);
    assert_eq!(record.succeeded, 3);
    assert_eq!(provider.bar_calls(), 3);

    let status = orch.status();
    assert_eq!(status.scan_count, 1);
    assert_eq!(status.monitored_pairs, 3);
    assert_eq!(status.active_pairs, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    assert_eq!(status.health, ScanHealth::Healthy);
    assert!(status.last_scan.is_some());

    for profile in orch.profiles() {
        assert!((0.0..=100.0).contains(&profile.opportunity_score));
        assert!((0.0..=100.0).contains(&profile.percentile));
        assert!(profile.atr_percent >= 0.0);
        assert!(profile.bid_ask_spread_pct > 0.0);
    }
}

#[tokio::test]
async fn test_flat_market_is_quiet() {
    let provider = Arc::new(MockProvider::new().with_symbol("FLATUSDT", Series::Flat, 5e7));
    let mut orch = orchestrator(provider, &AppConfig::default());

    let start = t0();
    for i in 0..3 {
        let record = orch.run_cycle_at(start + Duration::minutes(i)).await;
        assert_eq!(record.opportunities, 0);
    }

    let profile = orch.profile("FLATUSDT").unwrap();
    assert_eq!(profile.atr, 0.0);
    assert_eq!(profile.historical_vol, 0.0);
    assert_eq!(profile.volatility_state, VolatilityState::Dormant);
    assert_eq!(profile.market_condition, MarketCondition::Ranging);
    assert!(!profile.breakout_detected);
    assert!(profile.opportunity_score < 20.0);
    assert!(orch.live_opportunities_at(start).is_empty());
}

#[tokio::test]
async fn test_breakout_after_calm_cycles() {
    let provider = Arc::new(MockProvider::new().with_symbol("HOTUSDT", Series::Calm, 2.5e7));
    let mut orch = orchestrator(provider.clone(), &AppConfig::default());

    let start = t0();
    for i in 0..12 {
        orch.run_cycle_at(start + Duration::minutes(i)).await;
    }
    assert_eq!(orch.history("HOTUSDT").len(), 12);
    assert!(orch.live_opportunities_at(start).is_empty());

    provider.set_series("HOTUSDT", Series::Breakout);
    let now = start + Duration::minutes(12);
    let record = orch.run_cycle_at(now).await;
    assert_eq!(record.opportunities, 1);

    let profile = orch.profile("HOTUSDT").unwrap();
    assert_eq!(profile.volatility_state, VolatilityState::Breakout);
    assert!(profile.breakout_detected);
    assert!(profile.opportunity_score >= 60.0);

    let live = orch.live_opportunities_at(now);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].direction, Direction::Long);
    assert_eq!(live[0].priority, (profile.opportunity_score / 10.0).floor() as i32);

    // Filtered at read time once expired
    assert!(orch.live_opportunities_at(now + Duration::minutes(60)).is_empty());
    assert_eq!(orch.status_at(now).opportunities_found, 1);
}

#[tokio::test]
async fn test_single_symbol_failure_does_not_abort_cycle() {
    let provider = Arc::new(
        MockProvider::new()
            .with_symbol("AUSDT", Series::Walk(1), 5e8)
            .with_symbol("BUSDT", Series::Walk(2), 4e8)
            .with_symbol("CUSDT", Series::Walk(3), 3e8),
    );
    let mut orch = orchestrator(provider.clone(), &AppConfig::default());
    let start = t0();

    orch.run_cycle_at(start).await;
    provider.fail_symbol("BUSDT");

    let later = start + Duration::minutes(1);
    let record = orch.run_cycle_at(later).await;
    assert_eq!(record.attempted, 3);
    assert_eq!(record.succeeded, 2);
    assert_eq!(record.failed, 1);
    assert_eq!(orch.health(), ScanHealth::Healthy);

    // Stale profile retained until the next successful scan
    assert_eq!(orch.profile("BUSDT").unwrap().timestamp, start);
    assert_eq!(orch.profile("AUSDT").unwrap().timestamp, later);

    provider.recover_symbol("BUSDT");
    let recovered = start + Duration::minutes(2);
    orch.run_cycle_at(recovered).await;
    assert_eq!(orch.profile("BUSDT").unwrap().timestamp, recovered);
}

#[tokio::test]
async fn test_outage_escalates_and_recovers() {
    let provider = Arc::new(
        MockProvider::new()
            .with_symbol("AUSDT", Series::Walk(1), 5e8)
            .with_symbol("BUSDT", Series::Walk(2), 4e8),
    );
    let mut orch = orchestrator(provider.clone(), &AppConfig::default());
    let start = t0();

    orch.run_cycle_at(start).await;
    provider.set_error("exchange unreachable");

    orch.run_cycle_at(start + Duration::minutes(1)).await;
    assert_eq!(orch.health(), ScanHealth::Degraded);
    orch.run_cycle_at(start + Duration::minutes(2)).await;
    assert_eq!(orch.health(), ScanHealth::Degraded);
    orch.run_cycle_at(start + Duration::minutes(3)).await;
    assert_eq!(orch.health(), ScanHealth::Unhealthy);

    // Profiles from before the outage are still served
    assert_eq!(orch.status().monitored_pairs, 2);

    provider.clear_error();
    let record = orch.run_cycle_at(start + Duration::minutes(4)).await;
    assert_eq!(record.succeeded, 2);
    assert_eq!(orch.health(), ScanHealth::Healthy);
}

#[tokio::test]
async fn test_bootstrap_outage_is_retried() {
    let provider = Arc::new(MockProvider::new().with_symbol("AUSDT", Series::Walk(1), 5e8));
    provider.set_error("DNS failure");
    let mut orch = orchestrator(provider.clone(), &AppConfig::default());

    let first = orch.run_cycle_at(t0()).await;
    assert!(first.error.is_some());
    assert!(!orch.is_bootstrapped());

    provider.clear_error();
    let second = orch.run_cycle_at(t0()).await;
    assert!(second.error.is_none());
    assert!(orch.is_bootstrapped());
    assert_eq!(second.succeeded, 1);
}

#[tokio::test]
async fn test_export_roundtrip() {
    let provider = Arc::new(
        MockProvider::new()
            .with_symbol("AUSDT", Series::Walk(7), 5e8)
            .with_symbol("HOTUSDT", Series::Calm, 2.5e7),
    );
    let mut orch = orchestrator(provider.clone(), &AppConfig::default());
    let start = t0();
    for i in 0..12 {
        orch.run_cycle_at(start + Duration::minutes(i)).await;
    }
    provider.set_series("HOTUSDT", Series::Breakout);
    let now = start + Duration::minutes(12);
    orch.run_cycle_at(now).await;

    let export = orch.export_at(now);
    assert_eq!(export.profiles.len(), 2);
    assert!(export.opportunities.iter().any(|o| o.symbol == "HOTUSDT"));

    let mut path = std::env::temp_dir();
    path.push(format!("volscan_it_export_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    storage::save_export(&export, &path).unwrap();
    let loaded = storage::load_export(&path).unwrap().unwrap();
    assert_eq!(loaded, export);

    std::fs::remove_file(&path).unwrap();
}

// ---------------------------------------------------------------------------
// Universe properties
// ---------------------------------------------------------------------------

#[test]
fn test_update_is_idempotent_and_capped() {
    let mut config = AppConfig::default();
    config.universe.max_active = 3;
    config.universe.initial_active = 2;
    let mut universe = PairUniverseManager::new(config.universe.clone(), ScanPlan::default());
    universe.seed(&symbols(&["A", "B", "C", "D", "E", "F"]));

    let start = t0();
    let cycle = |at: DateTime<Utc>| -> Vec<VolatilityProfile> {
        ["A", "B", "C", "D", "E", "F"]
            .iter()
            .enumerate()
            .map(|(i, s)| scored_profile(s, 60.0 + i as f64, at))
            .collect()
    };

    // The free seat fills at once; the full set changes hands only after
    // the displacement window.
    let first = universe.update(&cycle(start));
    assert_eq!(first.active, vec!["A", "B", "F"]);
    universe.update(&cycle(start + Duration::minutes(1)));

    let last = cycle(start + Duration::minutes(2));
    let settled = universe.update(&last);
    let replayed = universe.update(&last);
    assert_eq!(settled, replayed);
    assert_eq!(settled.active.len(), 3);
    // Highest scores hold the active seats
    assert_eq!(settled.active, vec!["D", "E", "F"]);
}

#[test]
fn test_full_active_set_holds_against_wobbling_challenger() {
    let mut config = AppConfig::default();
    config.universe.max_active = 3;
    config.universe.initial_active = 3;
    let mut universe = PairUniverseManager::new(config.universe, ScanPlan::default());
    universe.seed(&symbols(&["LEAD", "SECOND", "STEADY", "WOBBLE"]));
    assert!(universe.candidates().contains("WOBBLE"));

    let start = t0();
    let mut was_active = false;
    let mut changes = 0;
    for i in 0..12 {
        let at = start + Duration::minutes(i);
        let wobble = if i % 2 == 0 { 55.0 } else { 45.0 };
        universe.update(&[
            scored_profile("LEAD", 80.0, at),
            scored_profile("SECOND", 80.0, at),
            scored_profile("STEADY", 50.0, at),
            scored_profile("WOBBLE", wobble, at),
        ]);
        let is_active = universe.active().contains("WOBBLE");
        if is_active != was_active {
            changes += 1;
        }
        was_active = is_active;
    }
    assert!(changes <= 1, "active membership flipped {changes} times");
    assert_eq!(universe.active().len(), 3);
}

#[test]
fn test_alternating_scores_do_not_flap() {
    let mut universe =
        PairUniverseManager::new(AppConfig::default().universe, ScanPlan::default());
    universe.seed(&symbols(&["ANCHOR"]));
    // Join as a candidate by first sighting
    let start = t0();
    universe.update(&[scored_profile("WOBBLE", 40.0, start)]);
    assert!(universe.candidates().contains("WOBBLE"));

    let mut was_active = universe.active().contains("WOBBLE");
    let mut changes = 0;
    for i in 1..=24 {
        let score = if i % 2 == 0 { 55.0 } else { 25.0 };
        universe.update(&[scored_profile(
            "WOBBLE",
            score,
            start + Duration::minutes(i),
        )]);
        let is_active = universe.active().contains("WOBBLE");
        if is_active != was_active {
            changes += 1;
        }
        was_active = is_active;
    }
    assert!(changes <= 1, "active membership flipped {changes} times");
}
