//! VOLSCAN: multi-estimator volatility scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod market_data;
pub mod volatility;
pub mod engine;
pub mod storage;
