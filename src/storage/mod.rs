//! Persistence layer.
//!
//! Saves and loads the scanner's JSON export (status, latest profiles and
//! live opportunities). Cycle performance records go to SQLite via
//! [`metrics::MetricsStore`]. Nothing here is needed for correctness
//! across restarts: a fresh process rebuilds everything from new scans.

pub mod metrics;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::orchestrator::ScanExport;

/// Write an export to `path` as pretty-printed JSON.
pub fn save_export(export: &ScanExport, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(export).context("Failed to serialise scan export")?;

    std::fs::write(path, &json).context(format!("Failed to write export to {path}"))?;

    debug!(
        path,
        profiles = export.profiles.len(),
        opportunities = export.opportunities.len(),
        "Export saved"
    );
    Ok(())
}

/// Load an export from `path`. Returns `None` if the file doesn't exist.
pub fn load_export(path: &str) -> Result<Option<ScanExport>> {
    if !Path::new(path).exists() {
        info!(path, "No export found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read export from {path}"))?;

    let export: ScanExport =
        serde_json::from_str(&json).context(format!("Failed to parse export from {path}"))?;

    info!(
        path,
        scan_count = export.status.scan_count,
        profiles = export.profiles.len(),
        "Export loaded from disk"
    );

    Ok(Some(export))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
