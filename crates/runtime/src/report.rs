//! Heap report
//!
//! Dumps collector KPIs on request (typically at interpreter exit),
//! controlled by the `CELLMEM_REPORT` env var:
//! - Unset → no report, zero cost
//! - `1` → human-readable to stderr
//! - `json` → JSON to stderr
//! - `json:/path` → JSON to file
//!
//! ## Feature Flag
//!
//! This module requires the `diagnostics` feature (enabled by default).
//! When disabled, `report_stub.rs` provides a no-op `emit_report`.

#![cfg(feature = "diagnostics")]

use crate::collector::GcStats;
use crate::heap::Heap;
use cellmem_core::memory_registry;
use serde::Serialize;
use std::io::Write;
use std::sync::OnceLock;

// =============================================================================
// Report Configuration (parsed from CELLMEM_REPORT env var)
// =============================================================================

/// Output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

/// Output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stderr,
    File(String),
}

/// Parsed report configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub destination: ReportDestination,
}

impl ReportConfig {
    /// Parse a `CELLMEM_REPORT` value
    pub fn parse(val: &str) -> Option<Self> {
        match val {
            "" | "0" => None,
            "1" => Some(ReportConfig {
                format: ReportFormat::Human,
                destination: ReportDestination::Stderr,
            }),
            "json" => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::Stderr,
            }),
            s if s.starts_with("json:") => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File(s[5..].to_string()),
            }),
            _ => {
                tracing::warn!("CELLMEM_REPORT='{}' not recognized, ignoring", val);
                None
            }
        }
    }

    /// Parse from the CELLMEM_REPORT environment variable
    pub fn from_env() -> Option<Self> {
        let val = std::env::var("CELLMEM_REPORT").ok()?;
        Self::parse(&val)
    }
}

static REPORT_CONFIG: OnceLock<Option<ReportConfig>> = OnceLock::new();

fn get_report_config() -> &'static Option<ReportConfig> {
    REPORT_CONFIG.get_or_init(ReportConfig::from_env)
}

// =============================================================================
// Report Data
// =============================================================================

/// Collected metrics for the report
#[derive(Debug, Serialize)]
pub struct ReportData {
    pub heap_id: u64,
    pub collections: u64,
    pub footprint_bytes: usize,
    pub data_after_gc: usize,
    pub gc_threshold: usize,
    pub idle_gc_threshold: usize,
    #[serde(flatten)]
    pub stats: GcStats,
    pub active_heaps: usize,
    pub total_footprint_bytes: u64,
}

/// Collect all metrics for one heap plus the process-wide totals
pub fn collect_report_data(heap: &Heap) -> ReportData {
    let totals = memory_registry().aggregate_stats();
    ReportData {
        heap_id: heap.heap_id(),
        collections: heap.collections(),
        footprint_bytes: heap.footprint(),
        data_after_gc: heap.data_after_gc(),
        gc_threshold: heap.gc_threshold(),
        idle_gc_threshold: heap.idle_gc_threshold(),
        stats: heap.stats(),
        active_heaps: totals.active_heaps,
        total_footprint_bytes: totals.footprint_bytes,
    }
}

// =============================================================================
// Formatting
// =============================================================================

pub fn format_human(data: &ReportData) -> String {
    let mut out = String::new();
    out.push_str("=== CELLMEM REPORT ===\n");
    out.push_str(&format!("Heap:            {}\n", data.heap_id));
    out.push_str(&format!("Collections:     {}\n", data.collections));
    out.push_str(&format!("Footprint:       {} bytes\n", data.footprint_bytes));
    out.push_str(&format!(
        "Since last gc:   {} bytes (threshold {} / idle {})\n",
        data.data_after_gc, data.gc_threshold, data.idle_gc_threshold
    ));
    out.push_str(&format!(
        "Pairs:           {} live, {} free\n",
        data.stats.live_pairs, data.stats.free_pairs
    ));
    out.push_str(&format!(
        "Symbols:         {} live, {} free\n",
        data.stats.live_symbols, data.stats.free_symbols
    ));
    out.push_str(&format!(
        "Strings:         {} ({} bytes)\n",
        data.stats.live_strings, data.stats.string_bytes
    ));
    out.push_str(&format!("Vector slots:    {}\n", data.stats.vector_slots));
    out.push_str(&format!(
        "All heaps:       {} ({} bytes)\n",
        data.active_heaps, data.total_footprint_bytes
    ));
    out.push_str("======================\n");
    out
}

#[cfg(feature = "report-json")]
pub fn format_json(data: &ReportData) -> String {
    serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(not(feature = "report-json"))]
pub fn format_json(data: &ReportData) -> String {
    tracing::warn!(
        "CELLMEM_REPORT=json requires the 'report-json' feature. Falling back to human format."
    );
    format_human(data)
}

// =============================================================================
// Emit
// =============================================================================

/// Write a report for `heap` as configured
pub fn write_report(heap: &Heap, config: &ReportConfig) {
    let data = collect_report_data(heap);

    let output = match config.format {
        ReportFormat::Human => format_human(&data),
        ReportFormat::Json => format_json(&data),
    };

    match &config.destination {
        ReportDestination::Stderr => {
            let _ = std::io::stderr().write_all(output.as_bytes());
        }
        ReportDestination::File(path) => {
            if let Ok(mut f) = std::fs::File::create(path) {
                let _ = f.write_all(output.as_bytes());
            } else {
                tracing::warn!("could not write report to {}", path);
                let _ = std::io::stderr().write_all(output.as_bytes());
            }
        }
    }
}

/// Report on `heap` if `CELLMEM_REPORT` asks for it
pub fn emit_report(heap: &Heap) {
    if let Some(config) = get_report_config() {
        write_report(heap, config);
    }
}

// =============================================================================
// Tests
// =============================================================================
