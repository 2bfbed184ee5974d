//! Heap diagnostics for production debugging
//!
//! Provides a SIGQUIT (kill -3) handler that dumps memory statistics for
//! every live heap to stderr. The process keeps running.
//!
//! ## Usage
//!
//! ```bash
//! kill -3 <pid>
//! ```
//!
//! ## Signal Safety
//!
//! The dump does I/O and takes the stderr lock, which must not happen inside
//! a signal handler. A dedicated thread waits on signal-hook's iterator API
//! and does the dump from ordinary thread context. Heaps are single-threaded,
//! so the thread reads only the published stats registry, never a heap.

#![cfg(feature = "diagnostics")]

use cellmem_core::memory_registry;
use std::io::{self, Write};
use std::sync::Once;

static SIGNAL_HANDLER_INIT: Once = Once::new();

/// Most heaps listed individually
const HEAP_DISPLAY_LIMIT: usize = 20;

/// Install the SIGQUIT signal handler for diagnostics
///
/// Safe to call multiple times (idempotent).
pub fn install_signal_handler() {
    SIGNAL_HANDLER_INIT.call_once(|| {
        #[cfg(unix)]
        {
            use signal_hook::consts::SIGQUIT;
            use signal_hook::iterator::Signals;

            let mut signals = match Signals::new([SIGQUIT]) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("cannot install SIGQUIT handler: {}", e);
                    return;
                }
            };

            let spawned = std::thread::Builder::new()
                .name("cellmem-diagnostics".to_string())
                .spawn(move || {
                    for sig in signals.forever() {
                        if sig == SIGQUIT {
                            dump_diagnostics();
                        }
                    }
                });
            if let Err(e) = spawned {
                tracing::warn!("cannot start diagnostics thread: {}", e);
            }
        }

        #[cfg(not(unix))]
        {
            // No signals; dump_diagnostics() can still be called directly
        }
    });
}

/// Dump heap diagnostics to stderr
pub fn dump_diagnostics() {
    let mut out = io::stderr().lock();
    let _ = write_diagnostics(&mut out);
}

/// Write heap diagnostics to `out`
pub fn write_diagnostics(out: &mut dyn Write) -> io::Result<()> {
    let registry = memory_registry();
    let totals = registry.aggregate_stats();

    writeln!(out, "\n=== Cellmem Heap Diagnostics ===")?;
    writeln!(out, "Timestamp: {:?}", std::time::SystemTime::now())?;

    writeln!(out, "\n[Totals]")?;
    writeln!(out, "  Heaps:        {}", totals.active_heaps)?;
    writeln!(out, "  Footprint:    {}", format_bytes(totals.footprint_bytes))?;
    writeln!(
        out,
        "  Pairs:        {} live, {} free",
        totals.live_pairs, totals.free_pairs
    )?;
    writeln!(
        out,
        "  Strings:      {} ({})",
        totals.live_strings,
        format_bytes(totals.string_bytes)
    )?;
    writeln!(out, "  Vector slots: {}", totals.vector_slots)?;
    writeln!(out, "  Collections:  {}", totals.collections)?;
    if totals.overflow_count > 0 {
        writeln!(
            out,
            "  WARNING: {} heaps exceeded registry capacity (not tracked)",
            totals.overflow_count
        )?;
    }

    writeln!(out, "\n[Heaps]")?;
    writeln!(out, "  Registry capacity: {} slots", registry.capacity())?;
    let mut heaps: Vec<_> = registry.per_heap_stats().collect();
    heaps.sort_by_key(|(id, _)| *id);
    if heaps.is_empty() {
        writeln!(out, "  (no heaps registered)")?;
    }
    for (id, snap) in heaps.iter().take(HEAP_DISPLAY_LIMIT) {
        writeln!(
            out,
            "    heap #{:<6} {:>10}  {} pairs, {} symbols, {} strings, {} gcs",
            id,
            format_bytes(snap.footprint_bytes),
            snap.live_pairs,
            snap.live_symbols,
            snap.live_strings,
            snap.collections
        )?;
    }
    if heaps.len() > HEAP_DISPLAY_LIMIT {
        writeln!(
            out,
            "    ... and {} more heaps",
            heaps.len() - HEAP_DISPLAY_LIMIT
        )?;
    }

    writeln!(out, "\n=== End Diagnostics ===\n")
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
