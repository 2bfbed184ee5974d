//! Stub module for the heap report when the "diagnostics" feature is disabled.

use crate::heap::Heap;

/// No-op report when diagnostics is disabled
pub fn emit_report(_heap: &Heap) {
    // No-op: diagnostics feature not enabled
}
