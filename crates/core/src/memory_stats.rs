//! Cross-heap memory statistics registry
//!
//! Provides visibility into pool usage across every live heap in the process.
//! Each heap registers itself once and publishes a snapshot of its pools after
//! every collection.
//!
//! # Design
//!
//! The challenge: heaps are single-threaded context objects, but diagnostics
//! runs on a separate signal handler thread. We solve this with a global
//! registry where each heap has an exclusive slot for its stats.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              MemoryStatsRegistry (global)               │
//! ├─────────────────────────────────────────────────────────┤
//! │ slots: [MemorySlot; MAX_HEAPS]                          │
//! │                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐             │
//! │  │ Slot 0 (Heap A)  │  │ Slot 1 (Heap B)  │  ...        │
//! │  │ heap_id: u64     │  │ heap_id: u64     │             │
//! │  │ live_pairs: u64  │  │ live_pairs: u64  │             │
//! │  │ collections: u64 │  │ collections: u64 │             │
//! │  └──────────────────┘  └──────────────────┘             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Performance
//!
//! - **Registration**: One-time CAS per heap
//! - **Updates**: A handful of relaxed stores per collection, never on allocation
//! - **Reads**: Only during diagnostics (SIGQUIT) and reports

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of heaps we can track
const MAX_HEAPS: usize = 64;

/// Pool counts published by a heap after a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapSnapshot {
    pub live_pairs: u64,
    pub free_pairs: u64,
    pub live_symbols: u64,
    pub live_strings: u64,
    pub string_bytes: u64,
    pub vector_slots: u64,
    pub footprint_bytes: u64,
    pub collections: u64,
}

/// Statistics slot for a single heap
#[derive(Debug)]
pub struct MemorySlot {
    /// Heap ID (0 = slot is free)
    pub heap_id: AtomicU64,
    pub live_pairs: AtomicU64,
    pub free_pairs: AtomicU64,
    pub live_symbols: AtomicU64,
    pub live_strings: AtomicU64,
    pub string_bytes: AtomicU64,
    pub vector_slots: AtomicU64,
    pub footprint_bytes: AtomicU64,
    /// Collections run by this heap (lifetime counter)
    pub collections: AtomicU64,
}

impl MemorySlot {
    const fn new() -> Self {
        Self {
            heap_id: AtomicU64::new(0),
            live_pairs: AtomicU64::new(0),
            free_pairs: AtomicU64::new(0),
            live_symbols: AtomicU64::new(0),
            live_strings: AtomicU64::new(0),
            string_bytes: AtomicU64::new(0),
            vector_slots: AtomicU64::new(0),
            footprint_bytes: AtomicU64::new(0),
            collections: AtomicU64::new(0),
        }
    }

    fn load(&self) -> HeapSnapshot {
        HeapSnapshot {
            live_pairs: self.live_pairs.load(Ordering::Relaxed),
            free_pairs: self.free_pairs.load(Ordering::Relaxed),
            live_symbols: self.live_symbols.load(Ordering::Relaxed),
            live_strings: self.live_strings.load(Ordering::Relaxed),
            string_bytes: self.string_bytes.load(Ordering::Relaxed),
            vector_slots: self.vector_slots.load(Ordering::Relaxed),
            footprint_bytes: self.footprint_bytes.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
        }
    }

    fn store(&self, snapshot: &HeapSnapshot) {
        self.live_pairs
            .store(snapshot.live_pairs, Ordering::Relaxed);
        self.free_pairs
            .store(snapshot.free_pairs, Ordering::Relaxed);
        self.live_symbols
            .store(snapshot.live_symbols, Ordering::Relaxed);
        self.live_strings
            .store(snapshot.live_strings, Ordering::Relaxed);
        self.string_bytes
            .store(snapshot.string_bytes, Ordering::Relaxed);
        self.vector_slots
            .store(snapshot.vector_slots, Ordering::Relaxed);
        self.footprint_bytes
            .store(snapshot.footprint_bytes, Ordering::Relaxed);
        self.collections
            .store(snapshot.collections, Ordering::Relaxed);
    }
}

/// Global registry for cross-heap memory statistics
pub struct MemoryStatsRegistry {
    slots: Box<[MemorySlot]>,
    /// Count of heaps that couldn't get a slot
    pub overflow_count: AtomicU64,
}

impl MemoryStatsRegistry {
    /// Create a new registry with the given capacity
    fn new(capacity: usize) -> Self {
        let slots: Vec<MemorySlot> = (0..capacity).map(|_| MemorySlot::new()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Register a heap and get its slot index
    ///
    /// Returns Some(index) if a slot was claimed, None if registry is full.
    pub fn register(&self, heap_id: u64) -> Option<usize> {
        debug_assert!(heap_id != 0, "heap id 0 marks a free slot");

        for (idx, slot) in self.slots.iter().enumerate() {
            // Try to claim this slot (CAS from 0 to heap_id)
            if slot
                .heap_id
                .compare_exchange(0, heap_id, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                slot.store(&HeapSnapshot::default());
                return Some(idx);
            }
        }

        // Registry full
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Give a slot back when its heap is dropped
    pub fn release(&self, slot_idx: usize) {
        if let Some(slot) = self.slots.get(slot_idx) {
            slot.heap_id.store(0, Ordering::Release);
        }
    }

    /// Publish a snapshot for a slot
    ///
    /// Caller must own the slot (be the heap that registered it).
    #[inline]
    pub fn publish(&self, slot_idx: usize, snapshot: &HeapSnapshot) {
        if let Some(slot) = self.slots.get(slot_idx) {
            slot.store(snapshot);
        }
    }

    /// Get aggregated statistics across all heaps
    pub fn aggregate_stats(&self) -> AggregateMemoryStats {
        let mut total = AggregateMemoryStats {
            overflow_count: self.overflow_count.load(Ordering::Relaxed),
            ..Default::default()
        };

        for slot in self.slots.iter() {
            if slot.heap_id.load(Ordering::Acquire) > 0 {
                let snap = slot.load();
                total.active_heaps += 1;
                total.live_pairs += snap.live_pairs;
                total.free_pairs += snap.free_pairs;
                total.live_strings += snap.live_strings;
                total.string_bytes += snap.string_bytes;
                total.vector_slots += snap.vector_slots;
                total.footprint_bytes += snap.footprint_bytes;
                total.collections += snap.collections;
            }
        }

        total
    }

    /// Iterate over per-heap statistics (for detailed diagnostics)
    pub fn per_heap_stats(&self) -> impl Iterator<Item = (u64, HeapSnapshot)> + '_ {
        self.slots.iter().filter_map(|slot| {
            let heap_id = slot.heap_id.load(Ordering::Acquire);
            if heap_id > 0 {
                Some((heap_id, slot.load()))
            } else {
                None
            }
        })
    }

    /// Get registry capacity
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Aggregated statistics across all heaps
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateMemoryStats {
    pub active_heaps: usize,
    pub live_pairs: u64,
    pub free_pairs: u64,
    pub live_strings: u64,
    pub string_bytes: u64,
    pub vector_slots: u64,
    pub footprint_bytes: u64,
    pub collections: u64,
    pub overflow_count: u64,
}

/// Global counter for generating unique heap IDs
/// Starts at 1 because 0 means "empty slot"
static NEXT_HEAP_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique heap ID
pub fn next_heap_id() -> u64 {
    NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed)
}

// Global registry instance
static MEMORY_REGISTRY: OnceLock<MemoryStatsRegistry> = OnceLock::new();

/// Get the global memory stats registry
pub fn memory_registry() -> &'static MemoryStatsRegistry {
    MEMORY_REGISTRY.get_or_init(|| MemoryStatsRegistry::new(MAX_HEAPS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_basic() {
        let registry = MemoryStatsRegistry::new(4);

        let idx = registry.register(next_heap_id()).expect("slot available");

        registry.publish(
            idx,
            &HeapSnapshot {
                live_pairs: 10,
                free_pairs: 1014,
                string_bytes: 64,
                collections: 1,
                ..Default::default()
            },
        );

        let stats = registry.aggregate_stats();
        assert_eq!(stats.active_heaps, 1);
        assert_eq!(stats.live_pairs, 10);
        assert_eq!(stats.free_pairs, 1014);
        assert_eq!(stats.string_bytes, 64);
        assert_eq!(stats.collections, 1);
    }

    #[test]
    fn test_registry_overflow() {
        let registry = MemoryStatsRegistry::new(2);

        assert!(registry.register(next_heap_id()).is_some());
        assert!(registry.register(next_heap_id()).is_some());
        assert!(registry.register(next_heap_id()).is_none());
        assert_eq!(registry.overflow_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_release_frees_slot_and_resets_on_reuse() {
        let registry = MemoryStatsRegistry::new(1);

        let idx = registry.register(next_heap_id()).unwrap();
        registry.publish(
            idx,
            &HeapSnapshot {
                live_pairs: 99,
                ..Default::default()
            },
        );
        registry.release(idx);
        assert_eq!(registry.aggregate_stats().active_heaps, 0);

        let again = registry.register(next_heap_id()).unwrap();
        assert_eq!(again, idx);
        assert_eq!(registry.aggregate_stats().live_pairs, 0);
    }

    #[test]
    fn test_per_heap_stats() {
        let registry = MemoryStatsRegistry::new(4);
        let id = next_heap_id();
        let idx = registry.register(id).unwrap();
        registry.publish(
            idx,
            &HeapSnapshot {
                vector_slots: 777,
                ..Default::default()
            },
        );

        let per_heap: Vec<_> = registry.per_heap_stats().collect();
        assert_eq!(per_heap.len(), 1);
        assert_eq!(per_heap[0].0, id);
        assert_eq!(per_heap[0].1.vector_slots, 777);
    }

    #[test]
    fn test_heap_ids_are_unique() {
        use std::collections::HashSet;
        use std::thread;

        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(next_heap_id))
            .collect();
        let ids: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 8, "Heap IDs should be unique");
    }
}
