//! End-to-end collection behaviour through the public heap API

use cellmem_runtime::{Activity, GcConfig, Heap, HeapError, Value};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn small_heap() -> Heap {
    Heap::new(GcConfig {
        pair_block_size: 8,
        ..GcConfig::default()
    })
}

#[test]
fn test_three_unrooted_pairs_are_reclaimed() {
    init_tracing();
    let mut heap = small_heap();
    for _ in 0..3 {
        heap.alloc_pair().unwrap();
    }
    assert_eq!(heap.live_pairs(), 3);
    let stats = heap.collect(None);
    assert_eq!(stats.live_pairs, 0);
}

#[test]
fn test_one_rooted_pair_of_three() {
    let mut heap = small_heap();
    heap.alloc_pair().unwrap();
    let keep = heap.alloc_pair().unwrap();
    heap.alloc_pair().unwrap();
    let root = heap.protect(keep);

    let stats = heap.collect(None);
    assert_eq!(stats.live_pairs, 1);
    assert_eq!(heap.pair_blocks(), 1);

    heap.alloc_pair().unwrap();
    heap.alloc_pair().unwrap();
    assert_eq!(heap.pair_blocks(), 1);
    assert_eq!(heap.live_pairs(), 3);
    heap.unprotect(root);
}

#[test]
fn test_dropped_blocks_are_released() {
    let mut heap = small_heap();
    for _ in 0..100 {
        heap.alloc_pair().unwrap();
    }
    assert_eq!(heap.pair_blocks(), 13);

    let stats = heap.collect(None);
    assert_eq!(stats.live_pairs, 0);
    assert_eq!(stats.free_pairs, 0);
    assert_eq!(heap.pair_blocks(), 0);
    assert_eq!(heap.free_list_len(), 0);
}

#[test]
fn test_free_list_matches_resident_blocks() {
    let mut heap = small_heap();
    let keep = heap.alloc_pair().unwrap();
    let root = heap.protect(keep);
    for _ in 0..30 {
        heap.alloc_pair().unwrap();
    }

    heap.collect_quiet(None);
    // Only the first block has a survivor
    assert_eq!(heap.pair_blocks(), 1);
    assert_eq!(heap.free_list_len(), 7);
    assert_eq!(heap.free_pairs(), 7);
    heap.unprotect(root);
}

#[test]
fn test_rooted_vector_round_trip() {
    let mut heap = small_heap();
    let size = 500;
    let v = heap.alloc_vector(size).unwrap();
    let root = heap.protect(v);
    for i in 0..size {
        let item = if i % 2 == 0 {
            Value::int(i as i64)
        } else {
            heap.cons(Value::int(i as i64), Value::Null).unwrap()
        };
        heap.vector_set(v, i, item);
    }
    let before = heap.vector_values(v);

    heap.collect_quiet(None);
    assert_eq!(heap.vector_values(v), before);
    for i in (1..size).step_by(2) {
        assert_eq!(heap.car(heap.vector_ref(v, i)), Value::int(i as i64));
    }
    assert_eq!(heap.vector_slots(), size);
    heap.unprotect(root);
}

#[test]
fn test_unrooted_vectors_and_strings_are_released() {
    let mut heap = small_heap();
    heap.alloc_vector(10).unwrap();
    heap.string_dup(b"temporary").unwrap();
    let empty_footprint = {
        let mut fresh = small_heap();
        fresh.collect_quiet(None);
        fresh.footprint()
    };

    let stats = heap.collect(None);
    assert_eq!(stats.vector_slots, 0);
    assert_eq!(stats.live_strings, 0);
    assert_eq!(stats.string_bytes, 0);
    assert_eq!(heap.footprint(), empty_footprint);
}

#[test]
fn test_string_length_limit() {
    let max = 1 << 16;
    let mut heap = Heap::new(GcConfig {
        max_string: max,
        ..GcConfig::default()
    });
    let s = heap.alloc_string(max).unwrap();
    assert_eq!(heap.string_bytes(s).len(), max);

    let footprint = heap.footprint();
    assert_eq!(
        heap.alloc_string(max + 1),
        Err(HeapError::StringTooLong {
            requested: max + 1,
            max
        })
    );
    assert_eq!(heap.footprint(), footprint);
    assert_eq!(heap.live_strings(), 1);
}

#[test]
fn test_default_max_string_is_24_bits() {
    let mut heap = Heap::new(GcConfig::default());
    assert!(matches!(
        heap.alloc_string(1 << 24),
        Err(HeapError::StringTooLong { .. })
    ));
}

#[test]
fn test_threshold_triggers_collection() {
    let mut heap = small_heap();
    heap.set_gc_threshold(1_000);
    heap.set_idle_gc_threshold(100);

    let mut collections = 0;
    for _ in 0..1_000 {
        heap.alloc_pair().unwrap();
        if heap.maybe_collect(Activity::Active, None) {
            collections += 1;
        }
    }
    assert!(collections > 0);
    assert_eq!(heap.collections(), collections);

    heap.collect_quiet(None);
    heap.string_dup(&[b'x'; 200]).unwrap();
    assert!(!heap.should_collect(Activity::Active));
    assert!(heap.should_collect(Activity::Idle));
}

#[test]
fn test_heap_limit_surfaces_as_error() {
    let mut heap = small_heap();
    heap.set_heap_limit(Some(1_000));
    let mut result = Ok(Value::Null);
    for _ in 0..200 {
        result = heap.alloc_pair();
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(HeapError::OutOfMemory { .. })));

    // Collecting releases the unrooted blocks and allocation works again
    heap.collect_quiet(None);
    assert!(heap.alloc_pair().is_ok());
}

#[test]
fn test_stats_serialize() {
    let mut heap = small_heap();
    let l = heap.list(&[Value::int(1), Value::int(2)]).unwrap();
    let root = heap.protect(l);
    let stats = heap.collect(None);
    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["live_pairs"], 2);
    assert_eq!(json["free_pairs"], 6);
    heap.unprotect(root);
}

#[test]
fn test_huge_sizes_are_out_of_memory() {
    let mut heap = Heap::new(GcConfig {
        max_string: usize::MAX,
        ..GcConfig::default()
    });
    let too_big = Err(HeapError::OutOfMemory {
        requested: usize::MAX,
    });
    assert_eq!(heap.alloc_vector(usize::MAX / 4), too_big);
    assert_eq!(heap.alloc_compiled(usize::MAX / 8 + 1), too_big);
    assert_eq!(heap.alloc_string(usize::MAX - 4), too_big);
    assert_eq!(heap.data_after_gc(), 0);

    // Nothing was half-allocated
    assert!(heap.alloc_vector(4).is_ok());
    assert_eq!(heap.vector_slots(), 4);
}
