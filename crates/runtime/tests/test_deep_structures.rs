//! Marking must not use native stack in proportion to structure size
//!
//! Each test runs on a thread with a deliberately small stack. A marker that
//! recursed once per list cell would overflow it long before the end.

use cellmem_runtime::{GcConfig, Heap, Value};

const SMALL_STACK: usize = 256 * 1024;
const LENGTH: i64 = 200_000;

fn on_small_stack<F: FnOnce() + Send + 'static>(f: F) {
    std::thread::Builder::new()
        .stack_size(SMALL_STACK)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap();
}

#[test]
fn test_long_list_collects() {
    on_small_stack(|| {
        let mut heap = Heap::new(GcConfig::default());
        let mut list = heap.nil();
        for n in 0..LENGTH {
            list = heap.cons(Value::int(n), list).unwrap();
        }
        let root = heap.protect(list);
        heap.cons(Value::int(-1), Value::Null).unwrap();

        let stats = heap.collect(None);
        assert_eq!(stats.live_pairs, LENGTH as usize);
        assert_eq!(heap.car(heap.root(&root)), Value::int(LENGTH - 1));
        heap.unprotect(root);

        let stats = heap.collect(None);
        assert_eq!(stats.live_pairs, 0);
    });
}

#[test]
fn test_deep_car_nesting_collects() {
    on_small_stack(|| {
        let mut heap = Heap::new(GcConfig::default());
        let mut tree = Value::int(0);
        for _ in 0..LENGTH {
            tree = heap.cons(tree, Value::Null).unwrap();
        }
        let root = heap.protect(tree);
        let stats = heap.collect(None);
        assert_eq!(stats.live_pairs, LENGTH as usize);
        heap.unprotect(root);
    });
}

#[test]
fn test_nested_vectors_collect() {
    on_small_stack(|| {
        let mut heap = Heap::new(GcConfig::default());
        let mut inner = Value::int(0);
        for _ in 0..50_000 {
            let v = heap.alloc_vector(2).unwrap();
            heap.vector_set(v, 0, inner);
            heap.vector_set(v, 1, Value::int(1));
            inner = v;
        }
        let root = heap.protect(inner);
        let stats = heap.collect(None);
        assert_eq!(stats.vector_slots, 100_000);
        heap.unprotect(root);
    });
}

#[test]
fn test_long_symbol_chain_collects() {
    on_small_stack(|| {
        let mut heap = Heap::new(GcConfig::default());
        let name = heap.string_dup(b"s").unwrap();
        let mut head = Value::Null;
        for _ in 0..LENGTH {
            let sym = heap.alloc_symbol(name).unwrap();
            heap.set_symbol_next(sym, head);
            head = sym;
        }
        let root = heap.protect(head);
        let stats = heap.collect(None);
        // The chain plus nil
        assert_eq!(stats.live_symbols, LENGTH as usize + 1);
        heap.unprotect(root);
    });
}
