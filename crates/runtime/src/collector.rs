//! Collection driver
//!
//! A collection runs to completion once started:
//!
//! 1. static roots
//! 2. protected single and array roots
//! 3. every type's `mark_type` hook
//! 4. registered foreign data (match registers and the like)
//! 5. the evaluator's call frames
//! 6. every type sweeps its own pool
//!
//! All marking finishes before the first sweep. The heap is in the
//! `Marking` or `Sweeping` phase meanwhile and any allocation panics.
//!
//! Collection is never triggered by allocation. The embedder calls
//! [`Heap::maybe_collect`] at a checkpoint where everything it holds is
//! rooted, or [`Heap::collect`] on request.

use crate::config::Activity;
use crate::heap::Heap;
use crate::mark::{Marker, SweepContext};
use cellmem_core::Value;
use serde::Serialize;
use std::io;
use std::time::Instant;
use tracing::{debug, info};

/// Where the heap is in a collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Idle,
    Marking,
    Sweeping,
}

/// One frame of the evaluator's active call chain
///
/// Frames are borrowed for the duration of a collection; the collector only
/// reads them.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame<'a> {
    pub fun: Value,
    pub args: Value,
    pub saved_env: Value,
    pub saved_fenv: Value,
    pub saved_special_env: Value,
    /// The caller's frame
    pub next: Option<&'a CallFrame<'a>>,
}

impl<'a> CallFrame<'a> {
    /// This frame and every frame below it
    pub fn iter(&'a self) -> impl Iterator<Item = &'a CallFrame<'a>> {
        std::iter::successors(Some(self), |frame| frame.next)
    }

    fn values(&self) -> [Value; 5] {
        [
            self.fun,
            self.args,
            self.saved_env,
            self.saved_fenv,
            self.saved_special_env,
        ]
    }
}

/// Summary returned by an explicit collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub live_pairs: usize,
    pub free_pairs: usize,
    pub live_symbols: usize,
    pub free_symbols: usize,
    pub live_strings: usize,
    pub string_bytes: usize,
    pub vector_slots: usize,
}

impl Heap {
    /// Collect and report what survived
    pub fn collect(&mut self, frames: Option<&CallFrame<'_>>) -> GcStats {
        self.garbage_collect(frames);
        let stats = self.stats();
        info!(
            "heap {}: {} pairs ({} free), {} symbols, {} strings ({} bytes), {} vector slots",
            self.heap_id(),
            stats.live_pairs,
            stats.free_pairs,
            stats.live_symbols,
            stats.live_strings,
            stats.string_bytes,
            stats.vector_slots
        );
        stats
    }

    /// Collect without building a report
    pub fn collect_quiet(&mut self, frames: Option<&CallFrame<'_>>) {
        self.garbage_collect(frames);
    }

    /// Collect if allocation since the last collection passed the
    /// threshold for `activity`; returns whether a collection ran
    pub fn maybe_collect(&mut self, activity: Activity, frames: Option<&CallFrame<'_>>) -> bool {
        if !self.should_collect(activity) {
            return false;
        }
        self.garbage_collect(frames);
        true
    }

    pub fn gc_phase(&self) -> GcPhase {
        self.phase
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            live_pairs: self.live_pairs(),
            free_pairs: self.free_pairs(),
            live_symbols: self.live_symbols(),
            free_symbols: self.free_symbols(),
            live_strings: self.live_strings(),
            string_bytes: self.string_bytes_in_use(),
            vector_slots: self.vector_slots(),
        }
    }

    /// Write the collection trace, oldest entry first
    pub fn spew_trace(&self, out: &mut dyn io::Write) -> io::Result<()> {
        match self.trace.and_then(|id| self.debug_buffers.get(id)) {
            Some(trace) => trace.spew(out),
            None => Ok(()),
        }
    }

    /// Write every debug buffer the heap owns, the collection trace included
    pub fn spew_debug_buffers(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.debug_buffers.spew_all(out)
    }

    fn garbage_collect(&mut self, frames: Option<&CallFrame<'_>>) {
        assert!(
            self.phase == GcPhase::Idle,
            "garbage collection entered while already collecting"
        );
        let started = Instant::now();
        let allocated = self.data_after_gc;

        self.phase = GcPhase::Marking;
        debug!("heap {}: mark phase", self.heap_id());
        let (marked, max_pending) = {
            let mut marker = Marker::new(&mut self.space, &mut self.wide_marks, &self.registry);

            marker.mark_all(self.roots.statics.iter().copied());
            marker.drain();

            marker.mark_all(self.roots.stacked());
            marker.drain();

            for desc in self.registry.active() {
                desc.ops.mark_type(&mut marker);
                marker.drain();
            }

            for data in &self.foreign {
                data.mark_foreign(&mut marker);
                marker.drain();
            }

            if let Some(top) = frames {
                for frame in top.iter() {
                    marker.mark_all(frame.values());
                }
                marker.drain();
            }

            (marker.cells_marked(), marker.max_pending())
        };

        self.phase = GcPhase::Sweeping;
        debug!("heap {}: sweep phase, {} cells marked", self.heap_id(), marked);
        let released = {
            let mut ctx = SweepContext::new(&mut self.space, &self.wide_marks);
            for desc in self.registry.active() {
                ctx.set_type(desc.code);
                desc.ops.sweep(&mut ctx);
            }
            ctx.released()
        };

        self.wide_marks.clear();
        self.data_after_gc = 0;
        self.collections += 1;
        self.phase = GcPhase::Idle;
        self.publish_stats();

        let elapsed = started.elapsed();
        debug!(
            "heap {}: collection {} done in {:?} (worklist peak {})",
            self.heap_id(),
            self.collections,
            elapsed,
            max_pending
        );
        let collections = self.collections;
        if let Some(trace) = self.trace.and_then(|id| self.debug_buffers.get_mut(id)) {
            trace.record(format_args!(
                "gc {}: {} bytes since last, {} marked, {} released, {} us\n",
                collections,
                allocated,
                marked,
                released,
                elapsed.as_micros()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;

    fn heap() -> Heap {
        Heap::new(GcConfig {
            pair_block_size: 16,
            ..GcConfig::default()
        })
    }

    #[test]
    fn test_unrooted_pairs_are_collected() {
        let mut heap = heap();
        for _ in 0..3 {
            heap.alloc_pair().unwrap();
        }
        let stats = heap.collect(None);
        assert_eq!(stats.live_pairs, 0);
        // The only block had no survivors and was released
        assert_eq!(heap.pair_blocks(), 0);
        assert_eq!(heap.free_list_len(), 0);
    }

    #[test]
    fn test_rooted_pair_survives_and_frees_are_reused() {
        let mut heap = heap();
        heap.alloc_pair().unwrap();
        let b = heap.alloc_pair().unwrap();
        heap.alloc_pair().unwrap();
        let root = heap.protect(b);

        let stats = heap.collect(None);
        assert_eq!(stats.live_pairs, 1);
        assert_eq!(heap.free_list_len(), 15);
        assert_eq!(stats.free_pairs, 15);

        // Every free slot, the two swept pairs included, is handed out
        // before the pool grows
        for _ in 0..15 {
            heap.alloc_pair().unwrap();
        }
        assert_eq!(heap.pair_blocks(), 1);
        assert_eq!(heap.free_list_len(), 0);
        heap.unprotect(root);
    }

    #[test]
    fn test_marked_content_is_unchanged() {
        let mut heap = heap();
        let s = heap.string_dup(b"keep").unwrap();
        let inner = heap.cons(Value::int(1), s).unwrap();
        let v = heap.alloc_vector(2).unwrap();
        heap.vector_set(v, 0, inner);
        heap.vector_set(v, 1, Value::int(2));
        let root = heap.protect(v);
        heap.string_dup(b"garbage").unwrap();

        heap.collect_quiet(None);
        assert_eq!(heap.car(inner), Value::int(1));
        assert_eq!(heap.string_bytes(heap.cdr(inner)), b"keep");
        assert_eq!(heap.vector_ref(v, 1), Value::int(2));
        assert_eq!(heap.live_strings(), 1);
        heap.unprotect(root);
    }

    #[test]
    fn test_call_frames_are_roots() {
        let mut heap = heap();
        let nil = heap.nil();
        let args = heap.list(&[Value::int(1), Value::int(2)]).unwrap();
        let env = heap.cons(Value::int(3), nil).unwrap();
        let outer = CallFrame {
            fun: Value::VOID,
            args: nil,
            saved_env: env,
            saved_fenv: nil,
            saved_special_env: nil,
            next: None,
        };
        let inner = CallFrame {
            fun: Value::VOID,
            args,
            saved_env: nil,
            saved_fenv: nil,
            saved_special_env: nil,
            next: Some(&outer),
        };
        assert_eq!(inner.iter().count(), 2);

        let stats = heap.collect(Some(&inner));
        assert_eq!(stats.live_pairs, 3);
        assert_eq!(heap.car(env), Value::int(3));
    }

    #[test]
    fn test_collection_resets_allocation_counter() {
        let mut heap = heap();
        heap.set_gc_threshold(64);
        heap.alloc_vector(4).unwrap();
        assert!(heap.data_after_gc() > 0);
        assert!(heap.maybe_collect(Activity::Active, None));
        assert_eq!(heap.data_after_gc(), 0);
        assert!(!heap.maybe_collect(Activity::Active, None));
        assert_eq!(heap.collections(), 1);
        assert_eq!(heap.gc_phase(), GcPhase::Idle);
    }

    #[test]
    #[should_panic(expected = "garbage collection is in progress")]
    fn test_allocating_mid_collection_panics() {
        let mut heap = heap();
        heap.phase = GcPhase::Marking;
        let _ = heap.alloc_pair();
    }

    #[test]
    fn test_symbols_and_closures_are_swept() {
        let mut heap = heap();
        let nil = heap.nil();
        let name = heap.string_dup(b"kept").unwrap();
        let kept = heap.alloc_symbol(name).unwrap();
        let dropped_name = heap.string_dup(b"dropped").unwrap();
        heap.alloc_symbol(dropped_name).unwrap();
        let value = heap.string_dup(b"value").unwrap();
        heap.set_symbol_value(kept, value);
        heap.alloc_funarg(crate::heap::Funarg::new(nil, nil)).unwrap();
        let root = heap.protect(kept);

        let stats = heap.collect(None);
        // kept plus nil
        assert_eq!(stats.live_symbols, 2);
        assert_eq!(stats.live_strings, 2);
        assert_eq!(heap.string_bytes(heap.symbol_value(kept)), b"value");
        assert_eq!(heap.space.funargs.len(), 0);
        heap.unprotect(root);
    }

    #[test]
    fn test_trace_records_collections() {
        let mut heap = Heap::new(GcConfig {
            trace_buffer: 512,
            ..GcConfig::default()
        });
        heap.collect_quiet(None);
        heap.collect_quiet(None);
        let mut out = Vec::new();
        heap.spew_trace(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("gc 1:"));
        assert!(text.contains("gc 2:"));
    }

    #[test]
    fn test_spew_debug_buffers_includes_trace() {
        let mut heap = Heap::new(GcConfig {
            trace_buffer: 512,
            ..GcConfig::default()
        });
        let reader = heap.debug_buffers_mut().create("reader", 64);
        heap.debug_buffers_mut()
            .get_mut(reader)
            .unwrap()
            .record(format_args!("read 3 forms\n"));
        heap.collect_quiet(None);

        let mut out = Vec::new();
        heap.spew_debug_buffers(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("gc 1:"));
        assert!(text.contains("debug buffer reader:\nread 3 forms"));
        assert_eq!(heap.debug_buffers().len(), 2);
    }

    #[test]
    fn test_killing_the_trace_stops_recording() {
        let mut heap = Heap::new(GcConfig {
            trace_buffer: 512,
            ..GcConfig::default()
        });
        let trace = heap.trace.unwrap();
        assert!(heap.debug_buffers_mut().kill(trace).is_some());
        heap.collect_quiet(None);

        let mut out = Vec::new();
        heap.spew_trace(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
