//! Built-in type descriptors
//!
//! Each built-in kind plugs its comparator, writers and (for the pooled
//! kinds) its sweep into the registry when a heap is created. Compiled-code
//! blocks share the vector chain, so only the vector type sweeps it.

use crate::dispatch::{Stream, ptr_cmp, type_equal};
use crate::heap::Heap;
use crate::mark::SweepContext;
use crate::print;
use crate::registry::{TypeOps, TypeRegistry};
use cellmem_core::{CellKind, TypeCode, Value};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

fn same_type(a: Value, b: Value) -> bool {
    a.type_code() == b.type_code()
}

struct IntType;

impl TypeOps for IntType {
    fn compare(&self, _heap: &Heap, a: Value, b: Value) -> Ordering {
        match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => Ordering::Greater,
        }
    }

    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::lisp_prin(heap, stream, value)
    }
}

struct PairType;

impl TypeOps for PairType {
    /// Element-wise along the tails; cars may recurse
    fn compare(&self, heap: &Heap, mut a: Value, mut b: Value) -> Ordering {
        loop {
            if !b.is_pair() {
                return Ordering::Greater;
            }
            let car = heap.compare(heap.car(a), heap.car(b));
            if car != Ordering::Equal {
                return car;
            }
            a = heap.cdr(a);
            b = heap.cdr(b);
            if !a.is_pair() {
                return heap.compare(a, b);
            }
        }
    }

    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::lisp_prin(heap, stream, value)
    }

    fn sweep(&self, ctx: &mut SweepContext<'_>) {
        let result = ctx.space.sweep_pairs();
        tracing::debug!(
            "swept pairs: {} survivors, {} blocks released",
            result.survivors,
            result.released_blocks
        );
    }
}

struct VectorType {
    sweeps: bool,
}

impl TypeOps for VectorType {
    fn compare(&self, heap: &Heap, a: Value, b: Value) -> Ordering {
        if !same_type(a, b) {
            return Ordering::Greater;
        }
        let (len_a, len_b) = (heap.vector_len(a), heap.vector_len(b));
        if len_a != len_b {
            return len_a.cmp(&len_b);
        }
        for i in 0..len_a {
            let c = heap.compare(heap.vector_ref(a, i), heap.vector_ref(b, i));
            if c != Ordering::Equal {
                return c;
            }
        }
        Ordering::Equal
    }

    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::lisp_prin(heap, stream, value)
    }

    fn sweep(&self, ctx: &mut SweepContext<'_>) {
        if self.sweeps {
            let released = ctx.space.sweep_vectors();
            ctx.note_released(released);
        }
    }
}

struct StringType;

impl TypeOps for StringType {
    fn compare(&self, heap: &Heap, a: Value, b: Value) -> Ordering {
        if !b.is_string() {
            return Ordering::Greater;
        }
        let (x, y) = (heap.string_bytes(a), heap.string_bytes(b));
        let common = x.len().min(y.len());
        x[..common]
            .cmp(&y[..common])
            .then(x.len().cmp(&y.len()))
    }

    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::string_princ(heap, stream, value)
    }

    fn print(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::string_print(heap, stream, value)
    }

    fn sweep(&self, ctx: &mut SweepContext<'_>) {
        let released = ctx.space.sweep_strings();
        ctx.note_released(released);
    }
}

struct SymbolType;

impl TypeOps for SymbolType {
    fn compare(&self, _heap: &Heap, a: Value, b: Value) -> Ordering {
        ptr_cmp(a, b)
    }

    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::lisp_prin(heap, stream, value)
    }

    fn sweep(&self, ctx: &mut SweepContext<'_>) {
        let released = ctx.space.sweep_symbols();
        ctx.note_released(released);
    }
}

struct FunargType;

impl TypeOps for FunargType {
    fn compare(&self, _heap: &Heap, a: Value, b: Value) -> Ordering {
        ptr_cmp(a, b)
    }

    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::lisp_prin(heap, stream, value)
    }

    fn sweep(&self, ctx: &mut SweepContext<'_>) {
        let released = ctx.space.sweep_funargs();
        ctx.note_released(released);
    }
}

/// Void and the primitive kinds: no storage, identity or type comparison
struct StaticType {
    identity: bool,
}

impl TypeOps for StaticType {
    fn compare(&self, _heap: &Heap, a: Value, b: Value) -> Ordering {
        if self.identity {
            ptr_cmp(a, b)
        } else {
            type_equal(a, b)
        }
    }

    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        print::lisp_prin(heap, stream, value)
    }
}

/// Install every built-in descriptor
pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    registry.register_type(
        TypeCode::narrow(CellKind::Pair),
        CellKind::Pair.name(),
        Rc::new(PairType),
    );
    registry.register_type(TypeCode::INT, "integer", Rc::new(IntType));
    registry.register_type(
        TypeCode::narrow(CellKind::Vector),
        CellKind::Vector.name(),
        Rc::new(VectorType { sweeps: true }),
    );
    registry.register_type(
        TypeCode::narrow(CellKind::String),
        CellKind::String.name(),
        Rc::new(StringType),
    );
    registry.register_type(
        TypeCode::narrow(CellKind::Compiled),
        CellKind::Compiled.name(),
        Rc::new(VectorType { sweeps: false }),
    );
    registry.register_type(
        TypeCode::narrow(CellKind::Symbol),
        CellKind::Symbol.name(),
        Rc::new(SymbolType),
    );
    registry.register_type(
        TypeCode::narrow(CellKind::Funarg),
        CellKind::Funarg.name(),
        Rc::new(FunargType),
    );
    registry.register_type(
        TypeCode::narrow(CellKind::Void),
        CellKind::Void.name(),
        Rc::new(StaticType { identity: false }),
    );
    let primitive: Rc<dyn TypeOps> = Rc::new(StaticType { identity: true });
    for kind in CellKind::ALL.into_iter().filter(|k| k.is_primitive()) {
        registry.register_type(TypeCode::narrow(kind), kind.name(), Rc::clone(&primitive));
    }
}
