//! The heap
//!
//! One `Heap` owns everything a running interpreter allocates: the type
//! registry, the cell pools, the root stacks and the collector state. Tests
//! build as many independent heaps as they like; an embedding interpreter
//! normally owns exactly one.
//!
//! Allocation never collects. The embedder calls
//! [`Heap::maybe_collect`](crate::collector) at points where every live
//! value it holds is reachable from a root.

use crate::collector::GcPhase;
use crate::config::{Activity, GcConfig};
use crate::debug_buffer::{BufferId, DebugBuffers};
use crate::mark::WideMarks;
use crate::match_regs::ForeignData;
use crate::pairs::PairCell;
use crate::registry::{TypeDescriptor, TypeOps, TypeRegistry};
use crate::roots::{RootStack, StaticRoot};
use crate::space::{self, CellSpace, FunargCell, SymbolCell};
use crate::types;
use cellmem_core::{
    CellId, CellKind, HeapError, HeapResult, HeapSnapshot, TypeCode, Value, Word, memory_registry,
    next_heap_id,
};
use std::rc::Rc;
use tracing::warn;

/// The five slots of a closure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Funarg {
    pub fun: Value,
    pub env: Value,
    pub fenv: Value,
    pub special_env: Value,
    pub fh_env: Value,
}

impl Funarg {
    /// A closure over `fun` with every environment empty
    pub fn new(fun: Value, nil: Value) -> Self {
        Self {
            fun,
            env: nil,
            fenv: nil,
            special_env: nil,
            fh_env: nil,
        }
    }

    fn pack(self) -> FunargCell {
        FunargCell {
            fun: Word::pack(self.fun),
            env: Word::pack(self.env),
            fenv: Word::pack(self.fenv),
            special_env: Word::pack(self.special_env),
            fh_env: Word::pack(self.fh_env),
        }
    }
}

pub struct Heap {
    pub(crate) registry: TypeRegistry,
    pub(crate) space: CellSpace,
    pub(crate) roots: RootStack,
    pub(crate) wide_marks: WideMarks,
    pub(crate) foreign: Vec<Rc<dyn ForeignData>>,
    pub(crate) config: GcConfig,
    /// Bytes allocated since the last collection
    pub(crate) data_after_gc: usize,
    pub(crate) phase: GcPhase,
    pub(crate) collections: u64,
    pub(crate) debug_buffers: DebugBuffers,
    /// The collection trace, one of `debug_buffers`
    pub(crate) trace: Option<BufferId>,
    nil: StaticRoot,
    null_string: Value,
    heap_id: u64,
    stats_slot: Option<usize>,
}

impl Heap {
    /// Create a heap with the built-in types, `nil` and the null string
    ///
    /// # Panics
    /// Panics if the system cannot supply the few bytes the bootstrap cells
    /// need.
    pub fn new(config: GcConfig) -> Self {
        let mut space = CellSpace::new(config.pair_block_size);
        let mut registry = TypeRegistry::new();
        types::register_builtins(&mut registry);

        let null_string = match space.frozen_string(b"") {
            Ok(id) => Value::string(id),
            Err(e) => panic!("cannot bootstrap heap: {}", e),
        };
        let nil = match bootstrap_nil(&mut space) {
            Ok(nil) => nil,
            Err(e) => panic!("cannot bootstrap heap: {}", e),
        };
        space.set_limit(config.heap_limit);

        let heap_id = next_heap_id();
        let stats_slot = memory_registry().register(heap_id);
        if stats_slot.is_none() {
            tracing::debug!("heap {} has no memory stats slot", heap_id);
        }

        let mut debug_buffers = DebugBuffers::new();
        let trace = (config.trace_buffer > 0)
            .then(|| debug_buffers.create(format!("gc-{}", heap_id), config.trace_buffer));

        let mut heap = Self {
            registry,
            space,
            roots: RootStack::new(),
            wide_marks: WideMarks::new(),
            foreign: Vec::new(),
            config,
            data_after_gc: 0,
            phase: GcPhase::Idle,
            collections: 0,
            debug_buffers,
            trace,
            nil: StaticRoot::placeholder(),
            null_string,
            heap_id,
            stats_slot,
        };
        heap.nil = heap.register_static(nil);
        heap.publish_stats();
        heap
    }

    /// A heap configured from the environment
    pub fn from_env() -> Self {
        Self::new(GcConfig::from_env())
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Process-unique id, as shown in the memory stats registry
    pub fn heap_id(&self) -> u64 {
        self.heap_id
    }

    /// The canonical empty list / false value
    pub fn nil(&self) -> Value {
        self.static_root(self.nil)
    }

    pub(crate) fn set_nil(&mut self, nil: Value) {
        self.set_static_root(self.nil, nil);
    }

    /// Placeholder stored in unbound slots
    pub fn void(&self) -> Value {
        Value::VOID
    }

    pub fn is_nil(&self, value: Value) -> bool {
        value == self.nil()
    }

    // =========================================================================
    // Allocation bookkeeping
    // =========================================================================

    #[inline]
    fn begin_alloc(&self) {
        assert!(
            self.phase == GcPhase::Idle,
            "allocation while a garbage collection is in progress"
        );
    }

    fn finish_alloc<T>(&mut self, result: HeapResult<T>, bytes: usize) -> HeapResult<T> {
        match result {
            Ok(v) => {
                self.data_after_gc += bytes;
                Ok(v)
            }
            Err(e) => {
                warn!("heap {}: {}", self.heap_id, e);
                Err(e)
            }
        }
    }

    /// Like `finish_alloc` for pools that report what they charged
    fn finish_sized<T>(&mut self, result: HeapResult<(T, usize)>) -> HeapResult<T> {
        match result {
            Ok((v, bytes)) => self.finish_alloc(Ok(v), bytes),
            Err(e) => self.finish_alloc(Err(e), 0),
        }
    }

    /// Charge memory held by an extension type against the collection
    /// threshold
    pub fn note_allocation(&mut self, bytes: usize) {
        self.begin_alloc();
        self.data_after_gc += bytes;
    }

    /// Debug buffers owned by this heap
    pub fn debug_buffers(&self) -> &DebugBuffers {
        &self.debug_buffers
    }

    /// Create, record into and kill debug buffers alongside the collection
    /// trace
    pub fn debug_buffers_mut(&mut self) -> &mut DebugBuffers {
        &mut self.debug_buffers
    }

    /// Register foreign state that must be marked every collection
    pub fn add_foreign_data(&mut self, data: Rc<dyn ForeignData>) {
        self.foreign.push(data);
    }

    // =========================================================================
    // Pairs
    // =========================================================================

    /// A fresh pair with both slots null; the caller fills them
    pub fn alloc_pair(&mut self) -> HeapResult<Value> {
        self.cons(Value::Null, Value::Null)
    }

    pub fn cons(&mut self, car: Value, cdr: Value) -> HeapResult<Value> {
        self.begin_alloc();
        let result = self.space.alloc_pair(PairCell {
            car: Word::pack(car),
            cdr: Word::pack(cdr),
        });
        self.finish_alloc(result, space::PAIR_BYTES)
            .map(Value::pair)
    }

    /// Build a proper list ending in nil
    pub fn list(&mut self, items: &[Value]) -> HeapResult<Value> {
        let mut list = self.nil();
        for &item in items.iter().rev() {
            // Each cons keeps the partial list reachable through its cdr
            list = self.cons(item, list)?;
        }
        Ok(list)
    }

    /// Return a pair to the free-list without waiting for a collection
    ///
    /// The caller guarantees nothing refers to the pair any more.
    pub fn free_pair(&mut self, pair: Value) {
        let id = expect_cell(pair, CellKind::Pair);
        self.space.pairs.release(id);
    }

    pub fn car(&self, pair: Value) -> Value {
        let id = expect_cell(pair, CellKind::Pair);
        self.space.pairs.get(id).car.unpack()
    }

    pub fn cdr(&self, pair: Value) -> Value {
        let id = expect_cell(pair, CellKind::Pair);
        self.space.pairs.get(id).cdr.unpack()
    }

    pub fn set_car(&mut self, pair: Value, value: Value) {
        let id = self.writable_pair(pair);
        self.space.pairs.get_mut(id).car = Word::pack(value);
    }

    pub fn set_cdr(&mut self, pair: Value, value: Value) {
        let id = self.writable_pair(pair);
        self.space.pairs.get_mut(id).cdr = Word::pack(value);
    }

    fn writable_pair(&self, pair: Value) -> CellId {
        let id = expect_cell(pair, CellKind::Pair);
        assert!(
            !self.space.pairs.is_image(id),
            "cannot modify image pair {}",
            id.raw()
        );
        id
    }

    // =========================================================================
    // Vectors and compiled blocks
    // =========================================================================

    /// A vector of `size` null slots
    pub fn alloc_vector(&mut self, size: usize) -> HeapResult<Value> {
        self.begin_alloc();
        let result = self.space.alloc_vector(size);
        self.finish_sized(result).map(Value::vector)
    }

    /// A compiled-code block of `size` null slots
    pub fn alloc_compiled(&mut self, size: usize) -> HeapResult<Value> {
        self.begin_alloc();
        let result = self.space.alloc_vector(size);
        self.finish_sized(result).map(Value::compiled)
    }

    pub fn vector_len(&self, vector: Value) -> usize {
        self.space.vectors.get(expect_vector(vector)).slots.len()
    }

    /// Read a slot
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn vector_ref(&self, vector: Value, index: usize) -> Value {
        self.space.vectors.get(expect_vector(vector)).slots[index].unpack()
    }

    pub fn vector_set(&mut self, vector: Value, index: usize, value: Value) {
        let id = expect_vector(vector);
        assert!(
            !self.space.vectors.is_frozen(id),
            "cannot modify image vector {}",
            id.raw()
        );
        self.space.vectors.get_mut(id).slots[index] = Word::pack(value);
    }

    /// Copy of every slot
    pub fn vector_values(&self, vector: Value) -> Vec<Value> {
        self.space
            .vectors
            .get(expect_vector(vector))
            .slots
            .iter()
            .map(|w| w.unpack())
            .collect()
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// The shared empty string; never allocated or swept
    pub fn null_string(&self) -> Value {
        self.null_string
    }

    /// A zero-filled string of exactly `len` bytes
    ///
    /// Lengths above the configured maximum fail with
    /// [`HeapError::StringTooLong`] before anything is allocated.
    pub fn alloc_string(&mut self, len: usize) -> HeapResult<Value> {
        self.begin_alloc();
        if len > self.config.max_string {
            let err = HeapError::StringTooLong {
                requested: len,
                max: self.config.max_string,
            };
            warn!("heap {}: {}", self.heap_id, err);
            return Err(err);
        }
        let result = self.space.alloc_string(len);
        self.finish_sized(result).map(Value::string)
    }

    /// A new string holding a copy of `bytes`
    pub fn string_dup(&mut self, bytes: &[u8]) -> HeapResult<Value> {
        let s = self.alloc_string(bytes.len())?;
        self.string_bytes_mut(s).copy_from_slice(bytes);
        Ok(s)
    }

    /// A new string holding the parts laid end to end
    pub fn concat(&mut self, parts: &[&[u8]]) -> HeapResult<Value> {
        let len = parts.iter().map(|p| p.len()).sum();
        let s = self.alloc_string(len)?;
        let dest = self.string_bytes_mut(s);
        let mut at = 0;
        for part in parts {
            dest[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        Ok(s)
    }

    pub fn string_bytes(&self, string: Value) -> &[u8] {
        self.space.strings.get(expect_cell(string, CellKind::String)).bytes()
    }

    /// The writable bytes of a string, up to its logical length
    ///
    /// # Panics
    /// Panics on the null string and image strings.
    pub fn string_bytes_mut(&mut self, string: Value) -> &mut [u8] {
        let id = expect_cell(string, CellKind::String);
        assert!(
            !self.space.strings.is_frozen(id),
            "cannot modify read-only string {}",
            id.raw()
        );
        let cell = self.space.strings.get_mut(id);
        &mut cell.data[..cell.len]
    }

    /// Shrink (or regrow, up to its allocation) a string's logical length
    ///
    /// Returns false for read-only strings and lengths past the buffer.
    pub fn set_string_len(&mut self, string: Value, len: usize) -> bool {
        let id = expect_cell(string, CellKind::String);
        if self.space.strings.is_frozen(id) {
            return false;
        }
        let cell = self.space.strings.get_mut(id);
        if len > cell.data.len() {
            return false;
        }
        cell.len = len;
        true
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    /// An uninterned symbol named by the string `name`
    ///
    /// Value and function start out void, the property list nil.
    pub fn alloc_symbol(&mut self, name: Value) -> HeapResult<Value> {
        expect_cell(name, CellKind::String);
        self.begin_alloc();
        let nil = Word::pack(self.nil());
        let result = self.space.alloc_symbol(SymbolCell {
            name: Word::pack(name),
            value: Word::pack(Value::VOID),
            function: Word::pack(Value::VOID),
            prop_list: nil,
            next: Word::NULL,
        });
        self.finish_alloc(result, space::SYMBOL_BYTES)
            .map(Value::symbol)
    }

    fn symbol(&self, symbol: Value) -> &SymbolCell {
        self.space.symbols.get(expect_cell(symbol, CellKind::Symbol))
    }

    fn symbol_mut(&mut self, symbol: Value) -> &mut SymbolCell {
        self.space
            .symbols
            .get_mut(expect_cell(symbol, CellKind::Symbol))
    }

    pub fn symbol_name(&self, symbol: Value) -> Value {
        self.symbol(symbol).name.unpack()
    }

    pub fn symbol_value(&self, symbol: Value) -> Value {
        self.symbol(symbol).value.unpack()
    }

    pub fn set_symbol_value(&mut self, symbol: Value, value: Value) {
        self.symbol_mut(symbol).value = Word::pack(value);
    }

    pub fn symbol_function(&self, symbol: Value) -> Value {
        self.symbol(symbol).function.unpack()
    }

    pub fn set_symbol_function(&mut self, symbol: Value, function: Value) {
        self.symbol_mut(symbol).function = Word::pack(function);
    }

    pub fn symbol_plist(&self, symbol: Value) -> Value {
        self.symbol(symbol).prop_list.unpack()
    }

    pub fn set_symbol_plist(&mut self, symbol: Value, plist: Value) {
        self.symbol_mut(symbol).prop_list = Word::pack(plist);
    }

    /// Successor in the obarray bucket
    pub fn symbol_next(&self, symbol: Value) -> Value {
        self.symbol(symbol).next.unpack()
    }

    pub fn set_symbol_next(&mut self, symbol: Value, next: Value) {
        self.symbol_mut(symbol).next = Word::pack(next);
    }

    // =========================================================================
    // Closures
    // =========================================================================

    pub fn alloc_funarg(&mut self, funarg: Funarg) -> HeapResult<Value> {
        self.begin_alloc();
        let result = self.space.alloc_funarg(funarg.pack());
        self.finish_alloc(result, space::FUNARG_BYTES)
            .map(Value::funarg)
    }

    pub fn funarg(&self, closure: Value) -> Funarg {
        let cell = self
            .space
            .funargs
            .get(expect_cell(closure, CellKind::Funarg));
        Funarg {
            fun: cell.fun.unpack(),
            env: cell.env.unpack(),
            fenv: cell.fenv.unpack(),
            special_env: cell.special_env.unpack(),
            fh_env: cell.fh_env.unpack(),
        }
    }

    pub fn set_funarg(&mut self, closure: Value, funarg: Funarg) {
        let id = expect_cell(closure, CellKind::Funarg);
        *self.space.funargs.get_mut(id) = funarg.pack();
    }

    // =========================================================================
    // Types
    // =========================================================================

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn register_type(&mut self, code: TypeCode, name: &str, ops: Rc<dyn TypeOps>) {
        self.registry.register_type(code, name, ops);
    }

    /// See [`TypeRegistry::register_new_type`]
    pub fn register_new_type(&mut self, name: &str, ops: Rc<dyn TypeOps>) -> TypeCode {
        self.registry.register_new_type(name, ops)
    }

    pub fn get_type(&self, code: TypeCode) -> &TypeDescriptor {
        self.registry.get_type(code)
    }

    pub fn find_type(&self, code: TypeCode) -> Option<&TypeDescriptor> {
        self.registry.find_type(code)
    }

    // =========================================================================
    // Thresholds and accounting
    // =========================================================================

    pub fn data_after_gc(&self) -> usize {
        self.data_after_gc
    }

    pub fn gc_threshold(&self) -> usize {
        self.config.gc_threshold
    }

    pub fn set_gc_threshold(&mut self, bytes: usize) {
        self.config.gc_threshold = bytes;
    }

    pub fn idle_gc_threshold(&self) -> usize {
        self.config.idle_gc_threshold
    }

    pub fn set_idle_gc_threshold(&mut self, bytes: usize) {
        self.config.idle_gc_threshold = bytes;
    }

    /// True once allocation since the last collection passes the threshold
    pub fn should_collect(&self, activity: Activity) -> bool {
        self.data_after_gc > self.config.threshold(activity)
    }

    /// Pairs in use, image pairs included
    pub fn live_pairs(&self) -> usize {
        self.space.pairs.used()
    }

    /// Pairs waiting on the free-list
    pub fn free_pairs(&self) -> usize {
        self.space.pairs.allocated() - self.space.pairs.used()
    }

    /// Length of the pair free-list, counted by walking it
    pub fn free_list_len(&self) -> usize {
        self.space.pairs.free_list_len()
    }

    /// Resident pair blocks
    pub fn pair_blocks(&self) -> usize {
        self.space.pairs.block_count()
    }

    pub fn live_symbols(&self) -> usize {
        self.space.symbols.len()
    }

    pub fn free_symbols(&self) -> usize {
        self.space.symbols.vacant()
    }

    pub fn live_strings(&self) -> usize {
        self.space.live_strings()
    }

    pub fn string_bytes_in_use(&self) -> usize {
        self.space.live_string_bytes()
    }

    pub fn vector_slots(&self) -> usize {
        self.space.vector_slots()
    }

    /// Bytes held by the pools
    pub fn footprint(&self) -> usize {
        self.space.resident()
    }

    /// Ceiling on resident bytes, if any
    pub fn heap_limit(&self) -> Option<usize> {
        self.space.limit()
    }

    pub fn set_heap_limit(&mut self, limit: Option<usize>) {
        self.config.heap_limit = limit;
        self.space.set_limit(limit);
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub(crate) fn snapshot(&self) -> HeapSnapshot {
        HeapSnapshot {
            live_pairs: self.live_pairs() as u64,
            free_pairs: self.free_pairs() as u64,
            live_symbols: self.live_symbols() as u64,
            live_strings: self.live_strings() as u64,
            string_bytes: self.string_bytes_in_use() as u64,
            vector_slots: self.vector_slots() as u64,
            footprint_bytes: self.footprint() as u64,
            collections: self.collections,
        }
    }

    pub(crate) fn publish_stats(&self) {
        if let Some(slot) = self.stats_slot {
            memory_registry().publish(slot, &self.snapshot());
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if let Some(slot) = self.stats_slot.take() {
            memory_registry().release(slot);
        }
    }
}

fn bootstrap_nil(space: &mut CellSpace) -> HeapResult<Value> {
    let name = space.frozen_string(b"nil")?;
    let id = space.frozen_symbol(SymbolCell {
        name: Word::pack(Value::string(name)),
        value: Word::NULL,
        function: Word::pack(Value::VOID),
        prop_list: Word::NULL,
        next: Word::NULL,
    })?;
    let nil = Value::symbol(id);
    let sym = space.symbols.get_mut(id);
    sym.value = Word::pack(nil);
    sym.prop_list = Word::pack(nil);
    Ok(nil)
}

/// The cell id of `value`, which must be of kind `kind`
///
/// # Panics
/// Panics on any other value; the accessors are only called on values the
/// evaluator has already type-checked.
pub(crate) fn expect_cell(value: Value, kind: CellKind) -> CellId {
    match value.cell_of(kind) {
        Some(id) => id,
        None => panic!("expected {}, got {:?}", kind.name(), value),
    }
}

fn expect_vector(value: Value) -> CellId {
    match value {
        Value::Cell(CellKind::Vector | CellKind::Compiled, id) => id,
        other => panic!("expected vector, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(GcConfig::default())
    }

    #[test]
    fn test_nil_is_self_evaluating_symbol() {
        let heap = heap();
        let nil = heap.nil();
        assert!(nil.is_symbol());
        assert_eq!(heap.symbol_value(nil), nil);
        assert_eq!(heap.symbol_plist(nil), nil);
        assert_eq!(heap.string_bytes(heap.symbol_name(nil)), b"nil");
    }

    #[test]
    fn test_cons_and_accessors() {
        let mut heap = heap();
        let p = heap.cons(Value::int(1), Value::int(2)).unwrap();
        assert_eq!(heap.car(p), Value::int(1));
        assert_eq!(heap.cdr(p), Value::int(2));
        heap.set_car(p, Value::int(3));
        heap.set_cdr(p, heap.nil());
        assert_eq!(heap.car(p), Value::int(3));
        assert!(heap.is_nil(heap.cdr(p)));
    }

    #[test]
    fn test_list_is_nil_terminated() {
        let mut heap = heap();
        let l = heap
            .list(&[Value::int(1), Value::int(2), Value::int(3)])
            .unwrap();
        assert_eq!(heap.car(l), Value::int(1));
        let tail = heap.cdr(heap.cdr(l));
        assert_eq!(heap.car(tail), Value::int(3));
        assert!(heap.is_nil(heap.cdr(tail)));
    }

    #[test]
    fn test_free_pair_is_reused() {
        let mut heap = heap();
        let p = heap.alloc_pair().unwrap();
        heap.free_pair(p);
        let q = heap.alloc_pair().unwrap();
        assert_eq!(p, q);
    }

    #[test]
    #[should_panic(expected = "is not live")]
    fn test_double_free_panics() {
        let mut heap = heap();
        let p = heap.alloc_pair().unwrap();
        heap.free_pair(p);
        heap.free_pair(p);
    }

    #[test]
    fn test_allocation_is_charged() {
        let mut heap = heap();
        assert_eq!(heap.data_after_gc(), 0);
        heap.alloc_pair().unwrap();
        heap.alloc_vector(4).unwrap();
        heap.alloc_string(5).unwrap();
        assert_eq!(
            heap.data_after_gc(),
            space::PAIR_BYTES
                + space::vector_bytes(4).unwrap()
                + space::string_bytes(5).unwrap()
        );
    }

    #[test]
    fn test_string_limit() {
        let mut heap = Heap::new(GcConfig {
            max_string: 8,
            ..GcConfig::default()
        });
        assert!(heap.alloc_string(8).is_ok());
        let charged = heap.data_after_gc();
        let err = heap.alloc_string(9).unwrap_err();
        assert_eq!(err, HeapError::StringTooLong { requested: 9, max: 8 });
        assert_eq!(heap.data_after_gc(), charged);
        assert_eq!(heap.live_strings(), 1);
    }

    #[test]
    fn test_concat_and_dup() {
        let mut heap = heap();
        let s = heap.concat(&[b"foo", b"", b"bar"]).unwrap();
        assert_eq!(heap.string_bytes(s), b"foobar");
        let d = heap.string_dup(b"xyz").unwrap();
        assert_eq!(heap.string_bytes(d), b"xyz");
    }

    #[test]
    fn test_set_string_len() {
        let mut heap = heap();
        let s = heap.string_dup(b"hello").unwrap();
        assert!(heap.set_string_len(s, 2));
        assert_eq!(heap.string_bytes(s), b"he");
        assert!(!heap.set_string_len(s, 6));
        assert!(!heap.set_string_len(heap.null_string(), 0));
    }

    #[test]
    #[should_panic(expected = "read-only string")]
    fn test_null_string_is_read_only() {
        let mut heap = heap();
        let s = heap.null_string();
        heap.string_bytes_mut(s);
    }

    #[test]
    fn test_vector_slots_start_null() {
        let mut heap = heap();
        let v = heap.alloc_vector(3).unwrap();
        assert_eq!(heap.vector_values(v), vec![Value::Null; 3]);
        heap.vector_set(v, 1, Value::int(9));
        assert_eq!(heap.vector_ref(v, 1), Value::int(9));
        let c = heap.alloc_compiled(2).unwrap();
        assert_eq!(heap.vector_len(c), 2);
    }

    #[test]
    fn test_symbol_defaults() {
        let mut heap = heap();
        let name = heap.string_dup(b"foo").unwrap();
        let sym = heap.alloc_symbol(name).unwrap();
        assert_eq!(heap.symbol_value(sym), Value::VOID);
        assert_eq!(heap.symbol_function(sym), Value::VOID);
        assert!(heap.is_nil(heap.symbol_plist(sym)));
        assert_eq!(heap.symbol_next(sym), Value::Null);
    }

    #[test]
    fn test_funarg_round_trip() {
        let mut heap = heap();
        let nil = heap.nil();
        let f = heap.alloc_funarg(Funarg::new(Value::int(1), nil)).unwrap();
        let mut parts = heap.funarg(f);
        assert_eq!(parts.fun, Value::int(1));
        parts.env = Value::int(2);
        heap.set_funarg(f, parts);
        assert_eq!(heap.funarg(f).env, Value::int(2));
    }

    #[test]
    fn test_heap_limit_yields_out_of_memory() {
        let mut heap = Heap::new(GcConfig {
            pair_block_size: 4,
            ..GcConfig::default()
        });
        heap.set_heap_limit(Some(space::vector_bytes(2).unwrap()));
        assert!(heap.alloc_vector(2).is_ok());
        assert!(matches!(
            heap.alloc_vector(2),
            Err(HeapError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_thresholds_are_adjustable() {
        let mut heap = heap();
        heap.set_gc_threshold(10);
        heap.set_idle_gc_threshold(5);
        assert_eq!(heap.gc_threshold(), 10);
        assert_eq!(heap.idle_gc_threshold(), 5);
        heap.note_allocation(7);
        assert!(!heap.should_collect(Activity::Active));
        assert!(heap.should_collect(Activity::Idle));
    }
}
