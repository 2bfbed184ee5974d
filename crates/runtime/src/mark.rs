//! Mark phase
//!
//! Marking never recurses on the native stack. Values waiting to be visited
//! sit on an explicit worklist, and the structures that form long chains are
//! walked by replacing the current value and looping:
//!
//! - a pair queues its car and continues with its cdr (or with its car when
//!   the cdr needs no marking), so a list of any length costs O(1) stack
//! - a symbol queues its name, value, function and property list, then
//!   continues along its hash-chain successor
//! - a closure queues its environments and continues with its function
//!
//! Vectors queue every element. Wide cells are recorded in the collector's
//! wide-mark set and handed to their type's `mark` callback, which queues
//! whatever the instance owns.
//!
//! Read-only cells (image pairs, vectors and strings, the null string) are
//! never marked; their bits are left untouched.

use crate::registry::TypeRegistry;
use crate::space::CellSpace;
use cellmem_core::{CellId, CellKind, TypeCode, Value};
use std::collections::HashSet;
use std::rc::Rc;

/// Marks wide cells by `(type code, cell id)`
pub(crate) type WideMarks = HashSet<(TypeCode, CellId)>;

/// Handle passed to marking callbacks
pub struct Marker<'a> {
    space: &'a mut CellSpace,
    wide_marks: &'a mut WideMarks,
    registry: &'a TypeRegistry,
    pending: Vec<Value>,
    cells_marked: usize,
    max_pending: usize,
}

impl<'a> Marker<'a> {
    pub(crate) fn new(
        space: &'a mut CellSpace,
        wide_marks: &'a mut WideMarks,
        registry: &'a TypeRegistry,
    ) -> Self {
        Self {
            space,
            wide_marks,
            registry,
            pending: Vec::new(),
            cells_marked: 0,
            max_pending: 0,
        }
    }

    /// Queue a value for marking
    #[inline]
    pub fn mark(&mut self, value: Value) {
        if !value.is_immediate() {
            self.pending.push(value);
            if self.pending.len() > self.max_pending {
                self.max_pending = self.pending.len();
            }
        }
    }

    /// Queue several values
    pub fn mark_all(&mut self, values: impl IntoIterator<Item = Value>) {
        for value in values {
            self.mark(value);
        }
    }

    /// True if `value` needs no further marking this cycle
    pub fn is_marked(&self, value: Value) -> bool {
        match value {
            Value::Null | Value::Int(_) => true,
            Value::Cell(kind, id) => match kind {
                CellKind::Pair => self.space.pairs.is_image(id) || self.space.pairs.is_marked(id),
                CellKind::Vector | CellKind::Compiled => {
                    self.space.vectors.is_frozen(id) || self.space.vectors.is_marked(id)
                }
                CellKind::String => {
                    self.space.strings.is_frozen(id) || self.space.strings.is_marked(id)
                }
                CellKind::Symbol => self.space.symbols.is_marked(id),
                CellKind::Funarg => self.space.funargs.is_marked(id),
                _ => true,
            },
            Value::Wide(code, id) => self.wide_marks.contains(&(code, id)),
        }
    }

    /// Cells marked so far
    pub fn cells_marked(&self) -> usize {
        self.cells_marked
    }

    /// Longest the worklist grew
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    #[inline]
    fn needs_mark(&self, value: Value) -> bool {
        !value.is_immediate() && !self.is_marked(value)
    }

    /// Mark everything reachable from the queued values
    pub(crate) fn drain(&mut self) {
        while let Some(value) = self.pending.pop() {
            self.mark_value(value);
        }
    }

    fn mark_value(&mut self, mut val: Value) {
        loop {
            match val {
                Value::Null | Value::Int(_) => return,

                Value::Cell(CellKind::Pair, id) => {
                    if !self.space.pairs.set_mark(id) {
                        return;
                    }
                    self.cells_marked += 1;
                    let cell = *self.space.pairs.get(id);
                    let (car, cdr) = (cell.car.unpack(), cell.cdr.unpack());
                    if self.needs_mark(cdr) {
                        self.mark(car);
                        val = cdr;
                    } else {
                        val = car;
                    }
                }

                Value::Cell(CellKind::Vector | CellKind::Compiled, id) => {
                    if self.space.vectors.is_frozen(id) || !self.space.vectors.set_mark(id) {
                        return;
                    }
                    self.cells_marked += 1;
                    let len = self.space.vectors.get(id).slots.len();
                    for i in 0..len {
                        let slot = self.space.vectors.get(id).slots[i].unpack();
                        self.mark(slot);
                    }
                    return;
                }

                Value::Cell(CellKind::Symbol, id) => {
                    if !self.space.symbols.set_mark(id) {
                        return;
                    }
                    self.cells_marked += 1;
                    let sym = self.space.symbols.get(id);
                    let (name, value, function, plist, next) = (
                        sym.name.unpack(),
                        sym.value.unpack(),
                        sym.function.unpack(),
                        sym.prop_list.unpack(),
                        sym.next.unpack(),
                    );
                    self.mark_all([name, value, function, plist]);
                    val = next;
                }

                Value::Cell(CellKind::String, id) => {
                    if !self.space.strings.is_frozen(id) && self.space.strings.set_mark(id) {
                        self.cells_marked += 1;
                    }
                    return;
                }

                Value::Cell(CellKind::Funarg, id) => {
                    if !self.space.funargs.set_mark(id) {
                        return;
                    }
                    self.cells_marked += 1;
                    let f = self.space.funargs.get(id);
                    let (fun, env, fenv, special_env, fh_env) = (
                        f.fun.unpack(),
                        f.env.unpack(),
                        f.fenv.unpack(),
                        f.special_env.unpack(),
                        f.fh_env.unpack(),
                    );
                    self.mark_all([env, fenv, special_env, fh_env]);
                    val = fun;
                }

                // Primitives and void live outside the heap
                Value::Cell(_, _) => return,

                Value::Wide(code, id) => {
                    if !self.wide_marks.insert((code, id)) {
                        return;
                    }
                    self.cells_marked += 1;
                    let ops = Rc::clone(&self.registry.get_type(code).ops);
                    ops.mark(self, val);
                    return;
                }
            }
        }
    }
}

/// Handle passed to sweep callbacks
pub struct SweepContext<'a> {
    pub(crate) space: &'a mut CellSpace,
    wide_marks: &'a WideMarks,
    code: TypeCode,
    released: usize,
}

impl<'a> SweepContext<'a> {
    pub(crate) fn new(space: &'a mut CellSpace, wide_marks: &'a WideMarks) -> Self {
        Self {
            space,
            wide_marks,
            code: TypeCode::INT,
            released: 0,
        }
    }

    pub(crate) fn set_type(&mut self, code: TypeCode) {
        self.code = code;
    }

    /// Code of the type being swept
    pub fn type_code(&self) -> TypeCode {
        self.code
    }

    /// True if the instance `id` of the type being swept was marked
    pub fn is_marked(&self, id: CellId) -> bool {
        self.wide_marks.contains(&(self.code, id))
    }

    /// Record cells released by the current sweep
    pub fn note_released(&mut self, count: usize) {
        self.released += count;
    }

    /// Cells released by every sweep so far
    pub fn released(&self) -> usize {
        self.released
    }
}
