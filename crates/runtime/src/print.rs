//! Writers for the built-in kinds
//!
//! Elements of lists and vectors are always written in machine-readable
//! form. A list is walked along its tails, so only nesting through cars
//! costs native stack.

use crate::dispatch::Stream;
use crate::heap::Heap;
use cellmem_core::{CellKind, Value};
use std::fmt::{self, Write};

pub(crate) fn lisp_prin(heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
    match value {
        Value::Null => Ok(()),
        Value::Int(n) => write!(stream, "{}", n),
        Value::Cell(kind, _) => match kind {
            CellKind::Pair => list_prin(heap, stream, value),
            CellKind::Vector => vector_prin(heap, stream, value),
            CellKind::Compiled => stream.write_str("#<bytecode>"),
            CellKind::Symbol => symbol_prin(heap, stream, value),
            CellKind::String => string_princ(heap, stream, value),
            CellKind::Funarg => stream.write_str("#<closure>"),
            CellKind::Var => stream.write_str("#<var>"),
            CellKind::SpecialForm => stream.write_str("#<special-form>"),
            CellKind::Void => stream.write_str("#<void>"),
            _ => stream.write_str("#<subr>"),
        },
        Value::Wide(_, _) => write!(stream, "#<{}>", heap.type_name(value)),
    }
}

/// An element of a list or vector; unset slots show as `#<null>`
fn element_print(heap: &mut Heap, stream: &mut Stream<'_>, item: Value) -> fmt::Result {
    if item.is_null() {
        stream.write_str("#<null>")
    } else {
        heap.print_val(stream, item)
    }
}

fn list_prin(heap: &mut Heap, stream: &mut Stream<'_>, list: Value) -> fmt::Result {
    stream.write_char('(')?;
    let mut cur = list;
    loop {
        let car = heap.car(cur);
        element_print(heap, stream, car)?;
        let cdr = heap.cdr(cur);
        if cdr.is_pair() {
            stream.write_char(' ')?;
            cur = cdr;
        } else if heap.is_nil(cdr) {
            break;
        } else {
            stream.write_str(" . ")?;
            element_print(heap, stream, cdr)?;
            break;
        }
    }
    stream.write_char(')')
}

fn vector_prin(heap: &mut Heap, stream: &mut Stream<'_>, vector: Value) -> fmt::Result {
    stream.write_char('[')?;
    for i in 0..heap.vector_len(vector) {
        if i > 0 {
            stream.write_char(' ')?;
        }
        let item = heap.vector_ref(vector, i);
        element_print(heap, stream, item)?;
    }
    stream.write_char(']')
}

fn symbol_prin(heap: &mut Heap, stream: &mut Stream<'_>, symbol: Value) -> fmt::Result {
    if heap.is_nil(symbol) {
        return stream.write_str("()");
    }
    let name = heap.symbol_name(symbol);
    if !name.is_string() {
        return stream.write_str("#<symbol>");
    }
    stream.write_str(&String::from_utf8_lossy(heap.string_bytes(name)))
}

/// Raw contents
pub(crate) fn string_princ(heap: &mut Heap, stream: &mut Stream<'_>, string: Value) -> fmt::Result {
    stream.write_str(&String::from_utf8_lossy(heap.string_bytes(string)))
}

/// Double-quoted with escapes
pub(crate) fn string_print(heap: &mut Heap, stream: &mut Stream<'_>, string: Value) -> fmt::Result {
    stream.write_char('"')?;
    for c in String::from_utf8_lossy(heap.string_bytes(string)).chars() {
        match c {
            '"' => stream.write_str("\\\"")?,
            '\\' => stream.write_str("\\\\")?,
            '\n' => stream.write_str("\\n")?,
            '\t' => stream.write_str("\\t")?,
            '\r' => stream.write_str("\\r")?,
            '\x0c' => stream.write_str("\\f")?,
            c if c.is_control() => write!(stream, "\\{:03o}", c as u32)?,
            c => stream.write_char(c)?,
        }
    }
    stream.write_char('"')
}
