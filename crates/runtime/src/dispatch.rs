//! Value dispatch
//!
//! Generic entry points that resolve a value's type descriptor and call into
//! its operations. Writers may allocate, so the value being written and the
//! stream object are protected for the duration of the call.

use crate::heap::Heap;
use cellmem_core::Value;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Output destination for the writers
///
/// `object` is the interpreter-level stream value (if any) that the sink
/// belongs to; it is protected while a writer runs.
pub struct Stream<'a> {
    object: Value,
    sink: &'a mut dyn fmt::Write,
}

impl<'a> Stream<'a> {
    /// A stream with no interpreter-level object behind it
    pub fn new(sink: &'a mut dyn fmt::Write) -> Self {
        Self {
            object: Value::Null,
            sink,
        }
    }

    pub fn with_object(object: Value, sink: &'a mut dyn fmt::Write) -> Self {
        Self { object, sink }
    }

    pub fn object(&self) -> Value {
        self.object
    }
}

impl fmt::Write for Stream<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.write_str(s)
    }
}

/// Fallback comparator: equal iff both values have the same type
pub fn type_equal(a: Value, b: Value) -> Ordering {
    if a.type_code() == b.type_code() {
        Ordering::Equal
    } else {
        Ordering::Greater
    }
}

/// Identity comparator for cells with no structural equality
pub fn ptr_cmp(a: Value, b: Value) -> Ordering {
    if a.type_code() == b.type_code() && a == b {
        Ordering::Equal
    } else {
        Ordering::Greater
    }
}

impl Heap {
    /// Compare two values
    ///
    /// Identical values are equal without consulting their type. If either
    /// side is `Null` the result is `Greater`.
    pub fn compare(&self, a: Value, b: Value) -> Ordering {
        if a.is_null() || b.is_null() {
            return Ordering::Greater;
        }
        if a == b {
            return Ordering::Equal;
        }
        match a.type_code() {
            Some(code) => self.registry.get_type(code).ops.compare(self, a, b),
            None => Ordering::Greater,
        }
    }

    /// True if `compare` reports the values equal
    pub fn equal(&self, a: Value, b: Value) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    /// Write the human-readable form of `value`
    pub fn princ_val(&mut self, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        self.write_with(stream, value, false)
    }

    /// Write the machine-readable form of `value`
    pub fn print_val(&mut self, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        self.write_with(stream, value, true)
    }

    fn write_with(&mut self, stream: &mut Stream<'_>, value: Value, machine: bool) -> fmt::Result {
        let Some(code) = value.type_code() else {
            return Ok(());
        };
        let ops = Rc::clone(&self.registry.get_type(code).ops);
        let stream_root = self.protect(stream.object());
        let value_root = self.protect(value);
        let result = if machine {
            ops.print(self, stream, value)
        } else {
            ops.princ(self, stream, value)
        };
        self.unprotect(value_root);
        self.unprotect(stream_root);
        result
    }

    /// `princ_val` into a fresh string
    pub fn princ_to_string(&mut self, value: Value) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.princ_val(&mut Stream::new(&mut out), value);
        out
    }

    /// `print_val` into a fresh string
    pub fn print_to_string(&mut self, value: Value) -> String {
        let mut out = String::new();
        let _ = self.print_val(&mut Stream::new(&mut out), value);
        out
    }

    /// Display name of the value's type
    ///
    /// # Panics
    /// Panics if the value's type code is not registered.
    pub fn type_name(&self, value: Value) -> &str {
        match value.type_code() {
            Some(code) => &self.registry.get_type(code).name,
            None => "null",
        }
    }

    /// Enter a dynamic binding through the value's type
    pub fn bind_value(&mut self, value: Value) -> Value {
        let Some(code) = value.type_code() else {
            return Value::Null;
        };
        let ops = Rc::clone(&self.registry.get_type(code).ops);
        ops.bind(self, value)
    }

    /// Leave a binding entered by `bind_value`
    pub fn unbind_value(&mut self, value: Value, handle: Value) {
        if let Some(code) = value.type_code() {
            let ops = Rc::clone(&self.registry.get_type(code).ops);
            ops.unbind(self, value, handle);
        }
    }
}
