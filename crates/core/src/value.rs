//! Core Value type
//!
//! A `Value` is what the interpreter talks about. It is one of three disjoint
//! encodings:
//!
//! - an inline small integer, never heap allocated, never marked or swept
//! - a *narrow* cell: a heap cell of one of the built-in kinds in [`CellKind`]
//! - a *wide* cell: a heap cell owned by an extension type registered at runtime
//!
//! plus the `Null` sentinel meaning "no value". The enum is the language-level
//! view; cells store the packed one-word form (see [`crate::word`]).

use std::fmt;

/// Built-in heap cell kinds (the narrow tag space, 4 bits)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellKind {
    Pair = 0,
    Vector = 1,
    Compiled = 2,
    Symbol = 3,
    String = 4,
    Funarg = 5,
    Var = 6,
    Subr0 = 7,
    Subr1 = 8,
    Subr2 = 9,
    Subr3 = 10,
    Subr4 = 11,
    Subr5 = 12,
    SubrN = 13,
    SpecialForm = 14,
    Void = 15,
}

impl CellKind {
    pub const ALL: [CellKind; 16] = [
        CellKind::Pair,
        CellKind::Vector,
        CellKind::Compiled,
        CellKind::Symbol,
        CellKind::String,
        CellKind::Funarg,
        CellKind::Var,
        CellKind::Subr0,
        CellKind::Subr1,
        CellKind::Subr2,
        CellKind::Subr3,
        CellKind::Subr4,
        CellKind::Subr5,
        CellKind::SubrN,
        CellKind::SpecialForm,
        CellKind::Void,
    ];

    /// Decode a 4-bit narrow tag
    #[inline]
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    /// Display name used when registering the kind's type descriptor
    pub fn name(self) -> &'static str {
        match self {
            CellKind::Pair => "cons",
            CellKind::Vector => "vector",
            CellKind::Compiled => "bytecode",
            CellKind::Symbol => "symbol",
            CellKind::String => "string",
            CellKind::Funarg => "funarg",
            CellKind::Var => "var",
            CellKind::Subr0 => "subr0",
            CellKind::Subr1 => "subr1",
            CellKind::Subr2 => "subr2",
            CellKind::Subr3 => "subr3",
            CellKind::Subr4 => "subr4",
            CellKind::Subr5 => "subr5",
            CellKind::SubrN => "subrn",
            CellKind::SpecialForm => "special-form",
            CellKind::Void => "void",
        }
    }

    /// Primitive kinds refer to static descriptors owned by the evaluator.
    /// They are never allocated from a pool and never marked.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            CellKind::Var
                | CellKind::Subr0
                | CellKind::Subr1
                | CellKind::Subr2
                | CellKind::Subr3
                | CellKind::Subr4
                | CellKind::Subr5
                | CellKind::SubrN
                | CellKind::SpecialForm
        )
    }
}

/// Index of a cell inside the pool that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        CellId(index)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Maximum number of extension ("wide") types
pub const MAX_WIDE_TYPES: usize = 256;

/// Numeric type code keyed into the type registry
///
/// ```text
/// 0x0001          integer
/// 0x0010..0x001F  narrow kinds (0x10 | CellKind)
/// 0x0100..0x01FF  wide types   (0x100 | n)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode(u16);

const NARROW_BASE: u16 = 0x10;
const WIDE_BASE: u16 = 0x100;

impl TypeCode {
    pub const INT: TypeCode = TypeCode(0x01);

    #[inline]
    pub const fn narrow(kind: CellKind) -> Self {
        TypeCode(NARROW_BASE | kind as u16)
    }

    #[inline]
    pub const fn wide(n: u8) -> Self {
        TypeCode(WIDE_BASE | n as u16)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Wide type number, if this is an extension type code
    #[inline]
    pub fn wide_number(self) -> Option<u8> {
        if self.0 & WIDE_BASE != 0 {
            Some((self.0 & 0xFF) as u8)
        } else {
            None
        }
    }

    /// Built-in kind, if this is a narrow type code
    #[inline]
    pub fn narrow_kind(self) -> Option<CellKind> {
        if self.0 & 0xFFF0 == NARROW_BASE {
            CellKind::from_bits((self.0 & 0x0F) as u8)
        } else {
            None
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03x}", self.0)
    }
}

/// Largest inline integer (63-bit signed)
pub const MAX_INT: i64 = (1i64 << 62) - 1;

/// Smallest inline integer (63-bit signed)
pub const MIN_INT: i64 = -(1i64 << 62);

/// A runtime value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Value {
    /// The "no value" sentinel
    #[default]
    Null,
    /// Inline small integer
    Int(i64),
    /// Built-in heap cell
    Cell(CellKind, CellId),
    /// Extension heap cell; the code is always a wide type code
    Wide(TypeCode, CellId),
}

impl Value {
    /// The canonical void value
    pub const VOID: Value = Value::Cell(CellKind::Void, CellId::new(0));

    /// Create an inline integer
    ///
    /// # Panics
    /// Panics in debug builds if `n` is outside the 63-bit inline range.
    #[inline]
    pub fn int(n: i64) -> Self {
        debug_assert!(
            (MIN_INT..=MAX_INT).contains(&n),
            "Integer {} outside inline range [{}, {}]",
            n,
            MIN_INT,
            MAX_INT
        );
        Value::Int(n)
    }

    /// Create an inline integer, returning None if out of range
    #[inline]
    pub fn try_int(n: i64) -> Option<Self> {
        if (MIN_INT..=MAX_INT).contains(&n) {
            Some(Value::Int(n))
        } else {
            None
        }
    }

    #[inline]
    pub fn pair(id: CellId) -> Self {
        Value::Cell(CellKind::Pair, id)
    }

    #[inline]
    pub fn vector(id: CellId) -> Self {
        Value::Cell(CellKind::Vector, id)
    }

    #[inline]
    pub fn compiled(id: CellId) -> Self {
        Value::Cell(CellKind::Compiled, id)
    }

    #[inline]
    pub fn string(id: CellId) -> Self {
        Value::Cell(CellKind::String, id)
    }

    #[inline]
    pub fn symbol(id: CellId) -> Self {
        Value::Cell(CellKind::Symbol, id)
    }

    #[inline]
    pub fn funarg(id: CellId) -> Self {
        Value::Cell(CellKind::Funarg, id)
    }

    /// Create a wide value
    ///
    /// # Panics
    /// Panics if `code` is not a wide type code.
    #[inline]
    pub fn wide(code: TypeCode, id: CellId) -> Self {
        assert!(
            code.wide_number().is_some(),
            "type code {} is not an extension type code",
            code
        );
        Value::Wide(code, id)
    }

    /// Type code from the tag alone; `Null` has none
    #[inline]
    pub fn type_code(self) -> Option<TypeCode> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(TypeCode::INT),
            Value::Cell(kind, _) => Some(TypeCode::narrow(kind)),
            Value::Wide(code, _) => Some(code),
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for values that carry no heap cell (Null and inline ints)
    #[inline]
    pub fn is_immediate(self) -> bool {
        matches!(self, Value::Null | Value::Int(_))
    }

    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn is_pair(self) -> bool {
        matches!(self, Value::Cell(CellKind::Pair, _))
    }

    #[inline]
    pub fn is_string(self) -> bool {
        matches!(self, Value::Cell(CellKind::String, _))
    }

    #[inline]
    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Cell(CellKind::Symbol, _))
    }

    /// True for plain vectors and compiled-code blocks
    #[inline]
    pub fn is_vector_like(self) -> bool {
        matches!(
            self,
            Value::Cell(CellKind::Vector, _) | Value::Cell(CellKind::Compiled, _)
        )
    }

    /// Cell id of a narrow cell of the given kind
    #[inline]
    pub fn cell_of(self, kind: CellKind) -> Option<CellId> {
        match self {
            Value::Cell(k, id) if k == kind => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_are_disjoint() {
        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(TypeCode::INT));
        for kind in CellKind::ALL {
            assert!(seen.insert(TypeCode::narrow(kind)), "{:?}", kind);
        }
        for n in 0..=255u8 {
            assert!(seen.insert(TypeCode::wide(n)));
        }
    }

    #[test]
    fn test_type_code_classification() {
        assert_eq!(TypeCode::wide(7).wide_number(), Some(7));
        assert_eq!(TypeCode::wide(7).narrow_kind(), None);
        assert_eq!(
            TypeCode::narrow(CellKind::String).narrow_kind(),
            Some(CellKind::String)
        );
        assert_eq!(TypeCode::narrow(CellKind::String).wide_number(), None);
        assert_eq!(TypeCode::INT.narrow_kind(), None);
        assert_eq!(TypeCode::INT.wide_number(), None);
    }

    #[test]
    fn test_value_type_code() {
        assert_eq!(Value::Null.type_code(), None);
        assert_eq!(Value::int(3).type_code(), Some(TypeCode::INT));
        assert_eq!(
            Value::pair(CellId::new(4)).type_code(),
            Some(TypeCode::narrow(CellKind::Pair))
        );
        let code = TypeCode::wide(2);
        assert_eq!(Value::wide(code, CellId::new(0)).type_code(), Some(code));
    }

    #[test]
    #[should_panic(expected = "not an extension type code")]
    fn test_wide_rejects_narrow_code() {
        let _ = Value::wide(TypeCode::narrow(CellKind::Pair), CellId::new(0));
    }

    #[test]
    fn test_try_int_range() {
        assert!(Value::try_int(MAX_INT).is_some());
        assert!(Value::try_int(MIN_INT).is_some());
        assert!(Value::try_int(MAX_INT + 1).is_none());
        assert!(Value::try_int(MIN_INT - 1).is_none());
    }

    #[test]
    fn test_primitive_kinds() {
        assert!(CellKind::Subr3.is_primitive());
        assert!(CellKind::SpecialForm.is_primitive());
        assert!(!CellKind::Pair.is_primitive());
        assert!(!CellKind::Void.is_primitive());
    }
}
