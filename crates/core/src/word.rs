//! Packed one-word value encoding
//!
//! Every slot of every heap cell stores a [`Word`]: a single 64-bit word that
//! encodes a [`Value`]. This module is the only place that inspects raw bits;
//! everything else converts to `Value` and matches on the enum.
//!
//! ## Encoding Scheme
//!
//! ```text
//! Inline int:   [ 63-bit signed integer                           | 1 ]
//! Null:         [ 0000 .................................. 0000     | 0 ]
//! Narrow cell:  [ cell index (32) | 0 (25) | kind (4)  | 01 | 0 ]
//! Wide cell:    [ cell index (32) | 0 (16) | type (8) | 0 (5) | 10 | 0 ]
//! ```
//!
//! Bit 0 alone separates inline integers from everything else, so integer
//! checks on the hot path are a single test. Bits 1..2 pick the dispatch path
//! (narrow or wide); no other metadata is consulted to classify a word.

use crate::value::{CellId, CellKind, TypeCode, Value};

// =============================================================================
// Constants
// =============================================================================

/// Low bit set: inline integer
const INT_TAG: u64 = 0x1;

/// Class field (bits 2:1)
const CLASS_SHIFT: u32 = 1;
const CLASS_MASK: u64 = 0b11 << CLASS_SHIFT;
const CLASS_NARROW: u64 = 0b01;
const CLASS_WIDE: u64 = 0b10;

/// Narrow kind field (bits 6:3)
const KIND_SHIFT: u32 = 3;
const KIND_MASK: u64 = 0xF << KIND_SHIFT;

/// Wide type number field (bits 15:8)
const WIDE_SHIFT: u32 = 8;
const WIDE_MASK: u64 = 0xFF << WIDE_SHIFT;

/// Cell index (bits 63:32)
const INDEX_SHIFT: u32 = 32;

// =============================================================================
// Word
// =============================================================================

/// A packed value as stored inside heap cells
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Word(u64);

impl Word {
    /// The packed form of `Value::Null`
    pub const NULL: Word = Word(0);

    /// Raw bits (for diagnostics and images only)
    #[inline(always)]
    pub fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuild a word from raw bits
    ///
    /// Returns None if the bits are not a valid encoding.
    pub fn from_bits(bits: u64) -> Option<Self> {
        let word = Word(bits);
        if bits & INT_TAG != 0 || bits == 0 {
            return Some(word);
        }
        match (bits & CLASS_MASK) >> CLASS_SHIFT {
            CLASS_NARROW => {
                let stray = bits & !(CLASS_MASK | KIND_MASK | (u64::MAX << INDEX_SHIFT));
                (stray == 0).then_some(word)
            }
            CLASS_WIDE => {
                let stray = bits & !(CLASS_MASK | WIDE_MASK | (u64::MAX << INDEX_SHIFT));
                (stray == 0).then_some(word)
            }
            _ => None,
        }
    }

    /// True if this word encodes an inline integer
    #[inline(always)]
    pub fn is_int(self) -> bool {
        self.0 & INT_TAG != 0
    }

    /// Encode a value
    ///
    /// # Panics
    /// Panics if a `Value::Int` lies outside the 63-bit inline range.
    #[inline]
    pub fn pack(value: Value) -> Self {
        match value {
            Value::Null => Word::NULL,
            Value::Int(n) => {
                assert!(
                    Value::try_int(n).is_some(),
                    "Integer {} exceeds 63-bit inline range",
                    n
                );
                Word(((n as u64) << 1) | INT_TAG)
            }
            Value::Cell(kind, id) => Word(
                ((id.raw() as u64) << INDEX_SHIFT)
                    | ((kind as u64) << KIND_SHIFT)
                    | (CLASS_NARROW << CLASS_SHIFT),
            ),
            Value::Wide(code, id) => {
                assert!(code.wide_number().is_some(), "narrow code {} in Value::Wide", code);
                let n = code.raw() & 0xFF;
                Word(
                    ((id.raw() as u64) << INDEX_SHIFT)
                        | ((n as u64) << WIDE_SHIFT)
                        | (CLASS_WIDE << CLASS_SHIFT),
                )
            }
        }
    }

    /// Decode back into a value
    #[inline]
    pub fn unpack(self) -> Value {
        if self.is_int() {
            // Arithmetic shift sign-extends the 63-bit payload
            return Value::Int((self.0 as i64) >> 1);
        }
        if self.0 == 0 {
            return Value::Null;
        }
        let id = CellId::new((self.0 >> INDEX_SHIFT) as u32);
        match (self.0 & CLASS_MASK) >> CLASS_SHIFT {
            CLASS_NARROW => {
                let bits = ((self.0 & KIND_MASK) >> KIND_SHIFT) as u8;
                // 4 bits always decode to one of the 16 kinds
                let kind = CellKind::from_bits(bits).unwrap_or(CellKind::Void);
                Value::Cell(kind, id)
            }
            CLASS_WIDE => {
                let n = ((self.0 & WIDE_MASK) >> WIDE_SHIFT) as u8;
                Value::Wide(TypeCode::wide(n), id)
            }
            _ => panic!("corrupt value word 0x{:016x}", self.0),
        }
    }
}

impl From<Value> for Word {
    fn from(value: Value) -> Self {
        Word::pack(value)
    }
}

impl From<Word> for Value {
    fn from(word: Word) -> Self {
        word.unpack()
    }
}

impl Default for Word {
    fn default() -> Self {
        Word::NULL
    }
}

impl std::fmt::Debug for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Word(0x{:016x} = {:?})", self.0, self.unpack())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{MAX_INT, MIN_INT};

    #[test]
    fn test_word_is_one_machine_word() {
        assert_eq!(std::mem::size_of::<Word>(), 8);
    }

    #[test]
    fn test_int_edges() {
        for n in [0, 1, -1, 42, MAX_INT, MIN_INT] {
            let w = Word::pack(Value::int(n));
            assert!(w.is_int());
            assert_eq!(w.unpack(), Value::Int(n), "round trip for {}", n);
        }
    }

    #[test]
    #[should_panic(expected = "exceeds 63-bit inline range")]
    fn test_out_of_range_int_is_rejected() {
        Word::pack(Value::Int(1 << 62));
    }

    #[test]
    fn test_null_is_zero() {
        assert_eq!(Word::pack(Value::Null).to_bits(), 0);
        assert_eq!(Word::NULL.unpack(), Value::Null);
        assert!(!Word::NULL.is_int());
    }

    #[test]
    fn test_cell_kinds_discriminate() {
        let id = CellId::new(0xDEAD_BEEF);
        for kind in CellKind::ALL {
            let w = Word::pack(Value::Cell(kind, id));
            assert!(!w.is_int());
            assert_eq!(w.unpack(), Value::Cell(kind, id));
        }
    }

    #[test]
    fn test_wide_cells_keep_type_number() {
        let id = CellId::new(u32::MAX);
        let v = Value::wide(TypeCode::wide(255), id);
        assert_eq!(Word::pack(v).unpack(), v);

        let v0 = Value::wide(TypeCode::wide(0), CellId::new(0));
        let w0 = Word::pack(v0);
        assert_ne!(w0, Word::NULL);
        assert_eq!(w0.unpack(), v0);
    }

    #[test]
    fn test_void_at_index_zero_is_not_null() {
        assert_ne!(Word::pack(Value::VOID), Word::NULL);
        assert_eq!(Word::pack(Value::VOID).unpack(), Value::VOID);
    }

    #[test]
    fn test_from_bits_rejects_garbage() {
        assert!(Word::from_bits(0b110).is_none()); // class 11
        assert!(Word::from_bits(0b010 | (1 << 20)).is_none()); // stray bit in narrow
        let good = Word::pack(Value::symbol(CellId::new(9)));
        assert_eq!(Word::from_bits(good.to_bits()), Some(good));
    }
}
