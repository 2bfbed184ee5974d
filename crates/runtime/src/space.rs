//! Cell storage for the built-in kinds
//!
//! `CellSpace` owns every pool and the resident-byte accounting that the
//! optional heap limit is checked against. It knows nothing about roots or
//! types; the heap and the collector drive it.

use crate::chain::Chain;
use crate::pairs::{PairCell, PairPool, PairSweep};
use cellmem_core::{CellId, HeapError, HeapResult, Word};

/// Bytes charged per pair
pub const PAIR_BYTES: usize = 2 * std::mem::size_of::<Word>();

/// Bytes charged per vector, on top of its slots
pub const VECTOR_HEADER_BYTES: usize = 2 * std::mem::size_of::<Word>();

/// Bytes charged per string, on top of its buffer
pub const STRING_HEADER_BYTES: usize = 2 * std::mem::size_of::<Word>();

/// Bytes charged per symbol
pub const SYMBOL_BYTES: usize = 5 * std::mem::size_of::<Word>();

/// Bytes charged per closure
pub const FUNARG_BYTES: usize = 5 * std::mem::size_of::<Word>();

/// Bytes charged for a vector of `size` slots
///
/// A size whose byte count does not fit in `usize` is out of memory.
#[inline]
pub fn vector_bytes(size: usize) -> HeapResult<usize> {
    size.checked_mul(std::mem::size_of::<Word>())
        .and_then(|slots| slots.checked_add(VECTOR_HEADER_BYTES))
        .ok_or(HeapError::OutOfMemory {
            requested: usize::MAX,
        })
}

/// Bytes charged for a string of `len` bytes
#[inline]
pub fn string_bytes(len: usize) -> HeapResult<usize> {
    len.checked_add(STRING_HEADER_BYTES)
        .ok_or(HeapError::OutOfMemory {
            requested: usize::MAX,
        })
}

pub(crate) struct VectorCell {
    pub slots: Box<[Word]>,
}

pub(crate) struct StringCell {
    /// Exactly the requested number of bytes
    pub data: Box<[u8]>,
    /// Logical length, never more than `data.len()`
    pub len: usize,
}

impl StringCell {
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

pub(crate) struct SymbolCell {
    pub name: Word,
    pub value: Word,
    pub function: Word,
    pub prop_list: Word,
    /// Successor in the obarray hash chain
    pub next: Word,
}

pub(crate) struct FunargCell {
    pub fun: Word,
    pub env: Word,
    pub fenv: Word,
    pub special_env: Word,
    pub fh_env: Word,
}

/// Storage for every built-in pool
pub(crate) struct CellSpace {
    pub pairs: PairPool,
    /// Vectors and compiled-code blocks
    pub vectors: Chain<VectorCell>,
    pub strings: Chain<StringCell>,
    pub symbols: Chain<SymbolCell>,
    pub funargs: Chain<FunargCell>,

    limit: Option<usize>,
    pair_bytes: usize,
    vector_bytes: usize,
    string_bytes: usize,
    symbol_bytes: usize,
    funarg_bytes: usize,

    /// Slots in swept vectors (image vectors are counted separately)
    vector_slots: usize,
    image_vectors: usize,
    image_vector_slots: usize,
    /// Swept strings and their bytes
    live_strings: usize,
    live_string_bytes: usize,
}

impl CellSpace {
    pub(crate) fn new(pair_block_size: usize) -> Self {
        Self {
            pairs: PairPool::new(pair_block_size),
            vectors: Chain::new("vector"),
            strings: Chain::new("string"),
            symbols: Chain::new("symbol"),
            funargs: Chain::new("funarg"),
            limit: None,
            pair_bytes: 0,
            vector_bytes: 0,
            string_bytes: 0,
            symbol_bytes: 0,
            funarg_bytes: 0,
            vector_slots: 0,
            image_vectors: 0,
            image_vector_slots: 0,
            live_strings: 0,
            live_string_bytes: 0,
        }
    }

    pub(crate) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub(crate) fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes currently held by the pools
    pub(crate) fn resident(&self) -> usize {
        self.pair_bytes + self.vector_bytes + self.string_bytes + self.symbol_bytes + self.funarg_bytes
    }

    fn reserve(&self, bytes: usize) -> HeapResult<()> {
        match self.limit {
            Some(limit) if self.resident().saturating_add(bytes) > limit => {
                Err(HeapError::OutOfMemory { requested: bytes })
            }
            _ => Ok(()),
        }
    }

    fn block_bytes(&self) -> usize {
        self.pairs.block_size() * PAIR_BYTES
    }

    pub(crate) fn alloc_pair(&mut self, cell: PairCell) -> HeapResult<CellId> {
        if self.pairs.needs_block() {
            let bytes = self.block_bytes();
            self.reserve(bytes)?;
            self.pairs.add_block()?;
            self.pair_bytes += bytes;
        }
        Ok(self.pairs.pop(cell))
    }

    /// A vector of null slots, with the bytes charged for it
    pub(crate) fn alloc_vector(&mut self, size: usize) -> HeapResult<(CellId, usize)> {
        let bytes = vector_bytes(size)?;
        self.reserve(bytes)?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(size)
            .map_err(|_| HeapError::OutOfMemory { requested: bytes })?;
        slots.resize(size, Word::NULL);
        let id = self.vectors.insert(VectorCell {
            slots: slots.into_boxed_slice(),
        })?;
        self.vector_bytes += bytes;
        self.vector_slots += size;
        Ok((id, bytes))
    }

    fn zeroed(len: usize) -> HeapResult<Box<[u8]>> {
        let requested = string_bytes(len)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| HeapError::OutOfMemory { requested })?;
        data.resize(len, 0);
        Ok(data.into_boxed_slice())
    }

    /// A zero-filled string, with the bytes charged for it
    pub(crate) fn alloc_string(&mut self, len: usize) -> HeapResult<(CellId, usize)> {
        let bytes = string_bytes(len)?;
        self.reserve(bytes)?;
        let data = Self::zeroed(len)?;
        let id = self.strings.insert(StringCell { data, len })?;
        self.string_bytes += bytes;
        self.live_strings += 1;
        self.live_string_bytes += bytes;
        Ok((id, bytes))
    }

    pub(crate) fn alloc_symbol(&mut self, cell: SymbolCell) -> HeapResult<CellId> {
        self.reserve(SYMBOL_BYTES)?;
        let id = self.symbols.insert(cell)?;
        self.symbol_bytes += SYMBOL_BYTES;
        Ok(id)
    }

    pub(crate) fn alloc_funarg(&mut self, cell: FunargCell) -> HeapResult<CellId> {
        self.reserve(FUNARG_BYTES)?;
        let id = self.funargs.insert(cell)?;
        self.funarg_bytes += FUNARG_BYTES;
        Ok(id)
    }

    /// A string that is never marked or swept
    pub(crate) fn frozen_string(&mut self, bytes: &[u8]) -> HeapResult<CellId> {
        let mut data = Self::zeroed(bytes.len())?;
        data.copy_from_slice(bytes);
        self.strings.insert_frozen(StringCell {
            data,
            len: bytes.len(),
        })
    }

    pub(crate) fn frozen_vector(&mut self, size: usize) -> HeapResult<CellId> {
        let requested = vector_bytes(size)?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(size)
            .map_err(|_| HeapError::OutOfMemory { requested })?;
        slots.resize(size, Word::NULL);
        let id = self.vectors.insert_frozen(VectorCell {
            slots: slots.into_boxed_slice(),
        })?;
        self.image_vectors += 1;
        self.image_vector_slots += size;
        Ok(id)
    }

    pub(crate) fn frozen_symbol(&mut self, cell: SymbolCell) -> HeapResult<CellId> {
        self.symbols.insert_frozen(cell)
    }

    // =========================================================================
    // Sweeping
    // =========================================================================

    pub(crate) fn sweep_pairs(&mut self) -> PairSweep {
        let result = self.pairs.sweep();
        self.pair_bytes -= result.released_blocks * self.block_bytes();
        result
    }

    pub(crate) fn sweep_vectors(&mut self) -> usize {
        let mut slots = 0;
        let released = self.vectors.sweep(|v| slots += v.slots.len());
        self.vector_slots = slots;
        self.vector_bytes = self.vectors_resident(slots);
        released
    }

    fn vectors_resident(&self, swept_slots: usize) -> usize {
        // Every chain survivor carries one header
        let swept_cells = self.vectors.len() - self.image_vectors;
        swept_cells * VECTOR_HEADER_BYTES + swept_slots * std::mem::size_of::<Word>()
    }

    pub(crate) fn sweep_strings(&mut self) -> usize {
        let mut count = 0;
        let mut bytes = 0;
        let released = self.strings.sweep(|s| {
            count += 1;
            bytes += STRING_HEADER_BYTES + s.data.len();
        });
        self.live_strings = count;
        self.live_string_bytes = bytes;
        self.string_bytes = bytes;
        released
    }

    pub(crate) fn sweep_symbols(&mut self) -> usize {
        let mut count = 0;
        let released = self.symbols.sweep(|_| count += 1);
        self.symbol_bytes = count * SYMBOL_BYTES;
        released
    }

    pub(crate) fn sweep_funargs(&mut self) -> usize {
        let mut count = 0;
        let released = self.funargs.sweep(|_| count += 1);
        self.funarg_bytes = count * FUNARG_BYTES;
        released
    }

    // =========================================================================
    // Accounting
    // =========================================================================

    /// Slots held by live vectors and compiled blocks, image ones included
    pub(crate) fn vector_slots(&self) -> usize {
        self.vector_slots + self.image_vector_slots
    }

    /// Strings allocated since creation that have not been swept
    pub(crate) fn live_strings(&self) -> usize {
        self.live_strings
    }

    /// Bytes held by those strings, headers included
    pub(crate) fn live_string_bytes(&self) -> usize {
        self.live_string_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_refuses_growth() {
        let mut space = CellSpace::new(4);
        space.set_limit(Some(4 * PAIR_BYTES));
        for _ in 0..4 {
            space.alloc_pair(PairCell::default()).unwrap();
        }
        // Fifth pair needs a second block
        let err = space.alloc_pair(PairCell::default()).unwrap_err();
        assert_eq!(
            err,
            HeapError::OutOfMemory {
                requested: 4 * PAIR_BYTES
            }
        );
        assert_eq!(space.resident(), 4 * PAIR_BYTES);
    }

    #[test]
    fn test_string_accounting() {
        let mut space = CellSpace::new(4);
        let (a, charged) = space.alloc_string(10).unwrap();
        assert_eq!(charged, string_bytes(10).unwrap());
        space.alloc_string(3).unwrap();
        assert_eq!(space.live_strings(), 2);
        assert_eq!(
            space.live_string_bytes(),
            string_bytes(10).unwrap() + string_bytes(3).unwrap()
        );

        space.strings.set_mark(a);
        assert_eq!(space.sweep_strings(), 1);
        assert_eq!(space.live_strings(), 1);
        assert_eq!(space.live_string_bytes(), string_bytes(10).unwrap());
        assert_eq!(space.resident(), string_bytes(10).unwrap());
    }

    #[test]
    fn test_vector_accounting_with_frozen() {
        let mut space = CellSpace::new(4);
        space.frozen_vector(5).unwrap();
        let (v, _) = space.alloc_vector(3).unwrap();
        space.alloc_vector(7).unwrap();
        assert_eq!(space.vector_slots(), 15);

        space.vectors.set_mark(v);
        space.sweep_vectors();
        assert_eq!(space.vector_slots(), 8);
        assert_eq!(space.resident(), vector_bytes(3).unwrap());
    }

    #[test]
    fn test_oversized_requests_do_not_overflow() {
        let mut space = CellSpace::new(4);
        let too_big = HeapError::OutOfMemory {
            requested: usize::MAX,
        };
        assert_eq!(vector_bytes(usize::MAX / 4), Err(too_big.clone()));
        assert_eq!(string_bytes(usize::MAX - 4), Err(too_big.clone()));
        assert_eq!(space.alloc_vector(usize::MAX / 4), Err(too_big.clone()));
        assert_eq!(space.alloc_string(usize::MAX), Err(too_big.clone()));
        assert_eq!(space.frozen_vector(usize::MAX / 2), Err(too_big));
        assert_eq!(space.resident(), 0);
    }

    #[test]
    fn test_new_string_is_zero_filled() {
        let mut space = CellSpace::new(4);
        let (s, _) = space.alloc_string(4).unwrap();
        assert_eq!(space.strings.get(s).bytes(), &[0, 0, 0, 0]);
    }
}
