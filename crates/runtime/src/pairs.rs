//! Block-allocated pair pool
//!
//! Pairs are the dominant allocation, so they come from fixed-size blocks
//! rather than the per-cell slab used by [`crate::chain::Chain`]. Each
//! block's slots start out pre-linked into a free-list; a pool-wide free-list
//! threads through every block. A pair's id is `block * block_size + slot`.
//!
//! Sweep rebuilds the free-list block by block. A block with no surviving
//! pair is released to the system outright, leaving a vacant block index for
//! the next block the pool grows.

use cellmem_core::{CellId, HeapError, HeapResult, Word};

/// The two value slots of a pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PairCell {
    pub car: Word,
    pub cdr: Word,
}

enum PairSlot {
    Free { next: Option<CellId> },
    Live { cell: PairCell, marked: bool },
}

struct Block {
    slots: Box<[PairSlot]>,
    /// Pairs baked into a loaded image; never marked, swept or released
    image: bool,
}

/// Result of sweeping the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PairSweep {
    pub survivors: usize,
    pub released_blocks: usize,
}

pub(crate) struct PairPool {
    block_size: usize,
    blocks: Vec<Option<Block>>,
    vacant_blocks: Vec<usize>,
    free: Option<CellId>,
    /// Pair slots in resident blocks
    allocated: usize,
    /// Live pairs
    used: usize,
}

impl PairPool {
    pub(crate) fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "pair block size must be positive");
        Self {
            block_size,
            blocks: Vec::new(),
            vacant_blocks: Vec::new(),
            free: None,
            allocated: 0,
            used: 0,
        }
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    /// Resident blocks, image blocks included
    pub(crate) fn block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    /// True if the next allocation needs a fresh block
    pub(crate) fn needs_block(&self) -> bool {
        self.free.is_none()
    }

    fn split(&self, id: CellId) -> (usize, usize) {
        (id.index() / self.block_size, id.index() % self.block_size)
    }

    fn id_of(&self, block: usize, slot: usize) -> CellId {
        CellId::new((block * self.block_size + slot) as u32)
    }

    fn fresh_slots(&self, len: usize) -> HeapResult<Vec<PairSlot>> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|_| HeapError::OutOfMemory {
                requested: len * std::mem::size_of::<PairSlot>(),
            })?;
        Ok(slots)
    }

    fn install_block(&mut self, block: Block) -> HeapResult<usize> {
        if let Some(idx) = self.vacant_blocks.pop() {
            self.blocks[idx] = Some(block);
            return Ok(idx);
        }
        let idx = self.blocks.len();
        if (idx + 1).saturating_mul(self.block_size) > u32::MAX as usize {
            return Err(HeapError::OutOfMemory {
                requested: self.block_size * std::mem::size_of::<PairSlot>(),
            });
        }
        self.blocks
            .try_reserve(1)
            .map_err(|_| HeapError::OutOfMemory {
                requested: std::mem::size_of::<Block>(),
            })?;
        self.blocks.push(Some(block));
        Ok(idx)
    }

    /// Grow the pool by one block and put its slots on the free-list
    pub(crate) fn add_block(&mut self) -> HeapResult<()> {
        let mut slots = self.fresh_slots(self.block_size)?;
        // Block index is only known after install; link with local indices first
        for _ in 0..self.block_size {
            slots.push(PairSlot::Free { next: None });
        }
        let block_idx = self.install_block(Block {
            slots: slots.into_boxed_slice(),
            image: false,
        })?;

        let last = self.block_size - 1;
        let mut next = self.free;
        for slot in (0..=last).rev() {
            let id = self.id_of(block_idx, slot);
            if let Some(block) = self.blocks[block_idx].as_mut() {
                block.slots[slot] = PairSlot::Free { next };
            }
            next = Some(id);
        }
        self.free = next;
        self.allocated += self.block_size;
        Ok(())
    }

    /// Pop the free-list
    ///
    /// # Panics
    /// Panics if the free-list is empty; callers grow the pool first.
    pub(crate) fn pop(&mut self, cell: PairCell) -> CellId {
        let id = match self.free {
            Some(id) => id,
            None => panic!("pair free-list empty after growing the pool"),
        };
        let (b, s) = self.split(id);
        let slot = match self.blocks.get_mut(b).and_then(Option::as_mut) {
            Some(block) => &mut block.slots[s],
            None => panic!("pair free-list points into released block {}", b),
        };
        self.free = match *slot {
            PairSlot::Free { next } => next,
            PairSlot::Live { .. } => panic!("pair free-list links live pair {}", id.raw()),
        };
        *slot = PairSlot::Live {
            cell,
            marked: false,
        };
        self.used += 1;
        id
    }

    /// Return a pair to the free-list immediately
    ///
    /// # Panics
    /// Panics if the pair is not live or belongs to an image.
    pub(crate) fn release(&mut self, id: CellId) {
        let (b, s) = self.split(id);
        let free = self.free;
        let block = match self.blocks.get_mut(b).and_then(Option::as_mut) {
            Some(block) if !block.image => block,
            Some(_) => panic!("cannot free image pair {}", id.raw()),
            None => panic!("pair {} is not live", id.raw()),
        };
        match block.slots[s] {
            PairSlot::Live { .. } => block.slots[s] = PairSlot::Free { next: free },
            PairSlot::Free { .. } => panic!("pair {} is not live", id.raw()),
        }
        self.free = Some(id);
        self.used -= 1;
    }

    fn live_slot(&self, id: CellId) -> (&PairCell, bool, bool) {
        let (b, s) = self.split(id);
        match self.blocks.get(b).and_then(Option::as_ref) {
            Some(block) => match &block.slots[s] {
                PairSlot::Live { cell, marked } => (cell, *marked, block.image),
                PairSlot::Free { .. } => panic!("pair {} is not live", id.raw()),
            },
            None => panic!("pair {} is not live", id.raw()),
        }
    }

    /// Borrow a live pair
    ///
    /// # Panics
    /// Panics if the pair has been freed or swept.
    pub(crate) fn get(&self, id: CellId) -> &PairCell {
        self.live_slot(id).0
    }

    pub(crate) fn get_mut(&mut self, id: CellId) -> &mut PairCell {
        let (b, s) = self.split(id);
        match self.blocks.get_mut(b).and_then(Option::as_mut) {
            Some(block) => match &mut block.slots[s] {
                PairSlot::Live { cell, .. } => cell,
                PairSlot::Free { .. } => panic!("pair {} is not live", id.raw()),
            },
            None => panic!("pair {} is not live", id.raw()),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_live(&self, id: CellId) -> bool {
        let (b, s) = self.split(id);
        matches!(
            self.blocks.get(b).and_then(Option::as_ref).map(|block| &block.slots[s]),
            Some(PairSlot::Live { .. })
        )
    }

    pub(crate) fn is_image(&self, id: CellId) -> bool {
        self.live_slot(id).2
    }

    pub(crate) fn is_marked(&self, id: CellId) -> bool {
        self.live_slot(id).1
    }

    /// Set the mark bit; returns false if already marked or read-only
    pub(crate) fn set_mark(&mut self, id: CellId) -> bool {
        let (b, s) = self.split(id);
        match self.blocks.get_mut(b).and_then(Option::as_mut) {
            Some(block) if block.image => false,
            Some(block) => match &mut block.slots[s] {
                PairSlot::Live { marked, .. } => !std::mem::replace(marked, true),
                PairSlot::Free { .. } => panic!("marking free pair {}", id.raw()),
            },
            None => panic!("marking pair {} in a released block", id.raw()),
        }
    }

    /// Install read-only pairs loaded from an image
    ///
    /// Returns their ids in order. The cells start out as null pairs; the
    /// loader fills them once every image cell has an id.
    pub(crate) fn install_image(&mut self, count: usize) -> HeapResult<Vec<CellId>> {
        let mut ids = Vec::with_capacity(count);
        let mut remaining = count;
        while remaining > 0 {
            let len = remaining.min(self.block_size);
            let mut slots = self.fresh_slots(len)?;
            for _ in 0..len {
                slots.push(PairSlot::Live {
                    cell: PairCell::default(),
                    marked: false,
                });
            }
            let block_idx = self.install_block(Block {
                slots: slots.into_boxed_slice(),
                image: true,
            })?;
            ids.extend((0..len).map(|s| self.id_of(block_idx, s)));
            remaining -= len;
        }
        self.allocated += count;
        self.used += count;
        Ok(ids)
    }

    /// Walk the free-list (diagnostics and tests)
    pub(crate) fn free_list_len(&self) -> usize {
        let mut len = 0;
        let mut cur = self.free;
        while let Some(id) = cur {
            let (b, s) = self.split(id);
            cur = match self.blocks.get(b).and_then(Option::as_ref).map(|blk| &blk.slots[s]) {
                Some(PairSlot::Free { next }) => *next,
                _ => panic!("pair free-list corrupt at {}", id.raw()),
            };
            len += 1;
        }
        len
    }

    /// Rebuild the free-list, releasing blocks with no survivors
    pub(crate) fn sweep(&mut self) -> PairSweep {
        let mut result = PairSweep::default();
        self.free = None;
        self.used = 0;

        for b in 0..self.blocks.len() {
            let base = b * self.block_size;
            let outcome = match self.blocks[b].as_mut() {
                None => continue,
                Some(block) if block.image => {
                    self.used += block.slots.len();
                    continue;
                }
                Some(block) => {
                    let mut local_head: Option<CellId> = None;
                    let mut local_tail: Option<usize> = None;
                    let mut survivors = 0;
                    for (s, slot) in block.slots.iter_mut().enumerate() {
                        if let PairSlot::Live { marked, .. } = slot {
                            if *marked {
                                *marked = false;
                                survivors += 1;
                                continue;
                            }
                        }
                        *slot = PairSlot::Free { next: local_head };
                        if local_tail.is_none() {
                            local_tail = Some(s);
                        }
                        local_head = Some(CellId::new((base + s) as u32));
                    }
                    if survivors > 0 {
                        if let Some(tail) = local_tail {
                            block.slots[tail] = PairSlot::Free { next: self.free };
                            self.free = local_head;
                        }
                    }
                    survivors
                }
            };

            if outcome == 0 {
                self.blocks[b] = None;
                self.vacant_blocks.push(b);
                self.allocated -= self.block_size;
                result.released_blocks += 1;
            } else {
                self.used += outcome;
                result.survivors += outcome;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmem_core::Value;

    fn cell(n: i64) -> PairCell {
        PairCell {
            car: Word::pack(Value::int(n)),
            cdr: Word::NULL,
        }
    }

    fn alloc(pool: &mut PairPool, n: i64) -> CellId {
        if pool.needs_block() {
            pool.add_block().unwrap();
        }
        pool.pop(cell(n))
    }

    #[test]
    fn test_first_alloc_grows_one_block() {
        let mut pool = PairPool::new(4);
        let id = alloc(&mut pool, 1);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.allocated(), 4);
        assert_eq!(pool.used(), 1);
        assert_eq!(pool.free_list_len(), 3);
        assert_eq!(pool.get(id).car.unpack(), Value::int(1));
    }

    #[test]
    fn test_release_relinks_immediately() {
        let mut pool = PairPool::new(4);
        let a = alloc(&mut pool, 1);
        pool.release(a);
        assert_eq!(pool.used(), 0);
        assert!(!pool.is_live(a));
        let b = alloc(&mut pool, 2);
        assert_eq!(a, b, "freed pair is the next one handed out");
    }

    #[test]
    #[should_panic(expected = "is not live")]
    fn test_double_release_panics() {
        let mut pool = PairPool::new(4);
        let a = alloc(&mut pool, 1);
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn test_sweep_releases_empty_blocks() {
        let mut pool = PairPool::new(2);
        let ids: Vec<_> = (0..4).map(|n| alloc(&mut pool, n)).collect();
        assert_eq!(pool.block_count(), 2);

        // Keep one pair in the second block only
        assert!(pool.set_mark(ids[3]));
        let sweep = pool.sweep();

        assert_eq!(sweep.survivors, 1);
        assert_eq!(sweep.released_blocks, 1);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.used(), 1);
        assert_eq!(pool.free_list_len(), 1);
        assert!(!pool.is_marked(ids[3]));
    }

    #[test]
    fn test_vacant_block_index_is_reused() {
        let mut pool = PairPool::new(2);
        let a = alloc(&mut pool, 0);
        alloc(&mut pool, 1);
        let c = alloc(&mut pool, 2);
        pool.set_mark(c);
        pool.sweep();
        assert!(!pool.is_live(a));

        // Block 0 is vacant; the next growth lands there
        alloc(&mut pool, 3);
        let e = alloc(&mut pool, 4);
        assert!(e.index() < 2, "new block reuses vacant index 0, got {}", e.raw());
    }

    #[test]
    fn test_image_pairs_are_never_marked_or_swept() {
        let mut pool = PairPool::new(4);
        let ids = pool.install_image(6).unwrap();
        assert_eq!(ids.len(), 6);
        assert!(pool.is_image(ids[5]));
        assert!(!pool.set_mark(ids[0]));

        let sweep = pool.sweep();
        assert_eq!(sweep.released_blocks, 0);
        assert_eq!(pool.used(), 6);
        assert!(pool.is_live(ids[0]));
    }
}
