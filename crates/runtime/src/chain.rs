//! Individually allocated cells linked for sweeping
//!
//! Vectors, strings, symbols and closures are each sized or shaped
//! differently, so they are not carved out of blocks the way pairs are.
//! Each lives in a slab slot of its own and is threaded onto an intrusive
//! singly-linked chain (newest first). Sweep walks the chain once, relinks
//! the marked cells and releases the rest.
//!
//! Frozen cells (the null string, cells loaded from an image) occupy a slot
//! but are never linked into the chain, so sweep never sees them.

use cellmem_core::{CellId, HeapError, HeapResult};

struct Entry<T> {
    value: T,
    marked: bool,
    frozen: bool,
    next: Option<u32>,
}

pub(crate) struct Chain<T> {
    name: &'static str,
    slots: Vec<Option<Entry<T>>>,
    vacant: Vec<u32>,
    head: Option<u32>,
    live: usize,
    /// Frozen cells whose mark bit was set this cycle
    frozen_marked: Vec<u32>,
}

impl<T> Chain<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Vec::new(),
            vacant: Vec::new(),
            head: None,
            live: 0,
            frozen_marked: Vec::new(),
        }
    }

    /// Add a cell to the chain
    pub(crate) fn insert(&mut self, value: T) -> HeapResult<CellId> {
        let idx = self.place(value, false)?;
        if let Some(entry) = self.slots[idx as usize].as_mut() {
            entry.next = self.head;
        }
        self.head = Some(idx);
        Ok(CellId::new(idx))
    }

    /// Add a cell that is never swept
    pub(crate) fn insert_frozen(&mut self, value: T) -> HeapResult<CellId> {
        self.place(value, true).map(CellId::new)
    }

    fn place(&mut self, value: T, frozen: bool) -> HeapResult<u32> {
        let entry = Entry {
            value,
            marked: false,
            frozen,
            next: None,
        };
        let idx = match self.vacant.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(entry);
                idx
            }
            None => {
                if self.slots.len() >= u32::MAX as usize {
                    return Err(HeapError::OutOfMemory {
                        requested: std::mem::size_of::<Entry<T>>(),
                    });
                }
                self.slots
                    .try_reserve(1)
                    .map_err(|_| HeapError::OutOfMemory {
                        requested: std::mem::size_of::<Entry<T>>(),
                    })?;
                self.slots.push(Some(entry));
                (self.slots.len() - 1) as u32
            }
        };
        self.live += 1;
        Ok(idx)
    }

    fn entry(&self, id: CellId) -> &Entry<T> {
        match self.slots.get(id.index()).and_then(Option::as_ref) {
            Some(entry) => entry,
            None => panic!("{} cell {} is not live", self.name, id.raw()),
        }
    }

    fn entry_mut(&mut self, id: CellId) -> &mut Entry<T> {
        let name = self.name;
        match self.slots.get_mut(id.index()).and_then(Option::as_mut) {
            Some(entry) => entry,
            None => panic!("{} cell {} is not live", name, id.raw()),
        }
    }

    /// Borrow a live cell
    ///
    /// # Panics
    /// Panics if the cell was never allocated or has been swept.
    pub(crate) fn get(&self, id: CellId) -> &T {
        &self.entry(id).value
    }

    pub(crate) fn get_mut(&mut self, id: CellId) -> &mut T {
        &mut self.entry_mut(id).value
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: CellId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    pub(crate) fn is_frozen(&self, id: CellId) -> bool {
        self.entry(id).frozen
    }

    pub(crate) fn is_marked(&self, id: CellId) -> bool {
        self.entry(id).marked
    }

    /// Set the mark bit; returns false if it was already set
    pub(crate) fn set_mark(&mut self, id: CellId) -> bool {
        let entry = self.entry_mut(id);
        if entry.marked {
            return false;
        }
        entry.marked = true;
        if entry.frozen {
            self.frozen_marked.push(id.raw());
        }
        true
    }

    /// Cells currently occupying a slot, frozen ones included
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Released slots waiting for reuse
    pub(crate) fn vacant(&self) -> usize {
        self.vacant.len()
    }

    /// Rebuild the chain, keeping marked cells and releasing the rest.
    ///
    /// `survivor` sees every kept cell. Returns the number released.
    pub(crate) fn sweep(&mut self, mut survivor: impl FnMut(&T)) -> usize {
        let mut released = 0;
        let mut cur = self.head.take();

        while let Some(idx) = cur {
            let keep = match self.slots[idx as usize].as_mut() {
                Some(entry) => {
                    cur = entry.next.take();
                    if entry.marked {
                        entry.marked = false;
                        entry.next = self.head;
                        true
                    } else {
                        false
                    }
                }
                None => panic!("{} chain links a released slot {}", self.name, idx),
            };

            if keep {
                self.head = Some(idx);
                if let Some(entry) = self.slots[idx as usize].as_ref() {
                    survivor(&entry.value);
                }
            } else {
                self.slots[idx as usize] = None;
                self.vacant.push(idx);
                self.live -= 1;
                released += 1;
            }
        }

        for idx in self.frozen_marked.drain(..) {
            if let Some(entry) = self.slots[idx as usize].as_mut() {
                entry.marked = false;
            }
        }

        released
    }
}
