//! Entry arena
//!
//! A generation-checked slab allocator that stands in for the raw off-heap
//! addresses the original engine passed around. Each table or index core
//! owns one arena holding all of its entries; chains (live and
//! committed-view) link entries by [`EntryRef`].
//!
//! Freed slots are recycled through a free list. A slot's generation is
//! bumped on free, so a handle to a freed (or freed-and-reused) entry is
//! detected instead of silently reading reused memory. This is what turns
//! use-after-close from undefined behavior into a reported error.

use crate::error::{Result, VaultError};

/// Copyable handle to an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryRef {
    slot: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slab of entries with generation-checked access.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live (allocated, not yet freed) entries.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Store a value and return its handle.
    pub fn alloc(&mut self, value: T) -> EntryRef {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            s.value = Some(value);
            return EntryRef {
                slot,
                generation: s.generation,
            };
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        EntryRef {
            slot,
            generation: 0,
        }
    }

    /// Borrow the value behind a handle; errors on a stale handle.
    pub fn get(&self, r: EntryRef) -> Result<&T> {
        self.try_get(r)
            .ok_or_else(|| VaultError::IllegalState("stale entry reference".to_string()))
    }

    /// Mutably borrow the value behind a handle; errors on a stale handle.
    pub fn get_mut(&mut self, r: EntryRef) -> Result<&mut T> {
        match self.slots.get_mut(r.slot as usize) {
            Some(s) if s.generation == r.generation => s
                .value
                .as_mut()
                .ok_or_else(|| VaultError::IllegalState("stale entry reference".to_string())),
            _ => Err(VaultError::IllegalState(
                "stale entry reference".to_string(),
            )),
        }
    }

    /// Borrow without erroring; `None` on a stale handle.
    pub fn try_get(&self, r: EntryRef) -> Option<&T> {
        match self.slots.get(r.slot as usize) {
            Some(s) if s.generation == r.generation => s.value.as_ref(),
            _ => None,
        }
    }

    /// Release a slot, returning its value. The generation is bumped so
    /// surviving handles to it become stale.
    pub fn free(&mut self, r: EntryRef) -> Result<T> {
        let s = self
            .slots
            .get_mut(r.slot as usize)
            .filter(|s| s.generation == r.generation)
            .ok_or_else(|| VaultError::IllegalState("double free of entry reference".to_string()))?;
        let value = s
            .value
            .take()
            .ok_or_else(|| VaultError::IllegalState("double free of entry reference".to_string()))?;
        s.generation = s.generation.wrapping_add(1);
        self.live -= 1;
        self.free.push(r.slot);
        Ok(value)
    }

    /// Drop every live entry and invalidate all outstanding handles.
    pub fn clear(&mut self) {
        for (i, s) in self.slots.iter_mut().enumerate() {
            if s.value.is_some() {
                s.value = None;
                s.generation = s.generation.wrapping_add(1);
                self.free.push(i as u32);
            }
        }
        self.live = 0;
    }
}
