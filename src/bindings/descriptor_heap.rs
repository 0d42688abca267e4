// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Descriptor allocation.
//!
//! A descriptor heap is a fixed-capacity table.  The first [`STATIC_SLOTS`] entries hold the
//! null views for unbound slots and live as long as the device.  The rest is a bump-allocated
//! arena that is reset every fence cycle: once the GPU drains a command list none of its
//! dynamic descriptors are referenced anymore.
//!
//! Each reset starts a new *epoch*.  A [`DescriptorIndex`] remembers the epoch it was
//! allocated in, so a cached index from an earlier cycle is recognized as dead instead of
//! silently aliasing whatever was allocated into the same slot later.

use crate::status::Error;

/// Default number of descriptors per heap.
pub const DEFAULT_CAPACITY: u32 = 65536;
/// Reserved entries at the start of every heap.
pub const STATIC_SLOTS: u32 = 3;

/// Static slot holding the null constant-buffer view.
pub const NULL_CONSTANT_SLOT: u32 = 0;
/// Static slot holding the null read-only view.
pub const NULL_READ_ONLY_SLOT: u32 = 1;
/// Static slot holding the null read-write view.
pub const NULL_READ_WRITE_SLOT: u32 = 2;

/// Position in a descriptor heap, tagged with the epoch that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorIndex {
    index: u32,
    epoch: u64,
}

impl DescriptorIndex {
    /// A static slot.  Static slots are valid in every epoch.
    pub const fn fixed(index: u32) -> Self {
        DescriptorIndex { index, epoch: 0 }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_static(&self) -> bool {
        self.index < STATIC_SLOTS
    }
}

/// Bump allocator over one descriptor heap.
#[derive(Debug)]
pub struct DescriptorArena {
    capacity: u32,
    cursor: u32,
    epoch: u64,
}

impl DescriptorArena {
    /// # Panics
    /// If `capacity` does not leave room beyond the static slots.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > STATIC_SLOTS, "descriptor heap too small");
        DescriptorArena { capacity, cursor: STATIC_SLOTS, epoch: 1 }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Dynamic descriptors handed out in the current epoch.
    pub fn dynamic_len(&self) -> u32 {
        self.cursor - STATIC_SLOTS
    }

    /// Next free dynamic slot, or [`Error::TooManyObjects`] once the heap is full.
    pub fn allocate_dynamic(&mut self) -> Result<DescriptorIndex, Error> {
        if self.cursor >= self.capacity {
            logwise::warn_sync!(
                "Descriptor heap exhausted at {capacity} descriptors",
                capacity = self.capacity
            );
            return Err(Error::TooManyObjects);
        }
        let index = DescriptorIndex { index: self.cursor, epoch: self.epoch };
        self.cursor += 1;
        Ok(index)
    }

    /// Releases every dynamic descriptor and starts a new epoch.
    pub fn clear_dynamic(&mut self) {
        self.cursor = STATIC_SLOTS;
        self.epoch += 1;
    }

    /// Whether `index` still refers to a descriptor written in this epoch.
    pub fn is_live(&self, index: DescriptorIndex) -> bool {
        index.is_static() || (index.epoch == self.epoch && index.index < self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocation() {
        let mut arena = DescriptorArena::new(6);
        let a = arena.allocate_dynamic().unwrap();
        let b = arena.allocate_dynamic().unwrap();
        assert_eq!(a.index(), STATIC_SLOTS);
        assert_eq!(b.index(), STATIC_SLOTS + 1);
        assert_eq!(arena.dynamic_len(), 2);
    }

    #[test]
    fn exhaustion() {
        let mut arena = DescriptorArena::new(STATIC_SLOTS + 2);
        arena.allocate_dynamic().unwrap();
        arena.allocate_dynamic().unwrap();
        assert!(matches!(arena.allocate_dynamic(), Err(Error::TooManyObjects)));
        arena.clear_dynamic();
        assert!(arena.allocate_dynamic().is_ok());
    }

    #[test]
    fn reset_starts_new_epoch() {
        let mut arena = DescriptorArena::new(16);
        let old = arena.allocate_dynamic().unwrap();
        assert!(arena.is_live(old));
        arena.clear_dynamic();
        assert!(!arena.is_live(old));
        let new = arena.allocate_dynamic().unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(arena.is_live(new));
        assert!(arena.is_live(DescriptorIndex::fixed(NULL_READ_WRITE_SLOT)));
    }
}
