// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Generation-checked arena for device-owned objects.
//!
//! Handles are plain `Copy` values.  Removing an object bumps its slot's generation, so a
//! handle kept past destruction is detected instead of reaching whatever reuses the slot.
//! Every registry also has a process-wide id carried by its handles, so a handle from another
//! registry never resolves.

use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_REGISTRY_ID: AtomicU32 = AtomicU32::new(1);

/// Index of a live object in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Handle {
    registry: u32,
    index: u32,
    generation: u32,
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

#[derive(Debug)]
pub(crate) struct Registry<T> {
    id: u32,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Registry { id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed), slots: Vec::new(), free: Vec::new(), live: 0 }
    }
}

impl<T> Registry<T> {
    pub(crate) fn insert(&mut self, value: T) -> Handle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => *generation,
                Slot::Occupied { .. } => unreachable!("free list points at a live slot"),
            };
            *slot = Slot::Occupied { generation, value };
            Handle { registry: self.id, index, generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::Occupied { generation: 0, value });
            Handle { registry: self.id, index, generation: 0 }
        }
    }

    /// Whether `handle` was issued by this registry, live or not.
    pub(crate) fn owns(&self, handle: Handle) -> bool {
        handle.registry == self.id
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&T> {
        if !self.owns(handle) {
            return None;
        }
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if !self.owns(handle) {
            return None;
        }
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        if !self.owns(handle) {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == handle.generation => {}
            _ => return None,
        }
        let vacant = Slot::Vacant { generation: handle.generation.wrapping_add(1) };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) else {
            unreachable!("checked above");
        };
        self.free.push(handle.index);
        self.live -= 1;
        Some(value)
    }

    /// Number of live objects.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, .. } => Some(Handle { registry: self.id, index: index as u32, generation: *generation }),
            Slot::Vacant { .. } => None,
        })
    }
}
