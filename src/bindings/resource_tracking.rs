// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource usage tracking for CPU/GPU synchronization
//!
//! This module records how each buffer has been used by the command list currently being
//! recorded, and decides when the GPU needs a barrier between two uses.
//!
//! # Overview
//!
//! Every GPU command that touches a buffer first reports the native state it needs the buffer
//! in (copy source, copy destination, unordered access, ...).  The tracker answers with the
//! barrier to record, if any:
//!
//! - First touch in this command list: no barrier.  Buffers enter a command list in the common
//!   (or their fixed) state, and the GPU promotes them on first use.
//! - Later touches of a [`BufferStrategy::Default`] buffer: a transition barrier when the state
//!   changes, a read-write hazard barrier when unordered access follows unordered access.
//! - Later touches of any other strategy: nothing.  Those buffers never leave their fixed state.
//!
//! Accumulated [`Access`] flags survive for the rest of the command list.  CPU-side operations
//! (map, read, write) ask [`ResourceUsageMap::is_used`] whether an outstanding GPU access
//! conflicts with what they are about to do; if so the command list must be flushed and waited
//! on before the CPU touches memory.
//!
//! # Lifetime
//!
//! The map never crosses command-list boundaries.  Once the GPU has drained the list it is
//! cleared wholesale, and the next use of any buffer starts over with state promotion.

use crate::bindings::visible_to::BufferStrategy;
use std::collections::HashMap;
use std::hash::Hash;

bitflags::bitflags! {
    /// How a buffer has been accessed by the GPU.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u8 {
        const READ = 0x1;
        const WRITE = 0x2;
    }
}

/// GPU-visible state of a buffer, as the native API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    GenericRead,
    CopySource,
    CopyDest,
    UnorderedAccess,
    NonPixelShaderResource,
    VertexAndConstantBuffer,
}

impl ResourceState {
    /// Access implied by using a buffer in this state.  Every use reads.
    pub fn access(self) -> Access {
        match self {
            ResourceState::CopyDest | ResourceState::UnorderedAccess => Access::READ | Access::WRITE,
            _ => Access::READ,
        }
    }

    /// Fixed state a buffer of `strategy` starts in.
    pub fn initial(strategy: BufferStrategy) -> ResourceState {
        match strategy {
            BufferStrategy::Default => ResourceState::Common,
            BufferStrategy::Upload | BufferStrategy::GpuUpload => ResourceState::GenericRead,
            BufferStrategy::Readback => ResourceState::CopyDest,
        }
    }
}

/// A barrier the command list must record before the command that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    Transition { before: ResourceState, after: ResourceState },
    /// Serializes two unordered-access uses of the same buffer.
    ReadWriteHazard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsage {
    pub access: Access,
    pub last_state: ResourceState,
}

/// Per-command-list usage of buffers identified by `K`.
#[derive(Debug)]
pub struct ResourceUsageMap<K> {
    usages: HashMap<K, ResourceUsage>,
}

impl<K> Default for ResourceUsageMap<K> {
    fn default() -> Self {
        ResourceUsageMap { usages: HashMap::new() }
    }
}

impl<K: Hash + Eq + Copy> ResourceUsageMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a GPU use of `key` in `state` and returns the barrier needed before it.
    pub fn use_buffer(&mut self, key: K, strategy: BufferStrategy, state: ResourceState) -> Option<Barrier> {
        let access = state.access();
        let Some(usage) = self.usages.get_mut(&key) else {
            self.usages.insert(key, ResourceUsage { access, last_state: state });
            return None;
        };
        let barrier = if !strategy.needs_barriers() {
            None
        } else if usage.last_state != state {
            Some(Barrier::Transition { before: usage.last_state, after: state })
        } else if state == ResourceState::UnorderedAccess {
            Some(Barrier::ReadWriteHazard)
        } else {
            None
        };
        usage.access |= access;
        usage.last_state = state;
        barrier
    }

    /// Whether `key` has been used with any of `access` in this command list.
    pub fn is_used(&self, key: K, access: Access) -> bool {
        self.usages.get(&key).is_some_and(|usage| usage.access.intersects(access))
    }

    pub fn contains(&self, key: K) -> bool {
        self.usages.contains_key(&key)
    }

    pub fn get(&self, key: K) -> Option<&ResourceUsage> {
        self.usages.get(&key)
    }

    pub fn len(&self) -> usize {
        self.usages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    /// Forgets everything.  Called once the GPU has drained the command list.
    pub fn clear(&mut self) {
        self.usages.clear();
    }
}

/// Access a CPU operation conflicts with.
///
/// Writing from the CPU must wait for every outstanding GPU access; reading only for writes.
pub fn cpu_conflicts(cpu_writes: bool) -> Access {
    if cpu_writes { Access::READ | Access::WRITE } else { Access::WRITE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_needs_no_barrier() {
        let mut map = ResourceUsageMap::new();
        assert_eq!(map.use_buffer(1u32, BufferStrategy::Default, ResourceState::UnorderedAccess), None);
        assert!(map.is_used(1, Access::WRITE));
        assert!(!map.is_used(2, Access::READ));
    }

    #[test]
    fn default_strategy_transitions() {
        let mut map = ResourceUsageMap::new();
        map.use_buffer(1u32, BufferStrategy::Default, ResourceState::CopyDest);
        assert_eq!(
            map.use_buffer(1, BufferStrategy::Default, ResourceState::UnorderedAccess),
            Some(Barrier::Transition { before: ResourceState::CopyDest, after: ResourceState::UnorderedAccess })
        );
        assert_eq!(
            map.use_buffer(1, BufferStrategy::Default, ResourceState::UnorderedAccess),
            Some(Barrier::ReadWriteHazard)
        );
        assert_eq!(
            map.use_buffer(1, BufferStrategy::Default, ResourceState::CopySource),
            Some(Barrier::Transition { before: ResourceState::UnorderedAccess, after: ResourceState::CopySource })
        );
        assert_eq!(map.use_buffer(1, BufferStrategy::Default, ResourceState::CopySource), None);
        let usage = map.get(1).copied();
        assert_eq!(usage.map(|u| u.access), Some(Access::READ | Access::WRITE));
    }

    #[test]
    fn fixed_strategies_never_barrier() {
        let mut map = ResourceUsageMap::new();
        for strategy in [BufferStrategy::Upload, BufferStrategy::Readback, BufferStrategy::GpuUpload] {
            map.clear();
            map.use_buffer(7u32, strategy, ResourceState::CopySource);
            assert_eq!(map.use_buffer(7, strategy, ResourceState::CopyDest), None);
            assert_eq!(map.use_buffer(7, strategy, ResourceState::UnorderedAccess), None);
            assert_eq!(map.use_buffer(7, strategy, ResourceState::UnorderedAccess), None);
            assert!(map.is_used(7, Access::WRITE));
        }
    }

    #[test]
    fn cpu_conflict_rules() {
        let mut map = ResourceUsageMap::new();
        map.use_buffer(3u32, BufferStrategy::Upload, ResourceState::CopySource);
        assert!(!map.is_used(3, cpu_conflicts(false)));
        assert!(map.is_used(3, cpu_conflicts(true)));
        map.clear();
        assert!(map.is_empty());
        assert!(!map.is_used(3, cpu_conflicts(true)));
    }
}
