// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Defines the way buffers are bound for a dispatch.
//!
//! Bindings are grouped in three classes, each a fixed array of slots:
//!
//! | Class                       | Slots | Required flag                    | GPU state                     |
//! |-----------------------------|-------|----------------------------------|-------------------------------|
//! | [`BindClass::Constant`]     | 16    | [`BufferFlags::GPU_CONSTANT`]    | vertex and constant buffer    |
//! | [`BindClass::ReadOnly`]     | 16    | [`BufferFlags::GPU_READ_ONLY`]   | non-pixel shader resource     |
//! | [`BindClass::ReadWrite`]    | 8     | [`BufferFlags::GPU_READ_WRITE`]  | unordered access              |
//!
//! Binding only records the (buffer, byte range) pair and validates it.  The GPU view for a
//! slot is created lazily, at the next dispatch, and cached in the slot as a
//! [`DescriptorIndex`].  Rebinding a slot drops the cached index; so does the end of a fence
//! cycle, because the dynamic descriptors it pointed at are gone.

use crate::bindings::descriptor_heap::{
    DescriptorIndex, NULL_CONSTANT_SLOT, NULL_READ_ONLY_SLOT, NULL_READ_WRITE_SLOT,
};
use crate::bindings::resource_tracking::ResourceState;
use crate::bindings::visible_to::BufferFlags;
use crate::compute::BufferInfo;
use crate::range::Range;
use crate::status::{Error, Status, ensure_arg};

/// Constant-buffer views must start and end on this many bytes.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Index of a binding slot within one [`BindClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindSlot(u32);

impl BindSlot {
    pub const fn new(slot: u32) -> Self {
        BindSlot(slot)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Binding class of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindClass {
    Constant,
    ReadOnly,
    ReadWrite,
}

impl BindClass {
    pub const ALL: [BindClass; 3] = [BindClass::Constant, BindClass::ReadOnly, BindClass::ReadWrite];

    pub const fn slot_count(self) -> usize {
        match self {
            BindClass::Constant => 16,
            BindClass::ReadOnly => 16,
            BindClass::ReadWrite => 8,
        }
    }

    pub fn required_flag(self) -> BufferFlags {
        match self {
            BindClass::Constant => BufferFlags::GPU_CONSTANT,
            BindClass::ReadOnly => BufferFlags::GPU_READ_ONLY,
            BindClass::ReadWrite => BufferFlags::GPU_READ_WRITE,
        }
    }

    /// State a bound buffer must be in while the dispatch runs.
    pub fn resource_state(self) -> ResourceState {
        match self {
            BindClass::Constant => ResourceState::VertexAndConstantBuffer,
            BindClass::ReadOnly => ResourceState::NonPixelShaderResource,
            BindClass::ReadWrite => ResourceState::UnorderedAccess,
        }
    }

    /// Static descriptor holding the null view used for unbound slots.
    pub fn null_descriptor(self) -> DescriptorIndex {
        DescriptorIndex::fixed(match self {
            BindClass::Constant => NULL_CONSTANT_SLOT,
            BindClass::ReadOnly => NULL_READ_ONLY_SLOT,
            BindClass::ReadWrite => NULL_READ_WRITE_SLOT,
        })
    }
}

/// Contents of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<K> {
    pub buffer: Option<K>,
    /// Byte range, already limited to the buffer's size.
    pub range: Range,
    /// Cached view.  `None` until materialized for the current binding.
    pub descriptor: Option<DescriptorIndex>,
}

impl<K> Binding<K> {
    const EMPTY: Binding<K> = Binding { buffer: None, range: Range::EMPTY, descriptor: None };
}

/// Per-slot binding state for buffers identified by `K`.
#[derive(Debug)]
pub struct BindingCache<K> {
    constant: [Binding<K>; BindClass::Constant.slot_count()],
    read_only: [Binding<K>; BindClass::ReadOnly.slot_count()],
    read_write: [Binding<K>; BindClass::ReadWrite.slot_count()],
}

impl<K: Copy + PartialEq> Default for BindingCache<K> {
    fn default() -> Self {
        BindingCache {
            constant: [Binding::EMPTY; BindClass::Constant.slot_count()],
            read_only: [Binding::EMPTY; BindClass::ReadOnly.slot_count()],
            read_write: [Binding::EMPTY; BindClass::ReadWrite.slot_count()],
        }
    }
}

/// A buffer offered to [`BindingCache::bind`].
#[derive(Debug, Clone, Copy)]
pub struct BindCandidate<K> {
    pub key: K,
    pub info: BufferInfo,
    pub mapped: bool,
}

impl<K: Copy + PartialEq> BindingCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self, class: BindClass) -> &[Binding<K>] {
        match class {
            BindClass::Constant => &self.constant,
            BindClass::ReadOnly => &self.read_only,
            BindClass::ReadWrite => &self.read_write,
        }
    }

    pub fn slots_mut(&mut self, class: BindClass) -> &mut [Binding<K>] {
        match class {
            BindClass::Constant => &mut self.constant,
            BindClass::ReadOnly => &mut self.read_only,
            BindClass::ReadWrite => &mut self.read_write,
        }
    }

    /// Binds `buffer[range]` to `slot`, or clears the slot when `buffer` is `None`.
    ///
    /// Returns [`Status::NoOp`] when the slot already holds the same buffer and range; the
    /// cached view is kept in that case.
    pub fn bind(
        &mut self,
        class: BindClass,
        slot: BindSlot,
        buffer: Option<BindCandidate<K>>,
        range: Range,
    ) -> Result<Status, Error> {
        let index = slot.index() as usize;
        ensure_arg!(index < class.slot_count(), "binding slot out of range");

        let range = match &buffer {
            Some(candidate) => range.limit(candidate.info.size),
            None => Range::EMPTY,
        };
        if class == BindClass::Constant {
            ensure_arg!(
                range.first % CONSTANT_BUFFER_ALIGNMENT == 0 && range.count % CONSTANT_BUFFER_ALIGNMENT == 0,
                "constant buffer range must be 256-byte aligned"
            );
        }

        let current = &self.slots(class)[index];
        if current.buffer == buffer.as_ref().map(|c| c.key) && current.range == range {
            return Ok(Status::NoOp);
        }

        let Some(candidate) = buffer else {
            self.slots_mut(class)[index] = Binding::EMPTY;
            return Ok(Status::Success);
        };
        validate(class, &candidate, range)?;

        self.slots_mut(class)[index] = Binding { buffer: Some(candidate.key), range, descriptor: None };
        Ok(Status::Success)
    }

    /// Clears every slot of every class.
    pub fn reset_all(&mut self) {
        for class in BindClass::ALL {
            self.slots_mut(class).fill(Binding::EMPTY);
        }
    }

    /// Drops every cached view, keeping the bindings themselves.
    pub fn reset_descriptors(&mut self) {
        for class in BindClass::ALL {
            for binding in self.slots_mut(class) {
                binding.descriptor = None;
            }
        }
    }

    /// Whether `key` occupies any slot.
    pub fn is_bound(&self, key: K) -> bool {
        BindClass::ALL
            .iter()
            .any(|class| self.slots(*class).iter().any(|binding| binding.buffer == Some(key)))
    }

    /// Number of occupied slots across every class.
    pub fn bound_count(&self) -> usize {
        BindClass::ALL
            .iter()
            .map(|class| self.slots(*class).iter().filter(|binding| binding.buffer.is_some()).count())
            .sum()
    }
}

fn validate<K>(class: BindClass, candidate: &BindCandidate<K>, range: Range) -> Result<(), Error> {
    let info = &candidate.info;
    ensure_arg!(!candidate.mapped, "cannot bind a mapped buffer");
    if class != BindClass::Constant {
        ensure_arg!(
            info.flags.structural_kind_count() == 1,
            "shader resource needs exactly one of typed, structured or byte-address"
        );
    }
    let alignment = if info.element_size > 0 { info.element_size } else { 4 };
    ensure_arg!(range.first % alignment == 0, "binding offset not aligned to element size");
    ensure_arg!(range.count > 0 && range.count % alignment == 0, "binding size not a multiple of element size");
    ensure_arg!(info.flags.contains(class.required_flag()), "buffer lacks the usage flag for this binding");
    ensure_arg!(range.first < info.size, "binding offset out of bounds");
    ensure_arg!(range.fits(info.size), "binding range out of bounds");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::visible_to::BufferStrategy;
    use crate::format::Format;

    fn typed_rw(size: usize) -> BufferInfo {
        BufferInfo {
            size,
            flags: BufferFlags::GPU_READ_WRITE | BufferFlags::TYPED,
            element_format: Format::R32Float,
            structure_size: 0,
            element_size: 4,
            strategy: BufferStrategy::Default,
        }
    }

    fn candidate(key: u32, info: BufferInfo) -> Option<BindCandidate<u32>> {
        Some(BindCandidate { key, info, mapped: false })
    }

    #[test]
    fn rebind_is_noop() {
        let mut cache = BindingCache::new();
        let slot = BindSlot::new(0);
        assert_eq!(
            cache.bind(BindClass::ReadWrite, slot, candidate(1, typed_rw(64)), Range::FULL).unwrap(),
            Status::Success
        );
        cache.slots_mut(BindClass::ReadWrite)[0].descriptor = Some(DescriptorIndex::fixed(9));
        assert_eq!(
            cache.bind(BindClass::ReadWrite, slot, candidate(1, typed_rw(64)), Range::new(0, 64)).unwrap(),
            Status::NoOp
        );
        assert_eq!(cache.slots(BindClass::ReadWrite)[0].descriptor, Some(DescriptorIndex::fixed(9)));
        assert_eq!(
            cache.bind(BindClass::ReadWrite, slot, candidate(1, typed_rw(64)), Range::new(0, 32)).unwrap(),
            Status::Success
        );
        assert_eq!(cache.slots(BindClass::ReadWrite)[0].descriptor, None);
    }

    #[test]
    fn clear_slot() {
        let mut cache = BindingCache::new();
        let slot = BindSlot::new(3);
        cache.bind(BindClass::ReadWrite, slot, candidate(1, typed_rw(64)), Range::FULL).unwrap();
        assert!(cache.is_bound(1));
        assert_eq!(cache.bind(BindClass::ReadWrite, slot, None, Range::FULL).unwrap(), Status::Success);
        assert!(!cache.is_bound(1));
        assert_eq!(cache.bind(BindClass::ReadWrite, slot, None, Range::FULL).unwrap(), Status::NoOp);
    }

    #[test]
    fn rejects_bad_bindings() {
        let mut cache = BindingCache::<u32>::new();
        let rw = typed_rw(64);
        let err = |r: Result<Status, Error>| r.unwrap_err().is_invalid_argument();
        assert!(err(cache.bind(BindClass::ReadWrite, BindSlot::new(8), candidate(1, rw), Range::FULL)));
        assert!(err(cache.bind(BindClass::ReadWrite, BindSlot::new(0), candidate(1, rw), Range::new(2, 8))));
        assert!(err(cache.bind(BindClass::ReadWrite, BindSlot::new(0), candidate(1, rw), Range::new(0, 6))));
        assert!(err(cache.bind(BindClass::ReadWrite, BindSlot::new(0), candidate(1, rw), Range::new(60, 8))));
        assert!(err(cache.bind(BindClass::ReadWrite, BindSlot::new(0), candidate(1, rw), Range::starting_at(64))));
        assert!(err(cache.bind(BindClass::ReadOnly, BindSlot::new(0), candidate(1, rw), Range::FULL)));
        let mapped = Some(BindCandidate { key: 1, info: rw, mapped: true });
        assert!(err(cache.bind(BindClass::ReadWrite, BindSlot::new(0), mapped, Range::FULL)));
        let mut untyped = rw;
        untyped.flags = BufferFlags::GPU_READ_WRITE;
        assert!(err(cache.bind(BindClass::ReadWrite, BindSlot::new(0), candidate(1, untyped), Range::FULL)));
        assert_eq!(cache.bound_count(), 0);
    }

    #[test]
    fn constant_buffer_alignment() {
        let mut cache = BindingCache::new();
        let info = BufferInfo {
            size: 1024,
            flags: BufferFlags::GPU_CONSTANT,
            element_format: Format::Unknown,
            structure_size: 0,
            element_size: 0,
            strategy: BufferStrategy::Default,
        };
        let slot = BindSlot::new(15);
        assert!(cache.bind(BindClass::Constant, slot, candidate(2, info), Range::new(0, 256)).is_ok());
        assert!(cache.bind(BindClass::Constant, slot, candidate(2, info), Range::new(256, 512)).is_ok());
        assert!(cache.bind(BindClass::Constant, slot, candidate(2, info), Range::new(4, 256)).is_err());
        assert!(cache.bind(BindClass::Constant, slot, candidate(2, info), Range::new(0, 100)).is_err());
        assert_eq!(cache.bind(BindClass::Constant, slot, candidate(2, info), Range::new(256, 512)).unwrap(), Status::NoOp);
    }

    #[test]
    fn reset_descriptors_keeps_bindings() {
        let mut cache = BindingCache::new();
        cache.bind(BindClass::ReadWrite, BindSlot::new(1), candidate(5, typed_rw(64)), Range::FULL).unwrap();
        cache.slots_mut(BindClass::ReadWrite)[1].descriptor = Some(DescriptorIndex::fixed(4));
        cache.reset_descriptors();
        assert_eq!(cache.slots(BindClass::ReadWrite)[1].buffer, Some(5));
        assert_eq!(cache.slots(BindClass::ReadWrite)[1].descriptor, None);
        cache.reset_all();
        assert_eq!(cache.bound_count(), 0);
    }
}
