// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Committed buffer resources.
//!
//! A resource is a block of memory shared between the recording thread (CPU) and the queue
//! thread (GPU).  Nothing in this type arbitrates access: callers guarantee that the CPU and
//! the GPU never touch overlapping bytes at the same time, and that the GPU only touches a
//! resource between a submit and the fence signal that follows it.

use crate::imp::soft::Error;
use std::cell::UnsafeCell;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Memory pool of a committed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum HeapType {
    /// GPU-resident.  Not CPU-mappable.
    Default,
    /// CPU-written, GPU-read.
    Upload,
    /// Like `Upload`, in GPU-local memory.
    GpuUpload,
    /// GPU-written, CPU-read.
    Readback,
}

impl HeapType {
    pub(crate) fn is_cpu_visible(self) -> bool {
        self != HeapType::Default
    }
}

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

struct ResourceInner {
    id: u64,
    name: String,
    heap: HeapType,
    allow_unordered_access: bool,
    memory: Box<[UnsafeCell<u8>]>,
}

//safety: all access to `memory` goes through the unsafe accessors below, whose callers
//guarantee CPU and GPU accesses don't overlap.
unsafe impl Send for ResourceInner {}
unsafe impl Sync for ResourceInner {}

/// Reference-counted committed resource.
#[derive(Clone)]
pub(crate) struct Resource(Arc<ResourceInner>);

impl Debug for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("heap", &self.0.heap)
            .field("size", &self.0.memory.len())
            .finish()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Resource {}

impl Resource {
    pub(crate) fn new(size: usize, heap: HeapType, allow_unordered_access: bool, name: String) -> Result<Self, Error> {
        let mut memory = Vec::new();
        memory.try_reserve_exact(size).map_err(|_| Error::OutOfMemory { size })?;
        memory.resize_with(size, || UnsafeCell::new(0));
        Ok(Resource(Arc::new(ResourceInner {
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            heap,
            allow_unordered_access,
            memory: memory.into_boxed_slice(),
        })))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn heap(&self) -> HeapType {
        self.0.heap
    }

    pub(crate) fn allows_unordered_access(&self) -> bool {
        self.0.allow_unordered_access
    }

    pub(crate) fn size(&self) -> usize {
        self.0.memory.len()
    }

    fn base(&self) -> *mut u8 {
        //UnsafeCell<u8> is repr(transparent), so the cells are contiguous bytes
        UnsafeCell::raw_get(self.0.memory.as_ptr())
    }

    /// Persistent CPU address of the memory, for CPU-visible heaps.
    pub(crate) fn persistent_ptr(&self) -> Option<*mut u8> {
        self.0.heap.is_cpu_visible().then(|| self.base())
    }

    /// # Safety
    /// No GPU command may write `offset..offset + len` while the slice is alive.
    pub(crate) unsafe fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset.checked_add(len).is_some_and(|end| end <= self.size()));
        //safety: bounds checked above, aliasing guaranteed by caller
        unsafe { std::slice::from_raw_parts(self.base().add(offset), len) }
    }

    /// # Safety
    /// No other access to `offset..offset + len` may happen while the slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        assert!(offset.checked_add(len).is_some_and(|end| end <= self.size()));
        //safety: bounds checked above, exclusivity guaranteed by caller
        unsafe { std::slice::from_raw_parts_mut(self.base().add(offset), len) }
    }

    /// Reads a little-endian word, or `None` when out of bounds.
    ///
    /// # Safety
    /// As [`Resource::bytes`].
    pub(crate) unsafe fn load_u32(&self, offset: usize) -> Option<u32> {
        if offset.checked_add(4).is_none_or(|end| end > self.size()) {
            return None;
        }
        //safety: bounds checked above
        let bytes = unsafe { self.bytes(offset, 4) };
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Writes a little-endian word.  Out-of-bounds writes are dropped.
    ///
    /// # Safety
    /// As [`Resource::bytes_mut`].
    pub(crate) unsafe fn store_u32(&self, offset: usize, value: u32) {
        if offset.checked_add(4).is_none_or(|end| end > self.size()) {
            return;
        }
        //safety: bounds checked above
        unsafe { self.bytes_mut(offset, 4) }.copy_from_slice(&value.to_le_bytes());
    }
}
