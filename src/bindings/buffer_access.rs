// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
CPU access to buffer memory.

Only persistently mapped buffers (upload and readback placement) can be mapped.  A mapping is a
[`BufferMapping`] guard handed back to [`crate::compute::Device::unmap_buffer`]; while it is alive
the buffer cannot be bound, used by GPU commands, or destroyed.
*/

use crate::compute::Buffer;
use crate::imp;
use crate::status::Status;

/// How the CPU will access a mapped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapType {
    /// Requires [`crate::bindings::visible_to::BufferFlags::CPU_READ`].
    Read,
    /// Requires [`crate::bindings::visible_to::BufferFlags::CPU_SEQUENTIAL_WRITE`].
    Write,
}

/// A live CPU mapping of part of a buffer.
#[derive(Debug)]
#[must_use = "pass the mapping to Device::unmap_buffer"]
pub struct BufferMapping {
    pub(crate) buffer: Buffer,
    map_type: MapType,
    //keeps the memory alive for as long as the pointer is
    _resource: imp::Resource,
    ptr: *mut u8,
    len: usize,
}

impl BufferMapping {
    /// # Safety
    /// `ptr..ptr + len` lies inside `resource`'s persistent mapping.
    pub(crate) unsafe fn new(buffer: Buffer, map_type: MapType, resource: imp::Resource, ptr: *mut u8, len: usize) -> Self {
        BufferMapping { buffer, map_type, _resource: resource, ptr, len }
    }

    pub fn buffer(&self) -> Buffer {
        self.buffer
    }

    pub fn map_type(&self) -> MapType {
        self.map_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        //safety: the range is inside the mapping and the GPU does not touch a mapped buffer
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        //safety: as above, and the mapping is borrowed exclusively
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

/// Outcome of [`crate::compute::Device::map_buffer`].
#[derive(Debug)]
pub enum MapResult {
    Mapped(BufferMapping),
    /// The buffer is still in use by the GPU and the caller asked not to wait.  Carries
    /// [`Status::NotReady`] or [`Status::Timeout`].
    Pending(Status),
}

impl MapResult {
    /// The mapping, if the buffer was mapped.
    pub fn mapped(self) -> Option<BufferMapping> {
        match self {
            MapResult::Mapped(mapping) => Some(mapping),
            MapResult::Pending(_) => None,
        }
    }
}

/// Marker trait for plain-old-data that can be copied to and from buffer memory bytewise.
///
/// # Safety
///
/// Implementors must have a C-compatible layout with no padding, no uninitialized bytes, and
/// every bit pattern a valid value.
pub unsafe trait CRepr: Copy + 'static {}

unsafe impl CRepr for u8 {}
unsafe impl CRepr for u16 {}
unsafe impl CRepr for u32 {}
unsafe impl CRepr for u64 {}
unsafe impl CRepr for i8 {}
unsafe impl CRepr for i16 {}
unsafe impl CRepr for i32 {}
unsafe impl CRepr for i64 {}
unsafe impl CRepr for f32 {}
unsafe impl CRepr for f64 {}
unsafe impl CRepr for half::f16 {}
unsafe impl<T: CRepr, const N: usize> CRepr for [T; N] {}

/// Views a slice of plain-old-data as bytes.
pub(crate) fn as_bytes<T: CRepr>(values: &[T]) -> &[u8] {
    //safe because CRepr guarantees no padding
    unsafe { std::slice::from_raw_parts(values.as_ptr() as *const u8, std::mem::size_of_val(values)) }
}

/// Views a mutable slice of plain-old-data as bytes.
pub(crate) fn as_bytes_mut<T: CRepr>(values: &mut [T]) -> &mut [u8] {
    //safe because CRepr guarantees every bit pattern is valid
    unsafe { std::slice::from_raw_parts_mut(values.as_mut_ptr() as *mut u8, std::mem::size_of_val(values)) }
}
