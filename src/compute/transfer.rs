// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Moving data between the CPU and buffers, and between buffers.

use crate::bindings::buffer_access::{BufferMapping, CRepr, MapResult, MapType, as_bytes, as_bytes_mut};
use crate::bindings::resource_tracking::{ResourceState, cpu_conflicts};
use crate::bindings::visible_to::{BufferFlags, BufferStrategy};
use crate::compute::buffer::Buffer;
use crate::compute::device::Device;
use crate::compute::lifecycle::{CommandFlags, CommandListState, Timeout};
use crate::format::{self, Format};
use crate::range::Range;
use crate::status::{Error, Status, ensure_arg};

/// Largest payload of one [`Device::write_memory_to_buffer`] into GPU-resident memory.
pub const MAX_IMMEDIATE_WRITE: usize = 0x10000;

impl Device {
    /// Waits for outstanding GPU work that conflicts with a CPU access to `buffer`.
    fn wait_for_cpu_access(&mut self, buffer: Buffer, cpu_writes: bool, flags: CommandFlags) -> Result<Status, Error> {
        if !self.commands.usage.is_used(buffer, cpu_conflicts(cpu_writes)) {
            return Ok(Status::Success);
        }
        let interval = logwise::perfwarn_begin!("CPU access to a buffer in use by the GPU");
        let status = self.ensure_state(CommandListState::Idle, Timeout::for_flags(flags));
        drop(interval);
        status
    }

    /// Maps `byte_range` of a persistently mapped buffer for CPU access.
    ///
    /// Waits for conflicting GPU work first, or returns [`MapResult::Pending`] under
    /// [`CommandFlags::DONT_WAIT`].  Fails with [`Error::InvalidArgument`] while the buffer is
    /// already mapped or bound.
    pub fn map_buffer(&mut self, buffer: Buffer, byte_range: Range, map_type: MapType, flags: CommandFlags) -> Result<MapResult, Error> {
        let entity = self.buffer_entity(buffer)?;
        ensure_arg!(!entity.mapped, "nested mapping is not supported");
        ensure_arg!(!self.commands.bindings.is_bound(buffer), "cannot map a buffer that is still bound");
        ensure_arg!(entity.info.strategy.is_persistently_mapped(), "buffer cannot be mapped");
        let required = match map_type {
            MapType::Read => BufferFlags::CPU_READ,
            MapType::Write => BufferFlags::CPU_SEQUENTIAL_WRITE,
        };
        ensure_arg!(entity.info.flags.contains(required), "buffer was not created with the CPU flag for this mapping");
        let range = byte_range.limit(entity.info.size);
        ensure_arg!(range.count > 0, "mapped range is empty");
        ensure_arg!(range.fits(entity.info.size), "mapped range out of bounds");

        match self.wait_for_cpu_access(buffer, map_type == MapType::Write, flags)? {
            Status::Success => {}
            pending => return Ok(MapResult::Pending(pending)),
        }

        let entity = self.buffer_entity_mut(buffer)?;
        let base = entity.resource.persistent_ptr().ok_or(Error::Unexpected("persistently mapped buffer has no mapping"))?;
        entity.mapped = true;
        //safety: range fits the resource, checked above
        let mapping = unsafe { BufferMapping::new(buffer, map_type, entity.resource.clone(), base.add(range.first), range.count) };
        Ok(MapResult::Mapped(mapping))
    }

    /// Ends a mapping.
    pub fn unmap_buffer(&mut self, mapping: BufferMapping) -> Result<(), Error> {
        let entity = self.buffer_entity_mut(mapping.buffer)?;
        ensure_arg!(entity.mapped, "buffer is not mapped");
        entity.mapped = false;
        Ok(())
    }

    /// Copies `byte_range` of a readback buffer into `dst`.
    ///
    /// Flushes and waits when the GPU still writes the buffer; under
    /// [`CommandFlags::DONT_WAIT`] returns the pending status instead.  `dst` must be exactly
    /// as long as the range.
    pub fn read_buffer_to_memory(&mut self, buffer: Buffer, byte_range: Range, dst: &mut [u8], flags: CommandFlags) -> Result<Status, Error> {
        let entity = self.buffer_entity(buffer)?;
        ensure_arg!(!entity.mapped, "cannot read a buffer while it is mapped");
        let range = byte_range.limit(entity.info.size);
        if range.count == 0 {
            return Ok(Status::NoOp);
        }
        ensure_arg!(range.fits(entity.info.size), "source buffer region out of bounds");
        ensure_arg!(dst.len() == range.count, "destination length does not match the range");
        ensure_arg!(entity.info.flags.contains(BufferFlags::CPU_READ), "buffer was not created with CPU read access");

        match self.wait_for_cpu_access(buffer, false, flags)? {
            Status::Success => {}
            pending => return Ok(pending),
        }
        let entity = self.buffer_entity(buffer)?;
        //safety: no recorded GPU command writes the buffer any more
        dst.copy_from_slice(unsafe { entity.resource.bytes(range.first, range.count) });
        Ok(Status::Success)
    }

    /// Writes `src` into the buffer at `dst_byte_offset`.
    ///
    /// Upload buffers are written through their mapping right away, waiting for the GPU if it
    /// still reads them.  GPU-resident buffers get the data through commands recorded into the
    /// command list, at most [`MAX_IMMEDIATE_WRITE`] bytes per call.
    pub fn write_memory_to_buffer(&mut self, src: &[u8], buffer: Buffer, dst_byte_offset: usize, flags: CommandFlags) -> Result<Status, Error> {
        let entity = self.buffer_entity(buffer)?;
        ensure_arg!(!entity.mapped, "cannot write a buffer while it is mapped");
        if src.is_empty() {
            return Ok(Status::NoOp);
        }
        ensure_arg!(src.len() % 4 == 0, "source size must be a multiple of 4 bytes");
        ensure_arg!(Range::new(dst_byte_offset, src.len()).fits(entity.info.size), "destination buffer region out of bounds");

        let strategy = entity.info.strategy;
        match strategy {
            BufferStrategy::Upload | BufferStrategy::GpuUpload => {
                match self.wait_for_cpu_access(buffer, true, flags)? {
                    Status::Success => {}
                    pending => return Ok(pending),
                }
                let entity = self.buffer_entity(buffer)?;
                //safety: the GPU has drained every command using the buffer
                unsafe { entity.resource.bytes_mut(dst_byte_offset, src.len()) }.copy_from_slice(src);
                Ok(Status::Success)
            }
            BufferStrategy::Default => {
                ensure_arg!(src.len() <= MAX_IMMEDIATE_WRITE, "writes to GPU memory are limited to 64 KB per call");
                match self.begin_recording(Timeout::for_flags(flags))? {
                    Status::Success => {}
                    pending => return Ok(pending),
                }
                self.use_buffer(buffer, ResourceState::CopyDest)?;
                let resource = self.buffer_entity(buffer)?.resource.clone();
                let list = self.commands.list();
                for (index, word) in src.chunks_exact(4).enumerate() {
                    let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                    list.write_buffer_immediate(&resource, dst_byte_offset + index * 4, value);
                }
                Ok(Status::Success)
            }
            BufferStrategy::Readback => Err(Error::Unexpected("readback buffers cannot be written by the CPU")),
        }
    }

    /// Records a copy of the whole of `src` into `dst`.  Both buffers must be the same size.
    pub fn copy_buffer(&mut self, src: Buffer, dst: Buffer) -> Result<Status, Error> {
        let src_info = self.buffer_entity(src)?.info;
        let dst_info = self.buffer_entity(dst)?.info;
        ensure_arg!(src != dst, "cannot copy a buffer onto itself");
        ensure_arg!(src_info.flags.contains(BufferFlags::COPY_SRC), "source was not created with copy source usage");
        ensure_arg!(dst_info.flags.contains(BufferFlags::COPY_DST), "destination was not created with copy destination usage");
        ensure_arg!(src_info.size == dst_info.size, "source and destination must have the same size");

        match self.begin_recording(Timeout::INFINITE)? {
            Status::Success => {}
            pending => return Ok(pending),
        }
        self.use_buffer(src, ResourceState::CopySource)?;
        self.use_buffer(dst, ResourceState::CopyDest)?;
        let src_resource = self.buffer_entity(src)?.resource.clone();
        let dst_resource = self.buffer_entity(dst)?.resource.clone();
        self.commands.list().copy_resource(&dst_resource, &src_resource);
        Ok(Status::Success)
    }

    /// Records a copy of `src_byte_range` of `src` into `dst` at `dst_byte_offset`.
    ///
    /// `src` and `dst` must be different buffers.  An empty range is a [`Status::NoOp`].
    pub fn copy_buffer_region(&mut self, src: Buffer, src_byte_range: Range, dst: Buffer, dst_byte_offset: usize) -> Result<Status, Error> {
        let src_info = self.buffer_entity(src)?.info;
        let dst_info = self.buffer_entity(dst)?.info;
        ensure_arg!(src != dst, "cannot copy a buffer region within the same buffer");
        ensure_arg!(src_info.flags.contains(BufferFlags::COPY_SRC), "source was not created with copy source usage");
        ensure_arg!(dst_info.flags.contains(BufferFlags::COPY_DST), "destination was not created with copy destination usage");
        let range = src_byte_range.limit(src_info.size);
        if range.count == 0 {
            return Ok(Status::NoOp);
        }
        ensure_arg!(range.count % 4 == 0, "copy size must be a multiple of 4");
        ensure_arg!(range.fits(src_info.size), "source buffer overflow");
        ensure_arg!(Range::new(dst_byte_offset, range.count).fits(dst_info.size), "destination buffer overflow");

        match self.begin_recording(Timeout::INFINITE)? {
            Status::Success => {}
            pending => return Ok(pending),
        }
        self.use_buffer(src, ResourceState::CopySource)?;
        self.use_buffer(dst, ResourceState::CopyDest)?;
        let src_resource = self.buffer_entity(src)?.resource.clone();
        let dst_resource = self.buffer_entity(dst)?.resource.clone();
        self.commands.list().copy_buffer_region(&dst_resource, dst_byte_offset, &src_resource, range.first, range.count);
        Ok(Status::Success)
    }

    /// Records a clear of `element_range` to integer `values`.
    ///
    /// Typed buffers take one value per component of their format.  Byte-address buffers are
    /// cleared as 32-bit words to `values[0]`.
    pub fn clear_buffer_to_uint_values(&mut self, buffer: Buffer, values: [u32; 4], element_range: Range) -> Result<Status, Error> {
        let info = self.buffer_entity(buffer)?.info;
        ensure_arg!(info.flags.contains(BufferFlags::GPU_READ_WRITE), "clears need read-write shader usage");
        ensure_arg!(info.flags.intersects(BufferFlags::TYPED | BufferFlags::BYTE_ADDRESS), "clears need a typed or byte-address buffer");
        let format = clear_format(info.flags, info.element_format);
        format::uint_clear_bits(format, values).map_err(crate::status::invalid_argument)?;
        let Some(desc) = self.clear_view(buffer, format, element_range)? else {
            return Ok(Status::NoOp);
        };
        match self.begin_clear(buffer, desc)? {
            ClearTarget::Ready { gpu, cpu, resource } => {
                let staging = self.commands.staging_heap.clone();
                self.commands.list().clear_uav_uint(gpu, &staging, cpu, &resource, values);
                Ok(Status::Success)
            }
            ClearTarget::Pending(status) => Ok(status),
        }
    }

    /// Records a clear of `element_range` to float `values`.  Typed buffers only.
    pub fn clear_buffer_to_float_values(&mut self, buffer: Buffer, values: [f32; 4], element_range: Range) -> Result<Status, Error> {
        let info = self.buffer_entity(buffer)?.info;
        ensure_arg!(info.flags.contains(BufferFlags::GPU_READ_WRITE), "clears need read-write shader usage");
        ensure_arg!(info.flags.contains(BufferFlags::TYPED), "float clears need a typed buffer");
        format::float_clear_bits(info.element_format, values).map_err(crate::status::invalid_argument)?;
        let Some(desc) = self.clear_view(buffer, info.element_format, element_range)? else {
            return Ok(Status::NoOp);
        };
        match self.begin_clear(buffer, desc)? {
            ClearTarget::Ready { gpu, cpu, resource } => {
                let staging = self.commands.staging_heap.clone();
                self.commands.list().clear_uav_float(gpu, &staging, cpu, &resource, values);
                Ok(Status::Success)
            }
            ClearTarget::Pending(status) => Ok(status),
        }
    }

    /// Element view a clear writes through, or `None` for an empty range.
    fn clear_view(&self, buffer: Buffer, format: Format, element_range: Range) -> Result<Option<crate::imp::BufferViewDesc>, Error> {
        let info = self.buffer_entity(buffer)?.info;
        let element_size = format.element_size();
        let element_count = info.size / element_size;
        let range = element_range.limit(element_count);
        if range.count == 0 {
            return Ok(None);
        }
        ensure_arg!(range.fits(element_count), "element range out of bounds");
        Ok(Some(crate::imp::BufferViewDesc {
            layout: crate::imp::ElementLayout::Typed(format),
            first_element: range.first,
            num_elements: range.count,
        }))
    }

    /// Opens the list and writes the clear view into both descriptor heaps.
    fn begin_clear(&mut self, buffer: Buffer, desc: crate::imp::BufferViewDesc) -> Result<ClearTarget, Error> {
        match self.begin_recording(Timeout::INFINITE)? {
            Status::Success => {}
            pending => return Ok(ClearTarget::Pending(pending)),
        }
        let heap = self.commands.visible_heap.clone();
        self.commands.list().set_descriptor_heap(&heap);
        self.use_buffer(buffer, ResourceState::UnorderedAccess)?;

        let gpu = self.commands.visible_arena.allocate_dynamic()?;
        let cpu = self.commands.staging_arena.allocate_dynamic()?;
        let resource = self.buffer_entity(buffer)?.resource.clone();
        self.native.create_unordered_access_view(&self.commands.visible_heap, gpu.index(), &resource, desc);
        self.native.create_unordered_access_view(&self.commands.staging_heap, cpu.index(), &resource, desc);
        Ok(ClearTarget::Ready { gpu: gpu.index(), cpu: cpu.index(), resource })
    }

    /// Writes one value at `byte_offset`.  See [`Device::write_memory_to_buffer`].
    pub fn write_value_to_buffer<T: CRepr>(&mut self, value: &T, buffer: Buffer, byte_offset: usize, flags: CommandFlags) -> Result<Status, Error> {
        self.write_memory_to_buffer(as_bytes(std::slice::from_ref(value)), buffer, byte_offset, flags)
    }

    /// Writes a slice of values at `byte_offset`.  See [`Device::write_memory_to_buffer`].
    pub fn write_slice_to_buffer<T: CRepr>(&mut self, values: &[T], buffer: Buffer, byte_offset: usize, flags: CommandFlags) -> Result<Status, Error> {
        self.write_memory_to_buffer(as_bytes(values), buffer, byte_offset, flags)
    }

    /// Reads one value from `byte_offset`.  See [`Device::read_buffer_to_memory`].
    pub fn read_buffer_to_value<T: CRepr + Default>(&mut self, buffer: Buffer, byte_offset: usize, flags: CommandFlags) -> Result<(Status, T), Error> {
        let mut value = T::default();
        let range = Range::new(byte_offset, std::mem::size_of::<T>());
        let status = self.read_buffer_to_memory(buffer, range, as_bytes_mut(std::slice::from_mut(&mut value)), flags)?;
        Ok((status, value))
    }

    /// Fills `values` from `byte_offset`.  See [`Device::read_buffer_to_memory`].
    pub fn read_buffer_to_slice<T: CRepr>(&mut self, buffer: Buffer, byte_offset: usize, values: &mut [T], flags: CommandFlags) -> Result<Status, Error> {
        let range = Range::new(byte_offset, std::mem::size_of_val(values));
        self.read_buffer_to_memory(buffer, range, as_bytes_mut(values), flags)
    }
}

enum ClearTarget {
    Ready { gpu: u32, cpu: u32, resource: crate::imp::Resource },
    Pending(Status),
}

/// Format a clear interprets the buffer with: the element format when typed, 32-bit words
/// otherwise.
fn clear_format(flags: BufferFlags, element_format: Format) -> Format {
    if flags.contains(BufferFlags::TYPED) { element_format } else { Format::R32Uint }
}
