// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The device and its command-recording surface.

A [`Device`] owns every buffer and shader created through it, plus one command list.  Operations
that touch the GPU append to that list, starting a new recording when needed; nothing reaches the
GPU until [`Device::submit_pending_commands`] or an operation that needs the GPU's results
(reading a buffer, waiting) flushes it.

The device is single-threaded: every operation takes `&mut self`.
*/

use crate::bindings::bind_style::{BindCandidate, BindClass, BindSlot};
use crate::bindings::descriptor_heap::{DEFAULT_CAPACITY, STATIC_SLOTS};
use crate::compute::buffer::{Buffer, BufferDesc, BufferEntity, BufferInfo};
use crate::compute::lifecycle::{CommandContext, CommandListState, Timeout};
use crate::compute::loading::read_file;
use crate::compute::registry::Registry;
use crate::compute::shader::{Shader, ShaderDesc, ShaderEntity, ShaderInfo};
use crate::imp;
use crate::range::Range;
use crate::status::{Error, Status, ensure_arg, invalid_argument};
use std::path::Path;

/// Largest group count of a dispatch in any dimension.
pub const MAX_DISPATCH_GROUPS: u32 = 65535;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u32 {
        /// Asks the queue not to abort long-running work.
        const DISABLE_GPU_TIMEOUT = 0x1;
        /// Native objects are created without debug names.
        const DISABLE_NAME_SETTING = 0x2;
        /// Buffers and shaders do not keep a copy of their names.
        const DISABLE_NAME_STORING = 0x4;
    }
}

/// Parameters of a new device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDesc {
    pub name: String,
    pub flags: DeviceFlags,
    /// Descriptors per heap, including the static null views.
    pub descriptor_heap_capacity: u32,
}

impl DeviceDesc {
    pub fn new(name: impl Into<String>) -> Self {
        DeviceDesc { name: name.into(), flags: DeviceFlags::empty(), descriptor_heap_capacity: DEFAULT_CAPACITY }
    }

    pub fn with_flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_descriptor_heap_capacity(mut self, capacity: u32) -> Self {
        self.descriptor_heap_capacity = capacity;
        self
    }
}

impl Default for DeviceDesc {
    fn default() -> Self {
        DeviceDesc::new("")
    }
}

/// A compute device.
#[derive(Debug)]
pub struct Device {
    name: String,
    flags: DeviceFlags,
    pub(crate) native: imp::Device,
    pub(crate) buffers: Registry<BufferEntity>,
    pub(crate) shaders: Registry<ShaderEntity>,
    pub(crate) commands: CommandContext,
    static_buffers: Vec<Buffer>,
    static_shaders: Vec<Shader>,
}

impl Device {
    pub(crate) fn new(native: imp::Device, desc: &DeviceDesc) -> Result<Self, Error> {
        ensure_arg!(desc.descriptor_heap_capacity > STATIC_SLOTS, "descriptor heap capacity must exceed the static slots");
        let commands = CommandContext::new(&native, desc.descriptor_heap_capacity);
        logwise::info_sync!(
            "Created device {name} with {capacity} descriptors per heap",
            name = logwise::privacy::LogIt(&desc.name),
            capacity = desc.descriptor_heap_capacity
        );
        Ok(Device {
            name: desc.name.clone(),
            flags: desc.flags,
            native,
            buffers: Registry::default(),
            shaders: Registry::default(),
            commands,
            static_buffers: Vec::new(),
            static_shaders: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    /// The backend device, for statistics and queue control.
    pub fn native(&self) -> &imp::Device {
        &self.native
    }

    pub fn command_list_state(&self) -> CommandListState {
        self.commands.state()
    }

    fn stored_name(&self, name: &str) -> String {
        if self.flags.contains(DeviceFlags::DISABLE_NAME_STORING) { String::new() } else { name.to_string() }
    }

    pub(crate) fn buffer_entity(&self, buffer: Buffer) -> Result<&BufferEntity, Error> {
        ensure_arg!(self.buffers.owns(buffer.0), "buffer does not belong to this device");
        self.buffers.get(buffer.0).ok_or_else(|| invalid_argument("buffer handle is stale"))
    }

    pub(crate) fn buffer_entity_mut(&mut self, buffer: Buffer) -> Result<&mut BufferEntity, Error> {
        ensure_arg!(self.buffers.owns(buffer.0), "buffer does not belong to this device");
        self.buffers.get_mut(buffer.0).ok_or_else(|| invalid_argument("buffer handle is stale"))
    }

    fn shader_entity(&self, shader: Shader) -> Result<&ShaderEntity, Error> {
        ensure_arg!(self.shaders.owns(shader.0), "shader does not belong to this device");
        self.shaders.get(shader.0).ok_or_else(|| invalid_argument("shader handle is stale"))
    }

    pub(crate) fn ensure_state(&mut self, desired: CommandListState, timeout: Timeout) -> Result<Status, Error> {
        self.commands.ensure_state(&self.native, desired, timeout)
    }

    /// Opens the command list for recording, waiting for the previous submission if needed.
    pub(crate) fn begin_recording(&mut self, timeout: Timeout) -> Result<Status, Error> {
        self.ensure_state(CommandListState::Recording, timeout)
    }

    /// Records a GPU use of `buffer` into the open command list.
    pub(crate) fn use_buffer(&mut self, buffer: Buffer, state: crate::bindings::resource_tracking::ResourceState) -> Result<(), Error> {
        ensure_arg!(self.buffers.owns(buffer.0), "buffer does not belong to this device");
        let entity = self.buffers.get(buffer.0).ok_or_else(|| invalid_argument("buffer handle is stale"))?;
        self.commands.use_buffer(buffer, entity, state)
    }

    /// Creates a buffer without initial data.
    pub fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Buffer, Error> {
        self.create_buffer_from_memory(desc, &[])
    }

    /// Creates a buffer and copies `initial_data` into the start of it.
    ///
    /// Initial data requires an upload buffer.
    pub fn create_buffer_from_memory(&mut self, desc: &BufferDesc, initial_data: &[u8]) -> Result<Buffer, Error> {
        let info = desc.validate(initial_data.len())?;
        let resource = self.native.create_committed_resource(
            info.size,
            info.heap_type(),
            info.flags.contains(crate::bindings::visible_to::BufferFlags::GPU_READ_WRITE),
            &desc.name,
        )?;
        if !initial_data.is_empty() {
            //safety: the resource was just created, so nothing else can reach it
            unsafe { resource.bytes_mut(0, initial_data.len()) }.copy_from_slice(initial_data);
        }
        let entity = BufferEntity { name: self.stored_name(&desc.name), info, resource, mapped: false };
        let buffer = Buffer(self.buffers.insert(entity));
        logwise::trace_sync!(
            "Created buffer {name}: {size} bytes, {strategy}",
            name = logwise::privacy::LogIt(&desc.name),
            size = info.size,
            strategy = logwise::privacy::LogIt(&info.strategy)
        );
        Ok(buffer)
    }

    /// Creates a buffer initialized with the contents of a file.
    ///
    /// An empty file creates the buffer without initial data.  A file larger than the buffer
    /// fails with [`Error::OutOfBounds`].
    pub async fn create_buffer_from_file(&mut self, desc: &BufferDesc, path: &Path, priority: async_file::Priority) -> Result<Buffer, Error> {
        let data = read_file(path, priority).await?;
        if data.len() > desc.size {
            return Err(Error::OutOfBounds);
        }
        self.create_buffer_from_memory(desc, &data)
    }

    /// Creates a compute shader from bytecode.
    pub fn create_shader_from_memory(&mut self, desc: &ShaderDesc, bytecode: &[u8]) -> Result<Shader, Error> {
        let info = desc.validate(bytecode)?;
        let pipeline = self.native.create_pipeline(bytecode, info.thread_group_size, &desc.name)?;
        let entity = ShaderEntity { name: self.stored_name(&desc.name), info, pipeline };
        let shader = Shader(self.shaders.insert(entity));
        logwise::trace_sync!("Created shader {name}", name = logwise::privacy::LogIt(&desc.name));
        Ok(shader)
    }

    /// Creates a compute shader from a bytecode file.  An empty file fails with
    /// [`Error::Unexpected`].
    pub async fn create_shader_from_file(&mut self, desc: &ShaderDesc, path: &Path, priority: async_file::Priority) -> Result<Shader, Error> {
        let data = read_file(path, priority).await?;
        self.create_shader_from_memory(desc, &data)
    }

    /// Destroys a buffer once the GPU no longer uses it.
    ///
    /// Fails with [`Error::InvalidArgument`] while the buffer is mapped or bound.
    pub fn destroy_buffer(&mut self, buffer: Buffer) -> Result<(), Error> {
        let entity = self.buffer_entity(buffer)?;
        ensure_arg!(!entity.mapped, "cannot destroy a mapped buffer");
        ensure_arg!(!self.commands.bindings.is_bound(buffer), "buffer is still bound");
        if self.commands.usage.contains(buffer) {
            let status = self.ensure_state(CommandListState::Idle, Timeout::INFINITE)?;
            debug_assert_eq!(status, Status::Success);
        }
        if let Some(entity) = self.buffers.remove(buffer.0) {
            logwise::trace_sync!("Destroyed buffer {name}", name = logwise::privacy::LogIt(&entity.name));
        }
        Ok(())
    }

    /// Destroys a shader once the GPU no longer uses it.
    pub fn destroy_shader(&mut self, shader: Shader) -> Result<(), Error> {
        self.shader_entity(shader)?;
        if self.commands.used_shaders.contains(&shader) {
            let status = self.ensure_state(CommandListState::Idle, Timeout::INFINITE)?;
            debug_assert_eq!(status, Status::Success);
        }
        if let Some(entity) = self.shaders.remove(shader.0) {
            logwise::trace_sync!("Destroyed shader {name}", name = logwise::privacy::LogIt(&entity.name));
        }
        Ok(())
    }

    pub fn buffer_info(&self, buffer: Buffer) -> Result<BufferInfo, Error> {
        Ok(self.buffer_entity(buffer)?.info)
    }

    pub fn buffer_name(&self, buffer: Buffer) -> Result<&str, Error> {
        Ok(&self.buffer_entity(buffer)?.name)
    }

    pub fn shader_info(&self, shader: Shader) -> Result<ShaderInfo, Error> {
        Ok(self.shader_entity(shader)?.info)
    }

    /// Number of buffers not yet destroyed.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of shaders not yet destroyed.
    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    fn bind(&mut self, class: BindClass, slot: u32, buffer: Option<Buffer>, range: Range) -> Result<Status, Error> {
        let candidate = match buffer {
            Some(key) => {
                let entity = self.buffer_entity(key)?;
                Some(BindCandidate { key, info: entity.info, mapped: entity.mapped })
            }
            None => None,
        };
        self.commands.bindings.bind(class, BindSlot::new(slot), candidate, range)
    }

    /// Binds `buffer[byte_range]` as constant buffer `slot`, or unbinds the slot with `None`.
    ///
    /// Returns [`Status::NoOp`] when the slot already holds the same buffer and range.
    pub fn bind_constant_buffer(&mut self, slot: u32, buffer: Option<Buffer>, byte_range: Range) -> Result<Status, Error> {
        self.bind(BindClass::Constant, slot, buffer, byte_range)
    }

    /// Binds `buffer[byte_range]` as read-only buffer `slot`, or unbinds the slot with `None`.
    pub fn bind_buffer(&mut self, slot: u32, buffer: Option<Buffer>, byte_range: Range) -> Result<Status, Error> {
        self.bind(BindClass::ReadOnly, slot, buffer, byte_range)
    }

    /// Binds `buffer[byte_range]` as read-write buffer `slot`, or unbinds the slot with `None`.
    pub fn bind_rw_buffer(&mut self, slot: u32, buffer: Option<Buffer>, byte_range: Range) -> Result<Status, Error> {
        self.bind(BindClass::ReadWrite, slot, buffer, byte_range)
    }

    /// Unbinds every slot.
    pub fn reset_all_bindings(&mut self) {
        self.commands.bindings.reset_all();
    }

    /// Records a dispatch of `shader` over `group_count` thread groups with the current bindings.
    ///
    /// Any zero dimension is a [`Status::NoOp`].  Dimensions above [`MAX_DISPATCH_GROUPS`] are
    /// rejected.
    pub fn dispatch_compute_shader(&mut self, shader: Shader, group_count: [u32; 3]) -> Result<Status, Error> {
        self.shader_entity(shader)?;
        if group_count.contains(&0) {
            return Ok(Status::NoOp);
        }
        ensure_arg!(
            group_count.iter().all(|count| *count <= MAX_DISPATCH_GROUPS),
            "dispatch group count cannot exceed 65535 in any dimension"
        );

        match self.begin_recording(Timeout::INFINITE)? {
            Status::Success => {}
            pending => return Ok(pending),
        }
        let pipeline = self.shader_entity(shader)?.pipeline.clone();
        let commands = &mut self.commands;
        let heap = commands.visible_heap.clone();
        commands.list().set_descriptor_heap(&heap);
        commands.list().set_pipeline(&pipeline);
        commands.update_root_arguments(&self.native, &self.buffers)?;
        commands.list().dispatch(group_count);
        commands.used_shaders.insert(shader);
        Ok(Status::Success)
    }

    /// Submits everything recorded so far without waiting for it.
    ///
    /// Returns [`Status::NoOp`] when nothing was recorded.
    pub fn submit_pending_commands(&mut self) -> Result<Status, Error> {
        if self.commands.state() != CommandListState::Recording {
            return Ok(Status::NoOp);
        }
        self.ensure_state(CommandListState::Executing, Timeout::INFINITE)
    }

    /// Submits pending commands and waits up to `timeout` for the GPU to finish them.
    pub fn wait_for_gpu(&mut self, timeout: Timeout) -> Result<Status, Error> {
        self.ensure_state(CommandListState::Idle, timeout)
    }

    /// Records buffers and shaders that are destroyed along with the device.
    pub(crate) fn adopt_static(&mut self, buffers: Vec<Buffer>, shaders: Vec<Shader>) {
        self.static_buffers = buffers;
        self.static_shaders = shaders;
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(err) = self.ensure_state(CommandListState::Idle, Timeout::INFINITE) {
            logwise::error_sync!("Device teardown could not drain the GPU: {err}", err = logwise::privacy::LogIt(&err));
        }
        self.commands.bindings.reset_all();
        for shader in std::mem::take(&mut self.static_shaders) {
            if let Err(err) = self.destroy_shader(shader) {
                logwise::error_sync!("Cannot destroy static shader: {err}", err = logwise::privacy::LogIt(&err));
            }
        }
        for buffer in std::mem::take(&mut self.static_buffers) {
            if let Err(err) = self.destroy_buffer(buffer) {
                logwise::error_sync!("Cannot destroy static buffer: {err}", err = logwise::privacy::LogIt(&err));
            }
        }
        for handle in self.buffers.handles() {
            if let Some(entity) = self.buffers.get(handle) {
                logwise::warn_sync!("Buffer {name} outlived its device", name = logwise::privacy::LogIt(&entity.name));
            }
        }
        if !std::thread::panicking() {
            debug_assert_eq!(self.buffers.len(), 0, "device dropped with live buffers");
            debug_assert_eq!(self.shaders.len(), 0, "device dropped with live shaders");
        }
        logwise::info_sync!("Destroyed device {name}", name = logwise::privacy::LogIt(&self.name));
    }
}
