// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The command-list lifecycle.

A device records into a single command list that cycles through three states:

```text
Idle ──reset──▶ Recording ──close, submit, signal──▶ Executing ──fence reached──▶ Idle
```

[`CommandContext::ensure_state`] walks that cycle forward until it reaches the requested state.
Every bookkeeping structure that is only valid for one trip around the cycle lives here too:
the resource usage map, the set of shaders used, the binding cache's cached views and the
dynamic halves of both descriptor heaps.  All of it is reset when the fence confirms the GPU
has drained the list.
*/

use crate::bindings::bind_style::{BindClass, Binding, BindingCache};
use crate::bindings::descriptor_heap::{
    DescriptorArena, DescriptorIndex, NULL_CONSTANT_SLOT, NULL_READ_ONLY_SLOT, NULL_READ_WRITE_SLOT,
};
use crate::bindings::resource_tracking::{Barrier, ResourceState, ResourceUsageMap};
use crate::compute::buffer::{Buffer, BufferEntity, BufferInfo};
use crate::compute::registry::Registry;
use crate::compute::shader::Shader;
use crate::imp;
use crate::range::Range;
use crate::status::{Error, Status, ensure_arg};
use std::collections::HashSet;
use std::time::Duration;

/// State of the device's command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    /// Nothing pending; the GPU has caught up.
    Idle,
    /// Commands are being appended.
    Recording,
    /// Submitted; waiting for the fence.
    Executing,
}

/// How long a call may block on the GPU, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeout(u32);

impl Timeout {
    /// Poll without blocking.
    pub const ZERO: Timeout = Timeout(0);
    /// Block until the GPU is done.
    pub const INFINITE: Timeout = Timeout(u32::MAX);

    pub const fn from_millis(millis: u32) -> Self {
        Timeout(millis)
    }

    pub fn as_millis(self) -> u32 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self == Timeout::INFINITE
    }

    pub(crate) fn for_flags(flags: CommandFlags) -> Self {
        if flags.contains(CommandFlags::DONT_WAIT) { Timeout::ZERO } else { Timeout::INFINITE }
    }
}

bitflags::bitflags! {
    /// Options for operations that may have to wait for the GPU.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandFlags: u32 {
        /// Report [`Status::NotReady`] instead of blocking.
        const DONT_WAIT = 0x1;
    }
}

/// Command list, fence bookkeeping, and everything valid for one trip around the cycle.
#[derive(Debug)]
pub(crate) struct CommandContext {
    state: CommandListState,
    list: imp::CommandList,
    submitted_fence_value: u64,
    pub(crate) usage: ResourceUsageMap<Buffer>,
    pub(crate) used_shaders: HashSet<Shader>,
    pub(crate) bindings: BindingCache<Buffer>,
    pub(crate) visible_arena: DescriptorArena,
    pub(crate) staging_arena: DescriptorArena,
    pub(crate) visible_heap: imp::DescriptorHeap,
    pub(crate) staging_heap: imp::DescriptorHeap,
}

impl CommandContext {
    pub(crate) fn new(native: &imp::Device, descriptor_capacity: u32) -> Self {
        let visible_heap = native.create_descriptor_heap(descriptor_capacity, true);
        let staging_heap = native.create_descriptor_heap(descriptor_capacity, false);
        for heap in [&visible_heap, &staging_heap] {
            native.create_null_view(heap, NULL_CONSTANT_SLOT, imp::ViewKind::Constant);
            native.create_null_view(heap, NULL_READ_ONLY_SLOT, imp::ViewKind::ShaderResource);
            native.create_null_view(heap, NULL_READ_WRITE_SLOT, imp::ViewKind::UnorderedAccess);
        }
        CommandContext {
            state: CommandListState::Idle,
            list: native.create_command_list("CommandList"),
            submitted_fence_value: 0,
            usage: ResourceUsageMap::new(),
            used_shaders: HashSet::new(),
            bindings: BindingCache::new(),
            visible_arena: DescriptorArena::new(descriptor_capacity),
            staging_arena: DescriptorArena::new(descriptor_capacity),
            visible_heap,
            staging_heap,
        }
    }

    pub(crate) fn state(&self) -> CommandListState {
        self.state
    }

    pub(crate) fn list(&mut self) -> &mut imp::CommandList {
        debug_assert_eq!(self.state, CommandListState::Recording);
        &mut self.list
    }

    /// Drives the list forward until it is in `desired`.
    ///
    /// Returns [`Status::NotReady`] or [`Status::Timeout`] when waiting for the fence did not
    /// finish within `timeout`; the list is left executing.  Failures leave the state wherever
    /// the failing step left it.
    pub(crate) fn ensure_state(&mut self, native: &imp::Device, desired: CommandListState, timeout: Timeout) -> Result<Status, Error> {
        while self.state != desired {
            match self.state {
                CommandListState::Recording => self.execute(native)?,
                CommandListState::Executing => match self.wait(native, timeout)? {
                    Status::Success => {}
                    pending => return Ok(pending),
                },
                CommandListState::Idle => self.reset_for_recording(),
            }
        }
        Ok(Status::Success)
    }

    fn execute(&mut self, native: &imp::Device) -> Result<(), Error> {
        debug_assert_eq!(self.state, CommandListState::Recording);
        self.list.close();
        let commands = self.list.len();
        native.execute_command_list(&mut self.list)?;
        self.submitted_fence_value += 1;
        native.signal(self.submitted_fence_value)?;
        self.state = CommandListState::Executing;
        logwise::info_sync!(
            "Submitted {commands} commands, fence value {value}",
            commands = commands,
            value = self.submitted_fence_value
        );
        Ok(())
    }

    fn wait(&mut self, native: &imp::Device, timeout: Timeout) -> Result<Status, Error> {
        debug_assert_eq!(self.state, CommandListState::Executing);
        let fence = native.fence();
        let target = self.submitted_fence_value;
        if fence.completed_value() < target {
            if timeout == Timeout::ZERO {
                return Ok(Status::NotReady);
            }
            let limit = (!timeout.is_infinite()).then(|| Duration::from_millis(timeout.as_millis().into()));
            if !fence.wait(target, limit)? {
                logwise::warn_sync!(
                    "Waiting {millis}ms for fence value {value} timed out",
                    millis = timeout.as_millis(),
                    value = target
                );
                return Ok(Status::Timeout);
            }
        }
        self.state = CommandListState::Idle;
        self.usage.clear();
        self.used_shaders.clear();
        self.bindings.reset_descriptors();
        self.visible_arena.clear_dynamic();
        self.staging_arena.clear_dynamic();
        logwise::trace_sync!("Fence value {value} reached", value = target);
        Ok(Status::Success)
    }

    fn reset_for_recording(&mut self) {
        debug_assert_eq!(self.state, CommandListState::Idle);
        self.list.reset();
        self.state = CommandListState::Recording;
    }

    /// Records a GPU use of `buffer` in `state`, inserting the barrier the usage map asks for.
    pub(crate) fn use_buffer(&mut self, buffer: Buffer, entity: &BufferEntity, state: ResourceState) -> Result<(), Error> {
        debug_assert_eq!(self.state, CommandListState::Recording);
        ensure_arg!(!entity.mapped, "cannot use a buffer on the GPU while it is mapped");
        let Some(barrier) = self.usage.use_buffer(buffer, entity.info.strategy, state) else {
            return Ok(());
        };
        let native = match barrier {
            Barrier::Transition { before, after } => {
                logwise::trace_sync!(
                    "Transition barrier on {name}: {before} -> {after}",
                    name = logwise::privacy::LogIt(&entity.name),
                    before = logwise::privacy::LogIt(&before),
                    after = logwise::privacy::LogIt(&after)
                );
                imp::NativeBarrier::Transition { resource: entity.resource.clone(), before, after }
            }
            Barrier::ReadWriteHazard => {
                logwise::trace_sync!("Read-write barrier on {name}", name = logwise::privacy::LogIt(&entity.name));
                imp::NativeBarrier::UnorderedAccess { resource: entity.resource.clone() }
            }
        };
        self.list.resource_barrier(native);
        Ok(())
    }

    /// Points every root parameter at a descriptor, creating views for newly bound slots.
    pub(crate) fn update_root_arguments(&mut self, native: &imp::Device, buffers: &Registry<BufferEntity>) -> Result<(), Error> {
        debug_assert_eq!(self.state, CommandListState::Recording);
        for class in BindClass::ALL {
            for slot in 0..class.slot_count() {
                let binding = self.bindings.slots(class)[slot];
                let descriptor = match binding.buffer {
                    None => class.null_descriptor(),
                    Some(buffer) => self.materialize(native, buffers, class, slot, buffer, binding)?,
                };
                self.list.set_root_descriptor_table(root_parameter(class, slot), descriptor.index());
            }
        }
        Ok(())
    }

    fn materialize(
        &mut self,
        native: &imp::Device,
        buffers: &Registry<BufferEntity>,
        class: BindClass,
        slot: usize,
        buffer: Buffer,
        binding: Binding<Buffer>,
    ) -> Result<DescriptorIndex, Error> {
        let entity = buffers.get(buffer.0).ok_or(Error::Unexpected("bound buffer was destroyed"))?;
        self.use_buffer(buffer, entity, class.resource_state())?;
        if let Some(descriptor) = binding.descriptor.filter(|d| self.visible_arena.is_live(*d)) {
            return Ok(descriptor);
        }
        let descriptor = self.visible_arena.allocate_dynamic()?;
        let heap = &self.visible_heap;
        let range = binding.range;
        match class {
            BindClass::Constant => {
                native.create_constant_buffer_view(heap, descriptor.index(), &entity.resource, range.first, range.count);
            }
            BindClass::ReadOnly => {
                native.create_shader_resource_view(heap, descriptor.index(), &entity.resource, view_desc(&entity.info, range));
            }
            BindClass::ReadWrite => {
                native.create_unordered_access_view(heap, descriptor.index(), &entity.resource, view_desc(&entity.info, range));
            }
        }
        logwise::trace_sync!(
            "Created view for {name} at descriptor {index}",
            name = logwise::privacy::LogIt(&entity.name),
            index = descriptor.index()
        );
        self.bindings.slots_mut(class)[slot].descriptor = Some(descriptor);
        Ok(descriptor)
    }
}

fn root_parameter(class: BindClass, slot: usize) -> u32 {
    let base = match class {
        BindClass::Constant => imp::ROOT_CONSTANT_BASE,
        BindClass::ReadOnly => imp::ROOT_READ_ONLY_BASE,
        BindClass::ReadWrite => imp::ROOT_READ_WRITE_BASE,
    };
    base + slot as u32
}

/// Shader view over `range` bytes of a buffer, following its structural kind.
fn view_desc(info: &BufferInfo, range: Range) -> imp::BufferViewDesc {
    use crate::bindings::visible_to::BufferFlags;
    let layout = if info.flags.contains(BufferFlags::TYPED) {
        imp::ElementLayout::Typed(info.element_format)
    } else if info.flags.contains(BufferFlags::STRUCTURED) {
        imp::ElementLayout::Structured { stride: info.structure_size as u32 }
    } else {
        imp::ElementLayout::Raw
    };
    let stride = layout.stride();
    debug_assert!(range.first % stride == 0 && range.count % stride == 0);
    imp::BufferViewDesc { layout, first_element: range.first / stride, num_elements: range.count / stride }
}
