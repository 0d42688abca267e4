// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::bindings::resource_tracking::ResourceState;
use crate::imp::soft::descriptor::DescriptorHeap;
use crate::imp::soft::{Pipeline, Resource};

/// Root parameter of the first constant-buffer table.
pub(crate) const ROOT_CONSTANT_BASE: u32 = 0;
/// Root parameter of the first read-only table.
pub(crate) const ROOT_READ_ONLY_BASE: u32 = 16;
/// Root parameter of the first read-write table.
pub(crate) const ROOT_READ_WRITE_BASE: u32 = 32;
pub(crate) const ROOT_PARAMETER_COUNT: u32 = 40;

#[derive(Debug, Clone)]
pub(crate) enum NativeBarrier {
    Transition { resource: Resource, before: ResourceState, after: ResourceState },
    UnorderedAccess { resource: Resource },
}

#[derive(Debug, Clone)]
pub(crate) enum Command {
    Barrier(NativeBarrier),
    CopyResource { dst: Resource, src: Resource },
    CopyBufferRegion { dst: Resource, dst_offset: usize, src: Resource, src_offset: usize, size: usize },
    WriteBufferImmediate { dst: Resource, offset: usize, value: u32 },
    SetDescriptorHeap(DescriptorHeap),
    SetPipeline(Pipeline),
    SetRootDescriptorTable { parameter: u32, descriptor: u32 },
    ClearUnorderedAccessViewUint { gpu_descriptor: u32, cpu_heap: DescriptorHeap, cpu_descriptor: u32, resource: Resource, values: [u32; 4] },
    ClearUnorderedAccessViewFloat { gpu_descriptor: u32, cpu_heap: DescriptorHeap, cpu_descriptor: u32, resource: Resource, values: [f32; 4] },
    Dispatch([u32; 3]),
}

/// A linear list of commands, reused across submissions.
///
/// A list is created closed.  `reset` opens it for recording, `close` ends recording.
#[derive(Debug)]
pub(crate) struct CommandList {
    name: String,
    commands: Vec<Command>,
    open: bool,
}

impl CommandList {
    pub(crate) fn new(name: String) -> Self {
        CommandList { name, commands: Vec::new(), open: false }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn len(&self) -> usize {
        self.commands.len()
    }

    pub(crate) fn reset(&mut self) {
        self.commands.clear();
        self.open = true;
    }

    pub(crate) fn close(&mut self) {
        self.open = false;
    }

    /// Hands the recorded commands to the queue.  The list must be closed.
    pub(crate) fn take_commands(&mut self) -> Vec<Command> {
        debug_assert!(!self.open, "executing an open command list");
        std::mem::take(&mut self.commands)
    }

    fn record(&mut self, command: Command) {
        debug_assert!(self.open, "recording into a closed command list");
        self.commands.push(command);
    }

    pub(crate) fn resource_barrier(&mut self, barrier: NativeBarrier) {
        self.record(Command::Barrier(barrier));
    }

    pub(crate) fn copy_resource(&mut self, dst: &Resource, src: &Resource) {
        self.record(Command::CopyResource { dst: dst.clone(), src: src.clone() });
    }

    pub(crate) fn copy_buffer_region(&mut self, dst: &Resource, dst_offset: usize, src: &Resource, src_offset: usize, size: usize) {
        self.record(Command::CopyBufferRegion { dst: dst.clone(), dst_offset, src: src.clone(), src_offset, size });
    }

    pub(crate) fn write_buffer_immediate(&mut self, dst: &Resource, offset: usize, value: u32) {
        self.record(Command::WriteBufferImmediate { dst: dst.clone(), offset, value });
    }

    pub(crate) fn set_descriptor_heap(&mut self, heap: &DescriptorHeap) {
        self.record(Command::SetDescriptorHeap(heap.clone()));
    }

    pub(crate) fn set_pipeline(&mut self, pipeline: &Pipeline) {
        self.record(Command::SetPipeline(pipeline.clone()));
    }

    pub(crate) fn set_root_descriptor_table(&mut self, parameter: u32, descriptor: u32) {
        debug_assert!(parameter < ROOT_PARAMETER_COUNT);
        self.record(Command::SetRootDescriptorTable { parameter, descriptor });
    }

    pub(crate) fn clear_uav_uint(&mut self, gpu_descriptor: u32, cpu_heap: &DescriptorHeap, cpu_descriptor: u32, resource: &Resource, values: [u32; 4]) {
        self.record(Command::ClearUnorderedAccessViewUint {
            gpu_descriptor,
            cpu_heap: cpu_heap.clone(),
            cpu_descriptor,
            resource: resource.clone(),
            values,
        });
    }

    pub(crate) fn clear_uav_float(&mut self, gpu_descriptor: u32, cpu_heap: &DescriptorHeap, cpu_descriptor: u32, resource: &Resource, values: [f32; 4]) {
        self.record(Command::ClearUnorderedAccessViewFloat {
            gpu_descriptor,
            cpu_heap: cpu_heap.clone(),
            cpu_descriptor,
            resource: resource.clone(),
            values,
        });
    }

    pub(crate) fn dispatch(&mut self, group_count: [u32; 3]) {
        self.record(Command::Dispatch(group_count));
    }
}
