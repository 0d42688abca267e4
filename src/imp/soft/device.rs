// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::soft::command_list::CommandList;
use crate::imp::soft::descriptor::{BufferViewDesc, DescriptorHeap, View, ViewKind};
use crate::imp::soft::queue::{Fence, Queue, QueueHold, QueueStats};
use crate::imp::soft::{Error, HeapType, Kernel, KernelLibrary, Resource};
use std::sync::Arc;

/// A compiled compute pipeline.
#[derive(Clone)]
pub(crate) struct Pipeline {
    name: Arc<str>,
    kernel: Arc<dyn Kernel>,
    thread_group_size: [u32; 3],
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("thread_group_size", &self.thread_group_size)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub(crate) fn kernel(&self) -> &dyn Kernel {
        &*self.kernel
    }

    pub(crate) fn thread_group_size(&self) -> [u32; 3] {
        self.thread_group_size
    }
}

/// Native device: queue, fence, and object factory.
#[derive(Debug)]
pub struct Device {
    name: String,
    set_names: bool,
    kernels: KernelLibrary,
    fence: Fence,
    queue: Queue,
}

impl Device {
    pub(crate) fn new(name: &str, set_names: bool, kernels: KernelLibrary) -> Result<Self, Error> {
        let (queue, fence) = Queue::new(name)?;
        logwise::info_sync!("Created soft device {name}", name = logwise::privacy::LogIt(&name));
        Ok(Device { name: name.to_string(), set_names, kernels, fence, queue })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn object_name(&self, name: &str) -> String {
        if self.set_names { name.to_string() } else { String::new() }
    }

    pub(crate) fn create_committed_resource(&self, size: usize, heap: HeapType, allow_unordered_access: bool, name: &str) -> Result<Resource, Error> {
        Resource::new(size, heap, allow_unordered_access, self.object_name(name))
    }

    pub(crate) fn create_descriptor_heap(&self, capacity: u32, shader_visible: bool) -> DescriptorHeap {
        DescriptorHeap::new(capacity, shader_visible)
    }

    pub(crate) fn create_null_view(&self, heap: &DescriptorHeap, index: u32, kind: ViewKind) {
        heap.write(index, View::null(kind));
    }

    pub(crate) fn create_constant_buffer_view(&self, heap: &DescriptorHeap, index: u32, resource: &Resource, byte_offset: usize, byte_len: usize) {
        heap.write(index, View::constant(resource.clone(), byte_offset, byte_len));
    }

    pub(crate) fn create_shader_resource_view(&self, heap: &DescriptorHeap, index: u32, resource: &Resource, desc: BufferViewDesc) {
        heap.write(index, View::buffer(ViewKind::ShaderResource, resource.clone(), desc));
    }

    pub(crate) fn create_unordered_access_view(&self, heap: &DescriptorHeap, index: u32, resource: &Resource, desc: BufferViewDesc) {
        heap.write(index, View::buffer(ViewKind::UnorderedAccess, resource.clone(), desc));
    }

    pub(crate) fn create_pipeline(&self, bytecode: &[u8], thread_group_size: [u32; 3], name: &str) -> Result<Pipeline, Error> {
        let kernel = self.kernels.lookup(bytecode)?;
        Ok(Pipeline { name: self.object_name(name).into(), kernel, thread_group_size })
    }

    pub(crate) fn create_command_list(&self, name: &str) -> CommandList {
        CommandList::new(self.object_name(name))
    }

    /// Submits a closed list.  The list can be reset right away.
    pub(crate) fn execute_command_list(&self, list: &mut CommandList) -> Result<(), Error> {
        let commands = list.take_commands();
        self.queue.execute(list.name(), commands)
    }

    pub(crate) fn signal(&self, value: u64) -> Result<(), Error> {
        self.queue.signal(value)
    }

    pub(crate) fn fence(&self) -> &Fence {
        &self.fence
    }

    /// What the queue has executed so far.
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Pauses the queue until the returned guard is dropped.
    ///
    /// Submitted work stays pending meanwhile, so waits with a zero or short timeout report
    /// that the GPU is not ready.
    pub fn hold_queue(&self) -> QueueHold {
        self.queue.hold()
    }
}
