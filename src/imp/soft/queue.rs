// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The software GPU: a queue thread, its fence, and the command executor.
//!
//! Command lists are executed in submission order on a dedicated `soft_queue` thread.  A
//! signal job sets the fence once everything submitted before it has run.  The executor also
//! plays the part of a validation layer: it tracks the state of every resource within a
//! command list and counts (and logs) uses that lack the barrier they need.

use crate::bindings::resource_tracking::ResourceState;
use crate::format;
use crate::imp::soft::command_list::{
    Command, NativeBarrier, ROOT_CONSTANT_BASE, ROOT_PARAMETER_COUNT, ROOT_READ_ONLY_BASE, ROOT_READ_WRITE_BASE,
};
use crate::imp::soft::descriptor::{DescriptorHeap, ElementLayout, View, ViewKind};
use crate::imp::soft::kernel::KernelContext;
use crate::imp::soft::{Error, HeapType, Pipeline, Resource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Counters describing what the queue has executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub executed_lists: u64,
    pub transition_barriers: u64,
    pub read_write_barriers: u64,
    pub copies: u64,
    pub immediate_writes: u64,
    pub clears: u64,
    pub dispatches: u64,
    /// Commands that used a resource in a state it was not in.
    pub validation_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    executed_lists: AtomicU64,
    transition_barriers: AtomicU64,
    read_write_barriers: AtomicU64,
    copies: AtomicU64,
    immediate_writes: AtomicU64,
    clears: AtomicU64,
    dispatches: AtomicU64,
    validation_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            executed_lists: self.executed_lists.load(Ordering::Relaxed),
            transition_barriers: self.transition_barriers.load(Ordering::Relaxed),
            read_write_barriers: self.read_write_barriers.load(Ordering::Relaxed),
            copies: self.copies.load(Ordering::Relaxed),
            immediate_writes: self.immediate_writes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
        }
    }
}

/// Number of outstanding [`QueueHold`]s, and the condition the queue waits on.
#[derive(Debug, Default)]
struct Gate {
    holds: Mutex<u32>,
    released: Condvar,
}

impl Gate {
    fn wait_until_released(&self) {
        let mut holds = self.holds.lock().unwrap_or_else(|e| e.into_inner());
        while *holds > 0 {
            holds = self.released.wait(holds).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Keeps the queue from starting new work until dropped.
///
/// Work already running finishes.  Drop every hold before dropping the device, which waits
/// for the queue to drain.
#[derive(Debug)]
#[must_use]
pub struct QueueHold {
    gate: Arc<Gate>,
}

impl Drop for QueueHold {
    fn drop(&mut self) {
        let mut holds = self.gate.holds.lock().unwrap_or_else(|e| e.into_inner());
        *holds -= 1;
        if *holds == 0 {
            self.gate.released.notify_all();
        }
    }
}

enum Job {
    Execute { name: String, commands: Vec<Command> },
    Signal(u64),
}

/// Fence value observed by the recording thread.
pub(crate) struct Fence {
    completed: Arc<AtomicU64>,
    notifications: wasm_safe_mutex::mpsc::Receiver<u64>,
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence").field("completed", &self.completed_value()).finish_non_exhaustive()
    }
}

/// Upper bound on one blocking receive while waiting without a deadline.
const WAIT_SLICE: Duration = Duration::from_secs(3600);

impl Fence {
    pub(crate) fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Waits until the fence reaches `value`.
    ///
    /// `None` waits forever.  Returns whether the value was reached.
    pub(crate) fn wait(&self, value: u64, timeout: Option<Duration>) -> Result<bool, Error> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if self.completed_value() >= value {
                return Ok(true);
            }
            let slice_end = match deadline {
                Some(deadline) if Instant::now() >= deadline => return Ok(false),
                Some(deadline) => deadline,
                None => Instant::now() + WAIT_SLICE,
            };
            match self.notifications.recv_sync_timeout(slice_end) {
                Ok(_) => {}
                Err(wasm_safe_mutex::mpsc::RecvTimeoutError::Timeout) => {}
                Err(wasm_safe_mutex::mpsc::RecvTimeoutError::Disconnected) => {
                    return if self.completed_value() >= value { Ok(true) } else { Err(Error::DeviceRemoved) };
                }
            }
        }
    }
}

/// The queue thread and the channel feeding it.
pub(crate) struct Queue {
    name: String,
    sender: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    gate: Arc<Gate>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Queue {
    /// Starts the queue thread.  The returned fence is signalled by [`Queue::signal`].
    pub(crate) fn new(name: &str) -> Result<(Queue, Fence), Error> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let (notify, notifications) = wasm_safe_mutex::mpsc::channel::<u64>();
        let completed = Arc::new(AtomicU64::new(0));
        let gate = Arc::new(Gate::default());
        let counters = Arc::new(Counters::default());

        let thread = {
            let completed = completed.clone();
            let gate = gate.clone();
            let counters = counters.clone();
            thread::Builder::new().name("soft_queue".to_string()).spawn(move || {
                while let Ok(job) = receiver.recv() {
                    gate.wait_until_released();
                    match job {
                        Job::Execute { name, commands } => {
                            Executor::new(&counters).run(&name, commands);
                            Counters::bump(&counters.executed_lists);
                        }
                        Job::Signal(value) => {
                            completed.fetch_max(value, Ordering::AcqRel);
                            //the device may be gone already; nothing is waiting then
                            let _ = notify.send_sync(value);
                        }
                    }
                }
            })?
        };

        let queue = Queue { name: name.to_string(), sender: Some(sender), thread: Some(thread), gate, counters };
        Ok((queue, Fence { completed, notifications }))
    }

    fn send(&self, job: Job) -> Result<(), Error> {
        let sender = self.sender.as_ref().ok_or(Error::DeviceRemoved)?;
        sender.send(job).map_err(|_| Error::DeviceRemoved)
    }

    pub(crate) fn execute(&self, name: &str, commands: Vec<Command>) -> Result<(), Error> {
        self.send(Job::Execute { name: name.to_string(), commands })
    }

    pub(crate) fn signal(&self, value: u64) -> Result<(), Error> {
        self.send(Job::Signal(value))
    }

    pub(crate) fn hold(&self) -> QueueHold {
        *self.gate.holds.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        QueueHold { gate: self.gate.clone() }
    }

    pub(crate) fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        //closing the channel ends the thread once it has drained
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                logwise::error_sync!("soft_queue thread panicked");
            }
        }
    }
}

/// Runs one command list.
struct Executor<'a> {
    counters: &'a Counters,
    states: HashMap<u64, ResourceState>,
    heap: Option<DescriptorHeap>,
    pipeline: Option<Pipeline>,
    root: [Option<u32>; ROOT_PARAMETER_COUNT as usize],
}

impl<'a> Executor<'a> {
    fn new(counters: &'a Counters) -> Self {
        Executor { counters, states: HashMap::new(), heap: None, pipeline: None, root: [None; ROOT_PARAMETER_COUNT as usize] }
    }

    fn validation_error(&self, list: &str, message: &'static str, resource: Option<&Resource>) {
        Counters::bump(&self.counters.validation_errors);
        let name = resource.map(|r| r.name().to_string()).unwrap_or_default();
        logwise::error_sync!(
            "Validation error in {list}: {message} ({name})",
            list = logwise::privacy::LogIt(&list),
            message = message,
            name = logwise::privacy::LogIt(&name)
        );
    }

    /// Checks that `resource` may be used in `state` here, promoting it on first use.
    fn require(&mut self, list: &str, resource: &Resource, state: ResourceState) -> bool {
        if state == ResourceState::UnorderedAccess && !resource.allows_unordered_access() {
            self.validation_error(list, "unordered access to a resource that does not allow it", Some(resource));
            return false;
        }
        let ok = match resource.heap() {
            HeapType::Upload | HeapType::GpuUpload => !matches!(state, ResourceState::CopyDest | ResourceState::UnorderedAccess),
            HeapType::Readback => state == ResourceState::CopyDest,
            HeapType::Default => match self.states.get(&resource.id()) {
                None => {
                    self.states.insert(resource.id(), state);
                    true
                }
                Some(current) => *current == state,
            },
        };
        if !ok {
            self.validation_error(list, "resource used in the wrong state", Some(resource));
        }
        ok
    }

    fn run(&mut self, list: &str, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Barrier(barrier) => self.barrier(list, barrier),
                Command::CopyResource { dst, src } => {
                    Counters::bump(&self.counters.copies);
                    let src_ok = self.require(list, &src, ResourceState::CopySource);
                    let dst_ok = self.require(list, &dst, ResourceState::CopyDest);
                    if dst.size() != src.size() || dst == src {
                        self.validation_error(list, "copy_resource between mismatched resources", Some(&dst));
                    } else if src_ok && dst_ok {
                        copy_bytes(&dst, 0, &src, 0, src.size());
                    }
                }
                Command::CopyBufferRegion { dst, dst_offset, src, src_offset, size } => {
                    Counters::bump(&self.counters.copies);
                    let src_ok = self.require(list, &src, ResourceState::CopySource);
                    let dst_ok = self.require(list, &dst, ResourceState::CopyDest);
                    let fits = |offset: usize, resource: &Resource| offset.checked_add(size).is_some_and(|end| end <= resource.size());
                    if !fits(src_offset, &src) || !fits(dst_offset, &dst) {
                        self.validation_error(list, "copy_buffer_region out of bounds", Some(&dst));
                    } else if src_ok && dst_ok {
                        copy_bytes(&dst, dst_offset, &src, src_offset, size);
                    }
                }
                Command::WriteBufferImmediate { dst, offset, value } => {
                    Counters::bump(&self.counters.immediate_writes);
                    if self.require(list, &dst, ResourceState::CopyDest) {
                        //safety: the CPU does not touch resources the queue is executing on
                        unsafe { dst.store_u32(offset, value) };
                    }
                }
                Command::SetDescriptorHeap(heap) => {
                    if !heap.is_shader_visible() {
                        self.validation_error(list, "binding a CPU-only descriptor heap", None);
                    }
                    self.heap = Some(heap);
                }
                Command::SetPipeline(pipeline) => self.pipeline = Some(pipeline),
                Command::SetRootDescriptorTable { parameter, descriptor } => {
                    self.root[parameter as usize] = Some(descriptor);
                }
                Command::ClearUnorderedAccessViewUint { gpu_descriptor, cpu_heap, cpu_descriptor, resource, values } => {
                    if let Some(view) = self.clear_view(list, gpu_descriptor, &cpu_heap, cpu_descriptor, &resource) {
                        fill_view(&view, |format| values.map(|v| v & component_mask(format)), values[0]);
                    }
                }
                Command::ClearUnorderedAccessViewFloat { gpu_descriptor, cpu_heap, cpu_descriptor, resource, values } => {
                    if let Some(view) = self.clear_view(list, gpu_descriptor, &cpu_heap, cpu_descriptor, &resource) {
                        fill_view(&view, |format| values.map(|v| format::encode_float(format, v)), values[0].to_bits());
                    }
                }
                Command::Dispatch(group_count) => self.dispatch(list, group_count),
            }
        }
        //buffers decay to the common state once a command list completes
        self.states.clear();
    }

    fn barrier(&mut self, list: &str, barrier: NativeBarrier) {
        match barrier {
            NativeBarrier::Transition { resource, before, after } => {
                Counters::bump(&self.counters.transition_barriers);
                if resource.heap() != HeapType::Default {
                    self.validation_error(list, "transition on a resource with a fixed state", Some(&resource));
                    return;
                }
                let current = self.states.get(&resource.id()).copied().unwrap_or(ResourceState::Common);
                if current != before {
                    self.validation_error(list, "transition barrier with a wrong before state", Some(&resource));
                }
                self.states.insert(resource.id(), after);
            }
            NativeBarrier::UnorderedAccess { resource } => {
                Counters::bump(&self.counters.read_write_barriers);
                if !resource.allows_unordered_access() {
                    self.validation_error(list, "read-write barrier on a resource without unordered access", Some(&resource));
                }
            }
        }
    }

    fn clear_view(&mut self, list: &str, gpu_descriptor: u32, cpu_heap: &DescriptorHeap, cpu_descriptor: u32, resource: &Resource) -> Option<View> {
        Counters::bump(&self.counters.clears);
        let gpu = self.heap.as_ref().and_then(|heap| heap.read(gpu_descriptor));
        let cpu = cpu_heap.read(cpu_descriptor);
        let (Some(gpu), Some(cpu)) = (gpu, cpu) else {
            self.validation_error(list, "clear with an unwritten descriptor", Some(resource));
            return None;
        };
        if gpu.kind != ViewKind::UnorderedAccess || !gpu.same_target(&cpu) || gpu.resource.as_ref() != Some(resource) {
            self.validation_error(list, "clear descriptors disagree", Some(resource));
            return None;
        }
        self.require(list, resource, ResourceState::UnorderedAccess).then_some(gpu)
    }

    fn table(&mut self, list: &str, base: u32, count: u32, kind: ViewKind) -> Vec<View> {
        let mut views = Vec::with_capacity(count as usize);
        for parameter in base..base + count {
            let view = self.root[parameter as usize]
                .and_then(|descriptor| self.heap.as_ref().and_then(|heap| heap.read(descriptor)));
            let view = match view {
                Some(view) if view.kind == kind => view,
                Some(_) => {
                    self.validation_error(list, "descriptor kind does not match root parameter", None);
                    View::null(kind)
                }
                None => {
                    self.validation_error(list, "root parameter without a descriptor", None);
                    View::null(kind)
                }
            };
            views.push(view);
        }
        views
    }

    fn dispatch(&mut self, list: &str, group_count: [u32; 3]) {
        Counters::bump(&self.counters.dispatches);
        let Some(pipeline) = self.pipeline.clone() else {
            self.validation_error(list, "dispatch without a pipeline", None);
            return;
        };
        let constants = self.table(list, ROOT_CONSTANT_BASE, ROOT_READ_ONLY_BASE - ROOT_CONSTANT_BASE, ViewKind::Constant);
        let read_only = self.table(list, ROOT_READ_ONLY_BASE, ROOT_READ_WRITE_BASE - ROOT_READ_ONLY_BASE, ViewKind::ShaderResource);
        let read_write = self.table(list, ROOT_READ_WRITE_BASE, ROOT_PARAMETER_COUNT - ROOT_READ_WRITE_BASE, ViewKind::UnorderedAccess);
        let bound = [
            (&constants, ResourceState::VertexAndConstantBuffer),
            (&read_only, ResourceState::NonPixelShaderResource),
            (&read_write, ResourceState::UnorderedAccess),
        ];
        for (views, state) in bound {
            for resource in views.iter().filter_map(|view| view.resource.as_ref()) {
                self.require(list, resource, state);
            }
        }

        let group_size = pipeline.thread_group_size();
        let context = KernelContext { constants: &constants, read_only: &read_only, read_write: &read_write, group_count, group_size };
        let kernel = pipeline.kernel();
        for gz in 0..group_count[2] {
            for gy in 0..group_count[1] {
                for gx in 0..group_count[0] {
                    for tz in 0..group_size[2] {
                        for ty in 0..group_size[1] {
                            for tx in 0..group_size[0] {
                                let thread_id = [
                                    gx * group_size[0] + tx,
                                    gy * group_size[1] + ty,
                                    gz * group_size[2] + tz,
                                ];
                                kernel.run(&context, thread_id);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn component_mask(format: crate::format::Format) -> u32 {
    let bits = format.component_bits();
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

fn copy_bytes(dst: &Resource, dst_offset: usize, src: &Resource, src_offset: usize, size: usize) {
    //safety: bounds were checked by the caller; the CPU does not touch resources in flight
    let staged = unsafe { src.bytes(src_offset, size) }.to_vec();
    unsafe { dst.bytes_mut(dst_offset, size) }.copy_from_slice(&staged);
}

/// Fills every element of `view`.  Typed views pack per-component values produced by
/// `typed`; other views repeat `word`.
fn fill_view(view: &View, typed: impl Fn(crate::format::Format) -> [u32; 4], word: u32) {
    let Some(resource) = view.resource.as_ref() else {
        return;
    };
    match view.layout {
        ElementLayout::Typed(format) => {
            let components = typed(format);
            let stride = format.element_size();
            if stride == 0 {
                return;
            }
            //safety: the view was validated against the resource; the CPU is not touching it
            let bytes = unsafe { resource.bytes_mut(view.byte_offset, view.byte_len) };
            for element in bytes.chunks_exact_mut(stride) {
                format::pack_element(format, components, element);
            }
        }
        ElementLayout::Structured { .. } | ElementLayout::Raw => {
            for offset in (view.byte_offset..view.byte_offset + view.byte_len).step_by(4) {
                //safety: as above
                unsafe { resource.store_u32(offset, word) };
            }
        }
    }
}
