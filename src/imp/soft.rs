// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Software implementation of the explicit GPU API.
//!
//! Resources live in host memory, command lists are plain vectors of commands, and a single
//! queue thread executes them.  Barriers and descriptor heaps are real: the executor checks
//! every resource use against the state the command list put it in.

mod buffer;
mod command_list;
mod descriptor;
mod device;
mod entry_point;
mod error;
mod kernel;
mod queue;

pub(crate) use buffer::{HeapType, Resource};
pub(crate) use command_list::{
    CommandList, NativeBarrier, ROOT_CONSTANT_BASE, ROOT_READ_ONLY_BASE, ROOT_READ_WRITE_BASE,
};
pub(crate) use descriptor::{BufferViewDesc, DescriptorHeap, ElementLayout, ViewKind};
pub use device::Device;
pub(crate) use device::Pipeline;
pub(crate) use entry_point::EntryPoint;
pub(crate) use error::Error;
pub use kernel::{BufferView, Kernel, KernelContext};
pub(crate) use kernel::KernelLibrary;
pub use queue::{QueueHold, QueueStats};
