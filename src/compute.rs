// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The simplified compute surface: buffers, shaders, bindings and dispatch on a [`Device`].

A device owns one command list.  Operations that record GPU work start recording on demand;
operations that touch memory from the CPU first wait until the GPU no longer uses it.
*/

mod buffer;
mod device;
mod lifecycle;
mod loading;
pub(crate) mod registry;
mod shader;
mod static_resources;
mod transfer;

pub use buffer::{Buffer, BufferDesc, BufferInfo, element_size};
pub use device::{Device, DeviceDesc, DeviceFlags, MAX_DISPATCH_GROUPS};
pub use lifecycle::{CommandFlags, CommandListState, Timeout};
pub use shader::{MAX_THREAD_GROUP_DEPTH, MAX_THREADS_PER_GROUP, Shader, ShaderDesc, ShaderInfo};
pub use static_resources::{StaticBufferKey, StaticResourceRegistry, StaticShaderKey};
pub use transfer::MAX_IMMEDIATE_WRITE;
