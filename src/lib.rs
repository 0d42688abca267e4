// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! explicit_compute is a simplified GPU compute layer over an explicit graphics API.

Explicit APIs (command lists, descriptor heaps, resource barriers, fences) are fast, but every
application ends up writing the same bookkeeping on top of them.  This crate is that bookkeeping,
done once, for the compute-only case: linear buffers and compute dispatch.

| Concern                  | Raw explicit API                       | explicit_compute                                         |
|--------------------------|----------------------------------------|----------------------------------------------------------|
| Command recording        | Allocate, reset, close, submit         | One list per device, driven on demand                    |
| Synchronization          | Fences, waits, and your own bookkeeping | CPU access waits for conflicting GPU work automatically  |
| Resource state           | Manual transition barriers             | Tracked per buffer; barriers only where needed           |
| Descriptors              | Heaps, handles, lifetimes              | Bind a buffer and a range; views are created lazily      |
| Memory placement         | Heap types and mapping                 | Derived from usage flags                                 |

# Shape of the API

* [`entry_point::EntryPoint`] knows the compute kernels and creates [`compute::Device`]s.
* A device creates [`compute::Buffer`]s and [`compute::Shader`]s, binds buffers to slots,
  dispatches shaders, and moves data between the CPU and buffers.
* Fallible operations return `Result<Status, Error>`.  The [`Status`] distinguishes real work
  from a no-op, and reports [`Status::NotReady`] or [`Status::Timeout`] when the GPU was still
  busy and the caller did not want to wait.

```
# use explicit_compute::compute::{BufferDesc, CommandFlags, DeviceDesc, StaticResourceRegistry};
# use explicit_compute::bindings::BufferFlags;
# use explicit_compute::entry_point::EntryPoint;
# use explicit_compute::Range;
# test_executors::spin_on(async {
let entry_point = EntryPoint::new().await.unwrap();
let mut device = entry_point.create_device(&DeviceDesc::new("device"), &mut StaticResourceRegistry::new()).await.unwrap();
let upload = BufferDesc::new("upload", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::COPY_SRC, 16);
let readback = BufferDesc::new("readback", BufferFlags::CPU_READ | BufferFlags::COPY_DST, 16);
let src = device.create_buffer_from_memory(&upload, &[1, 2, 3, 4]).unwrap();
let dst = device.create_buffer(&readback).unwrap();

//recorded now, executed when the CPU needs the result
device.copy_buffer(src, dst).unwrap();
let mut out = [0u8; 4];
let status = device.read_buffer_to_memory(dst, Range::new(0, 4), &mut out, CommandFlags::empty()).unwrap();
assert!(status.is_success());
assert_eq!(out, [1, 2, 3, 4]);

device.destroy_buffer(src).unwrap();
device.destroy_buffer(dst).unwrap();
# });
```

# Backends

The only backend today is a software implementation of the explicit API: resources in host
memory, a queue thread that executes command lists, and kernels written as Rust closures.  It
validates every resource use against the barrier state the command list established, so it
doubles as a checker for the synchronization logic.  [`NativeDevice::stats`] exposes what it saw.
*/

pub mod bindings;
pub mod bittricks;
pub mod compute;
pub mod entry_point;
pub mod format;
mod imp;
pub mod range;
pub mod status;

pub use format::Format;
pub use imp::{BufferView, Device as NativeDevice, Kernel, KernelContext, QueueHold, QueueStats};
pub use range::Range;
pub use status::{Error, Status};
