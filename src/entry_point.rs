// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The entry point: the kernels known to the process and the devices created from them.

```
# use explicit_compute::compute::{DeviceDesc, StaticResourceRegistry};
# use explicit_compute::entry_point::EntryPoint;
# test_executors::spin_on(async {
let entry_point = EntryPoint::new().await.unwrap();
let bytecode = entry_point.register_kernel("noop", |_: &explicit_compute::KernelContext<'_>, _: [u32; 3]| {});
assert!(!bytecode.is_empty());
let device = entry_point
    .create_device(&DeviceDesc::new("device"), &mut StaticResourceRegistry::new())
    .await
    .unwrap();
assert_eq!(device.name(), "device");
# });
```
*/
use crate::compute::{Device, DeviceDesc, DeviceFlags, StaticResourceRegistry};
use crate::imp;
use crate::status::Error;
use std::sync::Arc;

#[derive(Debug)]
pub struct EntryPoint(pub(crate) imp::EntryPoint);

impl EntryPoint {
    pub async fn new() -> Result<Self, Error> {
        let entry_point = imp::EntryPoint::new().await?;
        Ok(EntryPoint(entry_point))
    }

    /// Registers a compute kernel and returns the bytecode that names it.
    ///
    /// The bytecode is what [`Device::create_shader_from_memory`] expects.  It is valid on
    /// every device created from this entry point, including devices created earlier.
    pub fn register_kernel(&self, name: &str, kernel: impl imp::Kernel) -> Vec<u8> {
        logwise::trace_sync!("Registering kernel {name}", name = logwise::privacy::LogIt(&name));
        self.0.kernels().register(name, Arc::new(kernel))
    }

    /// Creates a device, then every buffer and shader in `registry` on it.
    pub async fn create_device(&self, desc: &DeviceDesc, registry: &mut StaticResourceRegistry) -> Result<Device, Error> {
        let set_names = !desc.flags.contains(DeviceFlags::DISABLE_NAME_SETTING);
        let native = imp::Device::new(&desc.name, set_names, self.0.kernels().clone())?;
        let mut device = Device::new(native, desc)?;
        registry.create_all(&mut device).await?;
        logwise::info_sync!(
            "Created device {name} with {resources} static resources",
            name = logwise::privacy::LogIt(&desc.name),
            resources = registry.len()
        );
        Ok(device)
    }
}
